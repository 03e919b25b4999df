//! Still image capture through an external camera utility

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to launch capture command {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Capture command exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },
    #[error("Capture command timed out after {0:?}")]
    Timeout(Duration),
    #[error("Capture produced no file at {0}")]
    MissingOutput(PathBuf),
    #[error("Capture produced an empty file at {0}")]
    EmptyOutput(PathBuf),
    #[error("Invalid capture command: {0}")]
    InvalidCommand(String),
}

/// An image written to disk by one capture cycle
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub path: PathBuf,
    pub captured_at: DateTime<Local>,
}

/// Produces one still image per call
#[allow(async_fn_in_trait)]
pub trait ImageCapture {
    /// Capture a frame and return it once the file is known to exist and be non-empty
    async fn capture_image(&mut self) -> Result<CapturedImage, CaptureError>;
}

/// Build the `detected_<YYYYMMDD_HHMMSS>.jpg` file name for a capture time
pub fn capture_file_name(at: &DateTime<Local>) -> String {
    format!("detected_{}.jpg", at.format("%Y%m%d_%H%M%S"))
}

/// Camera driven by `libcamera-still` (or a compatible utility)
///
/// The utility is invoked as `<command> [extra args] -o <path> --nopreview`.
#[derive(Debug, Clone)]
pub struct StillCamera {
    program: String,
    extra_args: Vec<String>,
    output_dir: PathBuf,
    timeout: Duration,
}

impl StillCamera {
    /// Create a camera from a command line such as `libcamera-still` or
    /// `rpicam-still --width 1920 --height 1080`
    pub fn new(
        command: &str,
        output_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, CaptureError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| CaptureError::InvalidCommand(command.to_string()))?;

        Ok(Self {
            program,
            extra_args: parts.collect(),
            output_dir: output_dir.into(),
            timeout,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn run_utility(&self, path: &Path) -> Result<(), CaptureError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.extra_args)
            .arg("-o")
            .arg(path)
            .arg("--nopreview")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {} for {}", self.program, path.display());

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| CaptureError::Timeout(self.timeout))?
            .map_err(|source| CaptureError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CaptureError::ExitStatus {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

impl ImageCapture for StillCamera {
    async fn capture_image(&mut self) -> Result<CapturedImage, CaptureError> {
        let captured_at = Local::now();
        let path = self.output_dir.join(capture_file_name(&captured_at));

        self.run_utility(&path).await?;

        // The exit status alone is not trusted; the file must be there
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| CaptureError::MissingOutput(path.clone()))?;
        if metadata.len() == 0 {
            return Err(CaptureError::EmptyOutput(path));
        }

        Ok(CapturedImage { path, captured_at })
    }
}
