//! Watch loop
//!
//! Polls the motion sensor and, on motion, runs one capture cycle:
//! capture, classify, maybe alert, then a fixed cooldown. Everything runs
//! sequentially, so motion during a cycle or its cooldown is not seen.

use crate::engine::image_capture::ImageCapture;
use crate::engine::motion_sensor::{MotionSensor, SensorError};
use crate::engine::object_detector::{ClassifierError, ObjectClassifier};
use crate::engine::retention::prune_captures;
use crate::notify::{AlertDispatcher, Notifier};
use crate::Config;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Errors that end the watch loop
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),
}

/// How one capture cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Alerted,
    NothingRelevant,
    CaptureFailed,
    ClassificationFailed,
}

/// Counters for a run of the watch loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub polls: u64,
    pub cycles: u64,
    /// Cycles that dispatched an alert, whether or not delivery succeeded
    pub alerts_attempted: u64,
    pub capture_failures: u64,
    pub classification_failures: u64,
}

impl RunStats {
    fn record(&mut self, outcome: CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Alerted => self.alerts_attempted += 1,
            CycleOutcome::NothingRelevant => {}
            CycleOutcome::CaptureFailed => self.capture_failures += 1,
            CycleOutcome::ClassificationFailed => self.classification_failures += 1,
        }
    }
}

/// Everything the loop talks to, built once at startup
pub struct Services<S, C, D, N> {
    pub sensor: S,
    pub camera: C,
    pub classifier: D,
    pub dispatcher: AlertDispatcher<N>,
}

impl<S, C, D, N> Services<S, C, D, N>
where
    C: ImageCapture,
    D: ObjectClassifier,
    N: Notifier,
{
    pub fn new(sensor: S, camera: C, classifier: D, dispatcher: AlertDispatcher<N>) -> Self {
        Self {
            sensor,
            camera,
            classifier,
            dispatcher,
        }
    }

    /// Capture, classify and maybe alert once
    ///
    /// Capture and per-image classification failures are logged and end
    /// the cycle early. A classifier failure that is not about the image
    /// (e.g. an unexpected output shape) is returned.
    pub async fn run_cycle(&mut self, config: &Config) -> Result<CycleOutcome, ServiceError> {
        let outcome = self.capture_and_alert().await?;

        if let Some(keep) = config.max_captures {
            if let Err(e) = prune_captures(&config.capture_dir, keep) {
                warn!("Failed to prune captures in {}: {}", config.capture_dir.display(), e);
            }
        }

        Ok(outcome)
    }

    async fn capture_and_alert(&mut self) -> Result<CycleOutcome, ServiceError> {
        let image = match self.camera.capture_image().await {
            Ok(image) => image,
            Err(e) => {
                error!("Image capture failed: {}", e);
                return Ok(CycleOutcome::CaptureFailed);
            }
        };
        debug!("Captured {} at {}", image.path.display(), image.captured_at.format("%H:%M:%S"));

        let detections = match self.classifier.classify(&image.path) {
            Ok(detections) => detections,
            Err(e) if e.is_per_image() => {
                error!("Classification of {} failed: {}", image.path.display(), e);
                return Ok(CycleOutcome::ClassificationFailed);
            }
            Err(e) => return Err(e.into()),
        };

        if self.dispatcher.maybe_alert(&image.path, &detections).await {
            Ok(CycleOutcome::Alerted)
        } else {
            Ok(CycleOutcome::NothingRelevant)
        }
    }
}

/// Run the watch loop until `shutdown` turns true (or its sender is dropped)
///
/// Sensor failures are fatal and returned; everything else is handled per
/// cycle.
pub async fn run<S, C, D, N>(
    config: &Config,
    services: &mut Services<S, C, D, N>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<RunStats, ServiceError>
where
    S: MotionSensor,
    C: ImageCapture,
    D: ObjectClassifier,
    N: Notifier,
{
    let mut stats = RunStats::default();

    info!("Waiting for motion...");

    loop {
        if *shutdown.borrow() {
            break;
        }

        stats.polls += 1;
        if !services.sensor.read_motion()? {
            if pause(config.poll_interval, &mut shutdown).await {
                break;
            }
            continue;
        }

        info!("Motion detected! Capturing image...");
        let outcome = services.run_cycle(config).await?;
        stats.record(outcome);

        if pause(config.cooldown, &mut shutdown).await {
            break;
        }
    }

    info!(
        "Watch loop stopped after {} capture cycle(s), {} alert(s) attempted",
        stats.cycles, stats.alerts_attempted
    );
    Ok(stats)
}

/// Sleep for `duration`; returns true if shutdown was requested meanwhile
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
