//! Alert Dispatch Module
//!
//! Decides whether a classified capture is worth an alert and, if so,
//! delivers the summary text and the photo through a [`Notifier`].

pub mod telegram;

use crate::engine::decision_engine::WatchList;
use crate::engine::object_detector::Detection;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Telegram API error: {0}")]
    ApiError(String),
    #[error("Image read error: {0}")]
    FileError(#[from] std::io::Error),
}

/// Delivery channel for alerts
#[allow(async_fn_in_trait)]
pub trait Notifier {
    /// Send a text message to the configured chat
    async fn send_text(&self, text: &str) -> Result<(), AlertError>;

    /// Send the image at `image_path` as a photo to the configured chat
    async fn send_photo(&self, image_path: &Path) -> Result<(), AlertError>;
}

/// Filters detections against the watch-list and sends the alert
pub struct AlertDispatcher<N> {
    notifier: N,
    watch_list: WatchList,
}

impl<N: Notifier> AlertDispatcher<N> {
    pub fn new(notifier: N, watch_list: WatchList) -> Self {
        Self {
            notifier,
            watch_list,
        }
    }

    /// Alert on the capture if any detection is watched
    ///
    /// Returns `true` when an alert was dispatched. The text and the photo
    /// are sent independently: a failure of either is logged and does not
    /// stop the other.
    pub async fn maybe_alert(&self, image_path: &Path, detections: &[Detection]) -> bool {
        let payload = match self.watch_list.evaluate(image_path, detections) {
            Some(payload) => payload,
            None => {
                info!("No relevant object detected.");
                return false;
            }
        };

        let message = payload.message();
        info!("{}", message);

        if let Err(e) = self.notifier.send_text(&message).await {
            error!("Failed to send alert message: {}", e);
        }

        if let Err(e) = self.notifier.send_photo(&payload.image_path).await {
            error!("Failed to send alert photo {}: {}", payload.image_path.display(), e);
        }

        true
    }

    #[cfg(test)]
    pub(crate) fn notifier(&self) -> &N {
        &self.notifier
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tracing::subscriber::DefaultGuard;
    use tracing_subscriber::fmt::MakeWriter;

    /// One delivery attempt, in call order
    #[derive(Debug, Clone, PartialEq)]
    pub enum Sent {
        Text(String),
        Photo(PathBuf),
    }

    /// Records what would have been sent
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Sent>>,
        pub fail_text: bool,
        pub fail_photo: bool,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text(text) => Some(text),
                    Sent::Photo(_) => None,
                })
                .collect()
        }

        pub fn photos(&self) -> Vec<PathBuf> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Photo(path) => Some(path),
                    Sent::Text(_) => None,
                })
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        async fn send_text(&self, text: &str) -> Result<(), AlertError> {
            self.sent.lock().unwrap().push(Sent::Text(text.to_string()));
            if self.fail_text {
                return Err(AlertError::ApiError("chat not found".to_string()));
            }
            Ok(())
        }

        async fn send_photo(&self, image_path: &Path) -> Result<(), AlertError> {
            self.sent.lock().unwrap().push(Sent::Photo(image_path.to_path_buf()));
            if self.fail_photo {
                return Err(AlertError::FileError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "gone",
                )));
            }
            Ok(())
        }
    }

    /// Formatted log output collected on the current thread
    #[derive(Clone, Default)]
    pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        /// Route this thread's events into a fresh buffer until the guard drops
        pub fn install() -> (Self, DefaultGuard) {
            let logs = CapturedLogs::default();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(logs.clone())
                .with_ansi(false)
                .without_time()
                .with_level(false)
                .with_target(false)
                .finish();
            let guard = tracing::subscriber::set_default(subscriber);
            (logs, guard)
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        /// One entry per event, message only
        pub fn lines(&self) -> Vec<String> {
            self.contents().lines().map(|line| line.trim().to_string()).collect()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }
}
