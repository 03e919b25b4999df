//! Motion Sentry - PIR-triggered camera watcher
//!
//! This crate polls a passive-infrared sensor, captures a still image when
//! motion is asserted, runs YOLO object detection over it and forwards a
//! Telegram alert when the detections hit the configured watch-list.

pub mod engine;
pub mod logging;
pub mod notify;
pub mod service;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Re-export commonly used types
pub use engine::decision_engine::{AlertPayload, WatchList};
pub use engine::image_capture::{CapturedImage, ImageCapture, StillCamera};
pub use engine::motion_sensor::{GpioMotionSensor, MotionSensor};
pub use engine::object_detector::{Detection, ObjectClassifier, OnnxDetector};
pub use notify::{AlertDispatcher, Notifier};
pub use notify::telegram::TelegramNotifier;
pub use service::{RunStats, Services};

/// Labels alerted on unless overridden.
pub const DEFAULT_WATCH_LIST: [&str; 7] = ["person", "dog", "cat", "cow", "horse", "sheep", "elephant"];

const ENV_PREFIX: &str = "MOTION_SENTRY_";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(String),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// BCM number of the PIR input pin
    pub gpio_pin: u8,
    pub model_path: PathBuf,
    pub telegram_token: String,
    pub chat_id: String,
    /// Pause after each capture cycle before the sensor is read again
    pub cooldown: Duration,
    /// Pause between idle sensor reads
    pub poll_interval: Duration,
    pub watch_list: Vec<String>,
    pub capture_dir: PathBuf,
    pub capture_command: String,
    pub capture_timeout: Duration,
    /// Keep at most this many captures on disk; `None` keeps everything
    pub max_captures: Option<usize>,
    pub log_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gpio_pin: 4,
            model_path: PathBuf::from("yolov8n.onnx"),
            telegram_token: String::new(),
            chat_id: String::new(),
            cooldown: Duration::from_secs(2),
            poll_interval: Duration::from_millis(50),
            watch_list: DEFAULT_WATCH_LIST.iter().map(|s| s.to_string()).collect(),
            capture_dir: PathBuf::from("."),
            capture_command: "libcamera-still".to_string(),
            capture_timeout: Duration::from_secs(30),
            max_captures: None,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Build a configuration from `MOTION_SENTRY_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, starting from defaults
    ///
    /// Keys are looked up with the `MOTION_SENTRY_` prefix. Blank values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (format!("{}{}", ENV_PREFIX, name), v))
        };

        let mut config = Config::default();

        if let Some((key, value)) = get("GPIO_PIN") {
            config.gpio_pin = parse(&key, &value)?;
        }
        if let Some((_, value)) = get("MODEL") {
            config.model_path = PathBuf::from(value);
        }
        if let Some((_, value)) = get("TELEGRAM_TOKEN") {
            config.telegram_token = value;
        }
        if let Some((_, value)) = get("CHAT_ID") {
            config.chat_id = value;
        }
        if let Some((key, value)) = get("COOLDOWN_SECS") {
            config.cooldown = Duration::from_secs(parse(&key, &value)?);
        }
        if let Some((key, value)) = get("POLL_MS") {
            config.poll_interval = Duration::from_millis(parse(&key, &value)?);
        }
        if let Some((_, value)) = get("WATCH_LIST") {
            config.watch_list = value
                .split(',')
                .map(|label| label.trim().to_string())
                .filter(|label| !label.is_empty())
                .collect();
        }
        if let Some((_, value)) = get("CAPTURE_DIR") {
            config.capture_dir = PathBuf::from(value);
        }
        if let Some((_, value)) = get("CAPTURE_COMMAND") {
            config.capture_command = value;
        }
        if let Some((key, value)) = get("CAPTURE_TIMEOUT_SECS") {
            config.capture_timeout = Duration::from_secs(parse(&key, &value)?);
        }
        if let Some((key, value)) = get("MAX_CAPTURES") {
            config.max_captures = Some(parse(&key, &value)?);
        }
        if let Some((_, value)) = get("LOG_DIR") {
            config.log_dir = PathBuf::from(value);
        }

        Ok(config)
    }

    /// Check that the configuration is usable for a live run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_token.is_empty() {
            return Err(ConfigError::Missing(format!("{}TELEGRAM_TOKEN", ENV_PREFIX)));
        }
        if self.chat_id.is_empty() {
            return Err(ConfigError::Missing(format!("{}CHAT_ID", ENV_PREFIX)));
        }
        if self.watch_list.is_empty() {
            return Err(ConfigError::Missing(format!("{}WATCH_LIST", ENV_PREFIX)));
        }
        if self.cooldown.is_zero() {
            return Err(invalid("COOLDOWN_SECS", "0"));
        }
        if self.capture_timeout.is_zero() {
            return Err(invalid("CAPTURE_TIMEOUT_SECS", "0"));
        }
        if self.max_captures == Some(0) {
            return Err(invalid("MAX_CAPTURES", "0"));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: format!("{}{}", ENV_PREFIX, name),
        value: value.to_string(),
    }
}
