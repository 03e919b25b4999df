//! Capture and detection engine

pub mod decision_engine;
pub mod image_capture;
pub mod labels;
pub mod motion_sensor;
pub mod object_detector;
pub mod retention;

pub use decision_engine::{AlertPayload, WatchList};
pub use image_capture::{CaptureError, CapturedImage, ImageCapture, StillCamera};
pub use motion_sensor::{GpioMotionSensor, MotionSensor, SensorError};
pub use object_detector::{ClassifierError, Detection, ObjectClassifier, OnnxDetector};
