//! PIR motion sensor input
//!
//! The sensor is read as a plain logic level: no debounce, no edge
//! detection. A high level means motion is asserted.

use rppal::gpio::{Gpio, InputPin};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone)]
pub enum SensorError {
    #[error("GPIO hardware unavailable: {0}")]
    HardwareUnavailable(String),
}

impl From<rppal::gpio::Error> for SensorError {
    fn from(e: rppal::gpio::Error) -> Self {
        SensorError::HardwareUnavailable(e.to_string())
    }
}

/// Source of the binary motion signal
pub trait MotionSensor {
    /// Read the current level; `true` when motion is asserted
    fn read_motion(&mut self) -> Result<bool, SensorError>;
}

/// PIR sensor wired to a Raspberry Pi GPIO input
pub struct GpioMotionSensor {
    pin: InputPin,
}

impl GpioMotionSensor {
    /// Claim the BCM-numbered pin as an input
    ///
    /// Fails with [`SensorError::HardwareUnavailable`] when the GPIO
    /// peripheral cannot be opened or the pin is already in use.
    pub fn open(bcm_pin: u8) -> Result<Self, SensorError> {
        let pin = Gpio::new()?.get(bcm_pin)?.into_input();
        info!("PIR sensor ready on GPIO {}", bcm_pin);
        Ok(Self { pin })
    }
}

impl MotionSensor for GpioMotionSensor {
    fn read_motion(&mut self) -> Result<bool, SensorError> {
        Ok(self.pin.is_high())
    }
}

impl Drop for GpioMotionSensor {
    fn drop(&mut self) {
        // rppal restores the pin mode when InputPin drops
        debug!("Releasing GPIO {}", self.pin.pin());
    }
}
