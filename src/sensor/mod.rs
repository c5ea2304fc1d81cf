//! Inertial sensor access.
//!
//! The logger reads the sensor synchronously from the main context, once per
//! clock tick. Hardware drivers implement [`SensorSource`]; hosts without an
//! IMU use [`SimulatedSensor`].

pub mod simulated;
pub mod types;

pub use simulated::SimulatedSensor;
pub use types::{RawReading, Sample, Vec3};

/// A synchronous gyroscope/accelerometer source.
///
/// Implementations hold no state beyond the device handle.
pub trait SensorSource {
    /// Check that the device responds. Called once at startup.
    fn probe(&mut self) -> Result<(), SensorError>;

    /// Read one raw gyro/accel pair (deg/s, g).
    fn read(&mut self) -> Result<RawReading, SensorError>;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn probe(&mut self) -> Result<(), SensorError> {
        (**self).probe()
    }

    fn read(&mut self) -> Result<RawReading, SensorError> {
        (**self).read()
    }
}

/// Errors that can occur when talking to the sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// The device did not answer its identity/probe request
    NotResponding,
    /// A register read failed
    ReadFailed(String),
}

impl std::fmt::Display for SensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorError::NotResponding => write!(f, "Sensor is not responding"),
            SensorError::ReadFailed(e) => write!(f, "Sensor read failed: {e}"),
        }
    }
}

impl std::error::Error for SensorError {}
