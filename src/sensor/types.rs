//! Sample types shared by the sensor, formatting and metrics stages.
//!
//! Units are the sensor's native ones: degrees/second for the gyroscope and
//! g for the accelerometer. Conversion factors are declared in the log header.

use serde::{Deserialize, Serialize};

/// A three-axis reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise subtraction, used to remove calibration bias.
    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A raw gyroscope/accelerometer pair as returned by the sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Angular rate in degrees/second
    pub gyro: Vec3,
    /// Acceleration in g
    pub accel: Vec3,
}

impl RawReading {
    pub const fn new(gyro: Vec3, accel: Vec3) -> Self {
        Self { gyro, accel }
    }
}

/// One stamped, calibrated sample. Produced once per clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Microseconds on the logger's monotonic clock
    pub timestamp_us: u64,
    pub gyro: Vec3,
    pub accel: Vec3,
}

impl Sample {
    pub fn new(timestamp_us: u64, gyro: Vec3, accel: Vec3) -> Self {
        Self {
            timestamp_us,
            gyro,
            accel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_magnitude() {
        let v = Vec3::new(3.0, 4.0, 0.0);
        assert!((v.magnitude() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_vec3_sub() {
        let v = Vec3::new(1.0, 2.0, 3.0).sub(&Vec3::new(0.5, 0.5, 0.5));
        assert_eq!(v, Vec3::new(0.5, 1.5, 2.5));
    }

    #[test]
    fn test_non_finite_detection() {
        assert!(Vec3::new(1.0, 2.0, 3.0).is_finite());
        assert!(!Vec3::new(f32::NAN, 0.0, 0.0).is_finite());
        assert!(!Vec3::new(0.0, f32::INFINITY, 0.0).is_finite());
    }
}
