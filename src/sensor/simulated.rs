//! Simulated sensor for hosts without an IMU.
//!
//! This exists so the logger (and its tests) can run the full pipeline on a
//! development machine. Noise is generated by a small xorshift generator so
//! runs are reproducible.

use crate::sensor::types::{RawReading, Vec3};
use crate::sensor::{SensorError, SensorSource};

/// A sensor that returns a base reading plus deterministic noise.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    base: RawReading,
    script: Vec<RawReading>,
    noise: f32,
    rng_state: u64,
    responsive: bool,
    failures_remaining: usize,
    reads: u64,
}

impl SimulatedSensor {
    /// A device lying flat and still: zero rate, 1 g on Z.
    pub fn stationary() -> Self {
        Self::fixed(RawReading::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0)))
    }

    /// A device that always returns exactly `reading`.
    pub fn fixed(reading: RawReading) -> Self {
        Self {
            base: reading,
            script: Vec::new(),
            noise: 0.0,
            rng_state: 0x9E37_79B9_7F4A_7C15,
            responsive: true,
            failures_remaining: 0,
            reads: 0,
        }
    }

    /// A device that replays `readings` in order, wrapping around.
    pub fn scripted(readings: Vec<RawReading>) -> Self {
        let mut sensor = Self::fixed(readings.first().copied().unwrap_or_default());
        sensor.script = readings;
        sensor
    }

    /// A device that never answers.
    pub fn unresponsive() -> Self {
        let mut sensor = Self::stationary();
        sensor.responsive = false;
        sensor
    }

    /// Add uniform noise in `[-amplitude, amplitude]` to every axis.
    pub fn with_noise(mut self, amplitude: f32) -> Self {
        self.noise = amplitude.abs();
        self
    }

    /// Seed the noise generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        // xorshift must not start at zero
        self.rng_state = seed.max(1);
        self
    }

    /// Fail the next `count` reads with a read error.
    pub fn with_read_failures(mut self, count: usize) -> Self {
        self.failures_remaining = count;
        self
    }

    /// Number of successful reads so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn next_noise(&mut self) -> f32 {
        if self.noise == 0.0 {
            return 0.0;
        }
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        // Top 24 bits give a uniform value in [0, 1)
        let unit = (x >> 40) as f32 / (1u64 << 24) as f32;
        (unit * 2.0 - 1.0) * self.noise
    }

    fn noisy(&mut self, v: Vec3) -> Vec3 {
        Vec3::new(
            v.x + self.next_noise(),
            v.y + self.next_noise(),
            v.z + self.next_noise(),
        )
    }
}

impl SensorSource for SimulatedSensor {
    fn probe(&mut self) -> Result<(), SensorError> {
        if self.responsive {
            Ok(())
        } else {
            Err(SensorError::NotResponding)
        }
    }

    fn read(&mut self) -> Result<RawReading, SensorError> {
        if !self.responsive {
            return Err(SensorError::NotResponding);
        }
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(SensorError::ReadFailed("simulated bus error".to_string()));
        }

        let reading = if self.script.is_empty() {
            self.base
        } else {
            self.script[(self.reads % self.script.len() as u64) as usize]
        };
        self.reads += 1;

        Ok(RawReading::new(
            self.noisy(reading.gyro),
            self.noisy(reading.accel),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_reading_is_exact() {
        let reading = RawReading::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.1, 0.2, 0.9));
        let mut sensor = SimulatedSensor::fixed(reading);
        assert_eq!(sensor.read().unwrap(), reading);
        assert_eq!(sensor.read().unwrap(), reading);
        assert_eq!(sensor.reads(), 2);
    }

    #[test]
    fn test_noise_stays_in_bounds() {
        let mut sensor = SimulatedSensor::stationary().with_noise(0.05).with_seed(7);
        for _ in 0..1000 {
            let r = sensor.read().unwrap();
            assert!(r.accel.z >= 0.95 && r.accel.z <= 1.05);
            assert!(r.gyro.x.abs() <= 0.05);
        }
    }

    #[test]
    fn test_scripted_wraps() {
        let a = RawReading::new(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO);
        let b = RawReading::new(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO);
        let mut sensor = SimulatedSensor::scripted(vec![a, b]);
        assert_eq!(sensor.read().unwrap(), a);
        assert_eq!(sensor.read().unwrap(), b);
        assert_eq!(sensor.read().unwrap(), a);
    }

    #[test]
    fn test_unresponsive_and_failures() {
        let mut dead = SimulatedSensor::unresponsive();
        assert_eq!(dead.probe(), Err(SensorError::NotResponding));
        assert!(dead.read().is_err());

        let mut flaky = SimulatedSensor::stationary().with_read_failures(2);
        assert!(flaky.probe().is_ok());
        assert!(flaky.read().is_err());
        assert!(flaky.read().is_err());
        assert!(flaky.read().is_ok());
    }
}
