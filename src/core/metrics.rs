//! Dead-reckoning planar speed from calibrated acceleration.
//!
//! Fixed-timestep Euler integration with no external correction, so the
//! estimate drifts. It is reset at session start and after calibration.

use crate::sensor::types::Vec3;
use serde::{Deserialize, Serialize};

/// Standard gravity, m/s² per g.
pub const G_TO_M_S2: f32 = 9.806_65;

const MS_TO_KMH: f32 = 3.6;

/// Snapshot of the integrator state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedEstimate {
    /// X velocity in m/s
    pub vx: f32,
    /// Y velocity in m/s
    pub vy: f32,
    pub speed_kmh: f32,
    pub peak_speed_kmh: f32,
}

/// Velocity accumulators updated once per sample.
#[derive(Debug, Clone)]
pub struct DerivedMetrics {
    dt_s: f32,
    vx: f32,
    vy: f32,
    peak_speed_kmh: f32,
}

impl DerivedMetrics {
    /// Create an integrator with a fixed timestep of `dt_us` microseconds.
    pub fn new(dt_us: u64) -> Self {
        Self {
            dt_s: dt_us as f32 / 1_000_000.0,
            vx: 0.0,
            vy: 0.0,
            peak_speed_kmh: 0.0,
        }
    }

    /// Integrate one calibrated acceleration sample (in g).
    pub fn update(&mut self, accel: &Vec3) {
        self.vx += accel.x * G_TO_M_S2 * self.dt_s;
        self.vy += accel.y * G_TO_M_S2 * self.dt_s;

        let speed = self.speed_kmh();
        if speed > self.peak_speed_kmh {
            self.peak_speed_kmh = speed;
        }
    }

    pub fn speed_kmh(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt() * MS_TO_KMH
    }

    pub fn estimate(&self) -> SpeedEstimate {
        SpeedEstimate {
            vx: self.vx,
            vy: self.vy,
            speed_kmh: self.speed_kmh(),
            peak_speed_kmh: self.peak_speed_kmh,
        }
    }

    pub fn reset(&mut self) {
        self.vx = 0.0;
        self.vy = 0.0;
        self.peak_speed_kmh = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_acceleration() {
        // 0.1 g forward for one second at 1 kHz
        let mut metrics = DerivedMetrics::new(1000);
        for _ in 0..1000 {
            metrics.update(&Vec3::new(0.1, 0.0, 0.0));
        }

        let est = metrics.estimate();
        assert!((est.vx - 0.980_665).abs() < 1e-3);
        assert!((est.speed_kmh - 0.980_665 * 3.6).abs() < 1e-2);
        assert_eq!(est.peak_speed_kmh, est.speed_kmh);
    }

    #[test]
    fn test_planar_magnitude_ignores_z() {
        let mut metrics = DerivedMetrics::new(1_000_000);
        metrics.update(&Vec3::new(3.0 / G_TO_M_S2, 4.0 / G_TO_M_S2, 1.0));
        assert!((metrics.speed_kmh() - 5.0 * 3.6).abs() < 1e-3);
    }

    #[test]
    fn test_peak_survives_deceleration() {
        let mut metrics = DerivedMetrics::new(1_000_000);
        metrics.update(&Vec3::new(1.0, 0.0, 0.0));
        metrics.update(&Vec3::new(-1.0, 0.0, 0.0));

        let est = metrics.estimate();
        assert!(est.speed_kmh.abs() < 1e-3);
        assert!(est.peak_speed_kmh > 35.0);
    }

    #[test]
    fn test_reset() {
        let mut metrics = DerivedMetrics::new(1000);
        metrics.update(&Vec3::new(1.0, 1.0, 0.0));
        metrics.reset();
        assert_eq!(metrics.estimate(), SpeedEstimate::default());
    }
}
