//! Calibration bias: computation from a resting device, persistence, loading.
//!
//! The calibration file is a single line of six comma-separated decimals in
//! the order `gx,gy,gz,ax,ay,az`. Loading is all-or-nothing: anything other
//! than exactly six finite numbers yields "no calibration" and the caller
//! falls back to zero offsets.

use crate::sensor::types::{RawReading, Vec3};
use crate::sensor::{SensorError, SensorSource};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Number of resting samples averaged by a calibration run.
pub const DEFAULT_CALIBRATION_SAMPLES: usize = 500;

/// Gravity on the Z axis of a device lying flat, in g.
const GRAVITY_G: f64 = 1.0;

/// Constant bias subtracted from raw readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOffsets {
    pub gyro_bias: Vec3,
    /// Accelerometer bias; `z` is net of 1 g so a resting device reads zero
    pub accel_bias: Vec3,
}

impl CalibrationOffsets {
    pub fn new(gyro_bias: Vec3, accel_bias: Vec3) -> Self {
        Self {
            gyro_bias,
            accel_bias,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Subtract the bias from a raw reading.
    pub fn apply(&self, raw: &RawReading) -> RawReading {
        RawReading::new(raw.gyro.sub(&self.gyro_bias), raw.accel.sub(&self.accel_bias))
    }

    /// Serialize as the one-line file format.
    pub fn to_line(&self) -> String {
        // `{}` on f32 is the shortest representation that parses back exactly
        format!(
            "{},{},{},{},{},{}\n",
            self.gyro_bias.x,
            self.gyro_bias.y,
            self.gyro_bias.z,
            self.accel_bias.x,
            self.accel_bias.y,
            self.accel_bias.z
        )
    }

    /// Parse the one-line file format. Requires exactly six finite fields.
    pub fn parse_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() != 6 {
            return None;
        }

        let mut values = [0f32; 6];
        for (slot, field) in values.iter_mut().zip(&fields) {
            let value: f32 = field.trim().parse().ok()?;
            if !value.is_finite() {
                return None;
            }
            *slot = value;
        }

        Some(Self::new(
            Vec3::new(values[0], values[1], values[2]),
            Vec3::new(values[3], values[4], values[5]),
        ))
    }
}

/// Result of a calibration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub offsets: CalibrationOffsets,
    /// Number of readings averaged
    pub samples: usize,
    /// Per-axis sample standard deviation of the gyro readings (deg/s)
    pub gyro_noise: Vec3,
    /// Per-axis sample standard deviation of the accel readings (g)
    pub accel_noise: Vec3,
}

/// Errors that can abort a calibration run.
#[derive(Debug)]
pub enum CalibrationError {
    NoSamples,
    Sensor(SensorError),
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationError::NoSamples => write!(f, "Calibration needs at least one sample"),
            CalibrationError::Sensor(e) => write!(f, "Calibration aborted: {e}"),
        }
    }
}

impl std::error::Error for CalibrationError {}

impl From<SensorError> for CalibrationError {
    fn from(e: SensorError) -> Self {
        CalibrationError::Sensor(e)
    }
}

/// Read `samples` readings as fast as the sensor allows and average them.
///
/// The device must be at rest and level. Accel Z is averaged as `az - 1`
/// so the stored bias excludes gravity.
pub fn calibrate<S: SensorSource + ?Sized>(
    sensor: &mut S,
    samples: usize,
) -> Result<CalibrationReport, CalibrationError> {
    if samples == 0 {
        return Err(CalibrationError::NoSamples);
    }

    let mut columns: [Vec<f64>; 6] = Default::default();
    for column in columns.iter_mut() {
        column.reserve_exact(samples);
    }

    for _ in 0..samples {
        let raw = sensor.read()?;
        columns[0].push(raw.gyro.x as f64);
        columns[1].push(raw.gyro.y as f64);
        columns[2].push(raw.gyro.z as f64);
        columns[3].push(raw.accel.x as f64);
        columns[4].push(raw.accel.y as f64);
        columns[5].push(raw.accel.z as f64 - GRAVITY_G);
    }

    let mean = |c: &Vec<f64>| c.iter().mean() as f32;
    // Sample std dev is undefined for a single reading
    let noise = |c: &Vec<f64>| {
        if c.len() < 2 {
            0.0
        } else {
            c.iter().std_dev() as f32
        }
    };

    let offsets = CalibrationOffsets::new(
        Vec3::new(mean(&columns[0]), mean(&columns[1]), mean(&columns[2])),
        Vec3::new(mean(&columns[3]), mean(&columns[4]), mean(&columns[5])),
    );

    Ok(CalibrationReport {
        offsets,
        samples,
        gyro_noise: Vec3::new(noise(&columns[0]), noise(&columns[1]), noise(&columns[2])),
        accel_noise: Vec3::new(noise(&columns[3]), noise(&columns[4]), noise(&columns[5])),
    })
}

/// Persists calibration offsets at a fixed path.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `offsets`, replacing any previous calibration.
    pub fn save(&self, offsets: &CalibrationOffsets) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(offsets.to_line().as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Load stored offsets, or `None` if the file is missing or malformed.
    pub fn load(&self) -> Option<CalibrationOffsets> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = ?self.path, "no calibration loaded: {e}");
                return None;
            }
        };

        let offsets = CalibrationOffsets::parse_line(&content);
        if offsets.is_none() {
            tracing::warn!(path = ?self.path, "ignoring malformed calibration file");
        }
        offsets
    }

    /// Load stored offsets, falling back to zero.
    pub fn load_or_zero(&self) -> CalibrationOffsets {
        self.load().unwrap_or_default()
    }
}
