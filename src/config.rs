//! Configuration for the IMU logger.

use crate::core::record::MAX_RECORD_LEN;
use crate::core::session::SessionSettings;
use crate::core::DEFAULT_CALIBRATION_SAMPLES;
use crate::storage::LogHeader;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sample clock period in microseconds
    pub sample_period_us: u64,

    /// Longest time buffered data may sit before a forced device sync
    #[serde(with = "duration_serde")]
    pub sync_interval: Duration,

    /// Size of the record staging buffer in bytes
    pub buffer_capacity: usize,

    /// Flush once fewer than this many bytes remain in the buffer
    pub low_water_mark: usize,

    /// Resting samples averaged by `calibrate`
    pub calibration_samples: usize,

    /// Directory that receives `NNNNN.csv` logs
    pub log_dir: PathBuf,

    /// Where calibration offsets are stored
    pub calibration_path: PathBuf,

    /// Path for storing stats
    pub data_path: PathBuf,

    /// Written to the `id` header line
    pub logger_id: String,

    /// Written to the `description` header line
    pub description: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imu-logger");

        Self {
            sample_period_us: 1000,
            sync_interval: Duration::from_secs(1),
            buffer_capacity: 8192,
            low_water_mark: MAX_RECORD_LEN,
            calibration_samples: DEFAULT_CALIBRATION_SAMPLES,
            log_dir: data_dir.join("logs"),
            calibration_path: data_dir.join("calibration.txt"),
            data_path: data_dir,
            logger_id: default_logger_id(),
            description: String::new(),
        }
    }
}

fn default_logger_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "imu-logger".to_string())
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imu-logger")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.log_dir).map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_period_us == 0 {
            return Err(ConfigError::Invalid(
                "sample_period_us must be non-zero".to_string(),
            ));
        }
        if self.sync_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "sync_interval must be at least one second".to_string(),
            ));
        }
        if self.low_water_mark < MAX_RECORD_LEN {
            return Err(ConfigError::Invalid(format!(
                "low_water_mark must be at least {MAX_RECORD_LEN} bytes"
            )));
        }
        if self.buffer_capacity < self.low_water_mark * 2 {
            return Err(ConfigError::Invalid(
                "buffer_capacity must be at least twice low_water_mark".to_string(),
            ));
        }
        if self.calibration_samples == 0 {
            return Err(ConfigError::Invalid(
                "calibration_samples must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Header written at the top of each log.
    pub fn log_header(&self) -> LogHeader {
        LogHeader::new(&self.logger_id, &self.description, self.sample_period_us)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            sync_interval_us: self.sync_interval.as_micros() as u64,
            buffer_capacity: self.buffer_capacity,
            low_water: self.low_water_mark,
            calibration_samples: self.calibration_samples,
        }
    }

    /// Path of the persisted stats file.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
