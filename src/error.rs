//! Logger error types.
//!
//! Every error is local to the operation that produced it. The main loop logs
//! and carries on; nothing here is meant to end a recording session.

use crate::core::calibration::CalibrationError;
use crate::storage::StorageError;
use std::path::PathBuf;

/// Errors surfaced by session operations.
#[derive(Debug)]
pub enum LoggerError {
    /// Sensor or storage failed to initialize; recording cannot start
    DeviceUnavailable(String),
    /// The log file could not be created or its header written
    OpenFailure {
        path: Option<PathBuf>,
        reason: String,
    },
    /// The medium accepted fewer bytes than requested; the rest are lost
    ShortWrite { requested: usize, written: usize },
    /// A session is already recording
    AlreadyRecording,
    Calibration(CalibrationError),
    Storage(StorageError),
}

impl std::fmt::Display for LoggerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggerError::DeviceUnavailable(e) => write!(f, "Device unavailable: {e}"),
            LoggerError::OpenFailure {
                path: Some(path),
                reason,
            } => write!(f, "Failed to open {}: {reason}", path.display()),
            LoggerError::OpenFailure { path: None, reason } => {
                write!(f, "Failed to open log file: {reason}")
            }
            LoggerError::ShortWrite { requested, written } => {
                write!(f, "Short write: {written} of {requested} bytes")
            }
            LoggerError::AlreadyRecording => write!(f, "A session is already recording"),
            LoggerError::Calibration(e) => write!(f, "{e}"),
            LoggerError::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LoggerError {}

impl From<StorageError> for LoggerError {
    fn from(e: StorageError) -> Self {
        LoggerError::Storage(e)
    }
}

impl From<CalibrationError> for LoggerError {
    fn from(e: CalibrationError) -> Self {
        LoggerError::Calibration(e)
    }
}
