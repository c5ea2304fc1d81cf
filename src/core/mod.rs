//! Core functionality for the IMU logger.
//!
//! This module contains:
//! - Record formatting and the fixed-capacity staging buffer
//! - Calibration offsets and their persistence
//! - Dead-reckoning speed metrics
//! - The session controller that ties the pipeline together

pub mod calibration;
pub mod metrics;
pub mod record;
pub mod session;

// Re-export commonly used types
pub use calibration::{
    calibrate, CalibrationError, CalibrationOffsets, CalibrationReport, CalibrationStore,
    DEFAULT_CALIBRATION_SAMPLES,
};
pub use metrics::{DerivedMetrics, SpeedEstimate};
pub use record::{format_record, BufferOverflow, RecordBuffer, MAX_RECORD_LEN};
pub use session::{
    LoggerContext, SessionController, SessionSettings, SessionState, SessionSummary,
};
