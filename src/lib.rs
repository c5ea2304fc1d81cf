//! IMU Logger - fixed-rate gyroscope/accelerometer capture to Gyroflow logs.
//!
//! This library samples an inertial sensor at a fixed rate, subtracts stored
//! calibration offsets and appends each sample as a CSV row to a sequentially
//! numbered log file on removable storage.
//!
//! # Guarantees
//!
//! - **No overwrites**: each session takes the first unused `NNNNN.csv` name
//! - **Bounded loss**: unsynced data is never older than the sync interval
//! - **Observable overrun**: ticks lost to a busy main loop are counted
//! - **All-or-nothing calibration**: a malformed offsets file is never applied
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         IMU Logger                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │ SampleClock │──▶│  ClockFlag  │──▶│  Session    │       │
//! │  │   (timer)   │   │ (1 slot)    │   │ Controller  │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                                        │    │    │          │
//! │                 ┌──────────────────────┘    │    └───────┐  │
//! │                 ▼                           ▼            ▼  │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Sensor    │   │RecordBuffer │──▶│  Storage    │       │
//! │  │ + offsets   │   │ (fixed cap) │   │  Writer     │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use imu_logger::{
//!     LogHeader, FsStorage, NoTimeFix, SessionController, SessionSettings,
//!     SimulatedSensor, StorageWriter, Uptime,
//! };
//!
//! let storage = FsStorage::new("logs").expect("storage");
//! let writer = StorageWriter::new(storage, LogHeader::new("bench", "", 1000));
//! let mut controller = SessionController::new(
//!     SimulatedSensor::stationary(),
//!     writer,
//!     NoTimeFix,
//!     SessionSettings::default(),
//! );
//!
//! let uptime = Uptime::new();
//! controller.clock_mut().start().expect("clock");
//! controller.start(uptime.micros()).expect("start");
//! while uptime.micros() < 2_000_000 {
//!     controller.poll(uptime.micros());
//! }
//! let summary = controller.stop(uptime.micros());
//! ```

pub mod clock;
pub mod config;
pub mod core;
pub mod diagnostics;
pub mod error;
pub mod sensor;
pub mod storage;
pub mod timefix;

// Re-export key types at crate root for convenience
pub use clock::{ClockError, ClockFlag, SampleClock, Uptime};
pub use config::{Config, ConfigError};
pub use core::{
    CalibrationOffsets, CalibrationReport, CalibrationStore, DerivedMetrics, RecordBuffer,
    SessionController, SessionSettings, SessionState, SessionSummary,
};
pub use diagnostics::{LoggerStats, SharedLoggerStats, StatsSnapshot};
pub use error::LoggerError;
pub use sensor::{RawReading, Sample, SensorError, SensorSource, SimulatedSensor, Vec3};
pub use storage::{
    inspect_log, FsStorage, LogHeader, LogReport, MemoryStorage, StorageError, StorageProvider,
    StorageWriter,
};
pub use timefix::{FixedTimeFix, NoTimeFix, SystemTimeFix, TimeFixProvider};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
