//! Session control: the Idle/Recording state machine and the main-context
//! tick handler.
//!
//! Everything the main context mutates lives in one [`LoggerContext`]. The
//! sample clock only touches the [`ClockFlag`]; it is disabled around every
//! session mutation so a tick can never observe a half-opened or half-closed
//! file.

use crate::clock::{ClockFlag, SampleClock};
use crate::core::calibration::{self, CalibrationOffsets, CalibrationReport, CalibrationStore};
use crate::core::metrics::DerivedMetrics;
use crate::core::record::{format_record, RecordBuffer, MAX_RECORD_LEN};
use crate::diagnostics::{create_shared_stats, SharedLoggerStats};
use crate::error::LoggerError;
use crate::sensor::{Sample, SensorSource};
use crate::storage::{flush_buffer, LogFile, LogSession, StorageProvider, StorageWriter};
use crate::timefix::{to_utc, TimeFixProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Recording state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Recording,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Recording => write!(f, "recording"),
        }
    }
}

/// Tunables for a controller.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Upper bound on time between device syncs while dirty
    pub sync_interval_us: u64,
    pub buffer_capacity: usize,
    /// Appends are refused once fewer than this many bytes remain
    pub low_water: usize,
    pub calibration_samples: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sync_interval_us: 1_000_000,
            buffer_capacity: 8192,
            low_water: MAX_RECORD_LEN,
            calibration_samples: calibration::DEFAULT_CALIBRATION_SAMPLES,
        }
    }
}

/// State owned by the main context.
#[derive(Debug)]
pub struct LoggerContext<F: LogFile> {
    pub buffer: RecordBuffer,
    pub session: Option<LogSession<F>>,
    pub offsets: CalibrationOffsets,
    pub metrics: DerivedMetrics,
    pub flag: ClockFlag,
}

/// Outcome of a completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub path: PathBuf,
    pub started_at_us: u64,
    pub stopped_at_us: u64,
    /// Wall time at `started_at_us`, if a time fix was available
    pub utc_start: Option<DateTime<Utc>>,
    pub samples: u64,
    pub bytes_written: u64,
    pub short_writes: u64,
    /// File size reported by the read-only reopen after close
    pub verified_size: Option<u64>,
    pub peak_speed_kmh: f32,
}

impl SessionSummary {
    pub fn duration_us(&self) -> u64 {
        self.stopped_at_us.saturating_sub(self.started_at_us)
    }

    /// Wall time at `stopped_at_us`, derived from the start anchor.
    pub fn utc_stop(&self) -> Option<DateTime<Utc>> {
        self.utc_start
            .map(|anchor| to_utc(anchor, self.started_at_us, self.stopped_at_us))
    }

    /// The closed file reopened with exactly the bytes the session wrote.
    pub fn is_verified(&self) -> bool {
        self.verified_size == Some(self.bytes_written)
    }
}

/// Drives sampling and the log lifecycle.
pub struct SessionController<S, P, T>
where
    S: SensorSource,
    P: StorageProvider,
    T: TimeFixProvider,
{
    ctx: LoggerContext<P::File>,
    state: SessionState,
    sensor: S,
    sensor_ready: bool,
    writer: StorageWriter<P>,
    time_fix: T,
    clock: SampleClock,
    settings: SessionSettings,
    calibration_store: Option<CalibrationStore>,
    stats: SharedLoggerStats,
}

impl<S, P, T> SessionController<S, P, T>
where
    S: SensorSource,
    P: StorageProvider,
    T: TimeFixProvider,
{
    /// Create an idle controller. The sensor is probed once here.
    pub fn new(
        mut sensor: S,
        writer: StorageWriter<P>,
        time_fix: T,
        settings: SessionSettings,
    ) -> Self {
        let sensor_ready = match sensor.probe() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("sensor probe failed, recording disabled: {e}");
                false
            }
        };

        let period_us = writer.header().sample_period_us;
        let flag = ClockFlag::new();
        let clock = SampleClock::new(Duration::from_micros(period_us), flag.clone());
        let low_water = settings.low_water.max(MAX_RECORD_LEN);

        Self {
            ctx: LoggerContext {
                buffer: RecordBuffer::new(settings.buffer_capacity, low_water),
                session: None,
                offsets: CalibrationOffsets::zero(),
                metrics: DerivedMetrics::new(period_us),
                flag,
            },
            state: SessionState::Idle,
            sensor,
            sensor_ready,
            writer,
            time_fix,
            clock,
            settings,
            calibration_store: None,
            stats: create_shared_stats(),
        }
    }

    /// Load offsets from `store` and save future calibrations there.
    pub fn with_calibration_store(mut self, store: CalibrationStore) -> Self {
        self.ctx.offsets = store.load_or_zero();
        self.calibration_store = Some(store);
        self
    }

    pub fn with_stats(mut self, stats: SharedLoggerStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn sensor_ready(&self) -> bool {
        self.sensor_ready
    }

    pub fn offsets(&self) -> &CalibrationOffsets {
        &self.ctx.offsets
    }

    pub fn metrics(&self) -> &DerivedMetrics {
        &self.ctx.metrics
    }

    pub fn context(&self) -> &LoggerContext<P::File> {
        &self.ctx
    }

    pub fn current_session(&self) -> Option<&LogSession<P::File>> {
        self.ctx.session.as_ref()
    }

    pub fn clock(&self) -> &SampleClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut SampleClock {
        &mut self.clock
    }

    pub fn writer(&self) -> &StorageWriter<P> {
        &self.writer
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn stats(&self) -> &SharedLoggerStats {
        &self.stats
    }

    /// Open the next log file and begin recording.
    pub fn start(&mut self, now_us: u64) -> Result<PathBuf, LoggerError> {
        if self.state == SessionState::Recording {
            tracing::warn!("start ignored: a session is already recording");
            return Err(LoggerError::AlreadyRecording);
        }
        if !self.sensor_ready {
            return Err(LoggerError::DeviceUnavailable(
                "sensor did not respond to probe".to_string(),
            ));
        }

        self.clock.disable();
        let utc_anchor = self.time_fix.current_fix();

        let outcome = match self.writer.open_session(now_us, utc_anchor) {
            Ok(session) => {
                let path = session.path.clone();
                tracing::info!(
                    path = %path.display(),
                    session_id = %session.id,
                    time_fix = utc_anchor.is_some(),
                    "recording started"
                );
                self.ctx.buffer.clear();
                self.ctx.metrics.reset();
                self.ctx.session = Some(session);
                self.state = SessionState::Recording;
                self.stats.record_session_started();
                Ok(path)
            }
            Err(e) => {
                tracing::warn!("could not start recording: {e}");
                self.stats.record_write_error();
                Err(e)
            }
        };

        self.clock.enable();
        outcome
    }

    /// Stop recording: flush, sync, close, then verify the closed file.
    ///
    /// Returns `None` when already idle.
    pub fn stop(&mut self, now_us: u64) -> Option<SessionSummary> {
        if self.state == SessionState::Idle {
            return None;
        }

        self.clock.disable();
        self.flush();
        let Some(mut session) = self.ctx.session.take() else {
            self.state = SessionState::Idle;
            self.clock.enable();
            return None;
        };

        match session.sync(now_us) {
            Ok(()) => self.stats.record_sync(),
            Err(e) => {
                tracing::error!("final sync failed: {e}");
                self.stats.record_write_error();
            }
        }

        let mut summary = SessionSummary {
            session_id: session.id.to_string(),
            path: session.path.clone(),
            started_at_us: session.started_at_us,
            stopped_at_us: now_us,
            utc_start: session.utc_anchor,
            samples: session.samples,
            bytes_written: session.bytes_written,
            short_writes: session.short_writes,
            verified_size: None,
            peak_speed_kmh: self.ctx.metrics.estimate().peak_speed_kmh,
        };

        let closed = session.close();
        self.state = SessionState::Idle;
        self.clock.enable();

        match closed {
            Ok(path) => match self.writer.verify(&path) {
                Ok(size) => summary.verified_size = Some(size),
                Err(e) => tracing::warn!(path = %path.display(), "log not readable after close: {e}"),
            },
            Err(e) => {
                tracing::error!("closing log failed: {e}");
                self.stats.record_write_error();
            }
        }

        tracing::info!(
            path = %summary.path.display(),
            samples = summary.samples,
            bytes = summary.bytes_written,
            verified_size = ?summary.verified_size,
            "recording stopped"
        );
        self.stats.record_session_completed(summary.clone());
        Some(summary)
    }

    /// One pass of the main loop: handle a pending tick, then service sync.
    ///
    /// Returns whether a tick was consumed.
    pub fn poll(&mut self, now_us: u64) -> bool {
        let ticked = self.ctx.flag.take();
        if ticked {
            self.process_tick(now_us);
        }
        self.stats.set_ticks_raised(self.ctx.flag.raised_count());
        self.service_sync(now_us);
        ticked
    }

    /// Fire the clock once and poll. Stands in for a timer interrupt.
    pub fn step(&mut self, now_us: u64) -> bool {
        self.clock.fire();
        self.poll(now_us)
    }

    /// Sample the sensor and, when recording, stage one record.
    pub fn process_tick(&mut self, now_us: u64) {
        self.stats.record_tick();

        let raw = match self.sensor.read() {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!("sensor read failed, tick skipped: {e}");
                self.stats.record_sensor_error();
                return;
            }
        };

        let calibrated = self.ctx.offsets.apply(&raw);
        self.ctx.metrics.update(&calibrated.accel);

        if self.state != SessionState::Recording {
            return;
        }

        let sample = Sample::new(now_us, calibrated.gyro, calibrated.accel);
        let mut record = [0u8; MAX_RECORD_LEN];
        let Some(len) = format_record(&sample, &mut record) else {
            self.stats.record_dropped();
            return;
        };

        if self.ctx.buffer.append(&record[..len]).is_err() {
            self.flush();
            if let Err(e) = self.ctx.buffer.append(&record[..len]) {
                tracing::warn!("record dropped: {e}");
                self.stats.record_dropped();
                return;
            }
        }

        if let Some(session) = self.ctx.session.as_mut() {
            session.samples += 1;
        }
        self.stats.record_sample(len);

        if self.ctx.buffer.is_near_full() {
            self.flush();
        }
    }

    /// Force a device sync once the interval has elapsed with unsynced data.
    ///
    /// Staged bytes still in the buffer count as unsynced.
    pub fn service_sync(&mut self, now_us: u64) {
        let interval = self.settings.sync_interval_us;
        let pending = !self.ctx.buffer.is_empty();
        let due = match self.ctx.session.as_ref() {
            Some(session) => {
                session.sync_due(now_us, interval)
                    || (pending && now_us.saturating_sub(session.last_sync_us) >= interval)
            }
            None => false,
        };
        if !due {
            return;
        }

        self.flush();
        let Some(session) = self.ctx.session.as_mut() else {
            return;
        };
        match session.sync(now_us) {
            Ok(()) => {
                tracing::debug!(bytes = session.bytes_written, "log synced");
                self.stats.record_sync();
            }
            Err(e) => {
                tracing::error!("sync failed: {e}");
                self.stats.record_write_error();
            }
        }
    }

    /// Average readings at rest and apply them as the new offsets.
    ///
    /// Refused while recording so a session never mixes two calibrations.
    pub fn calibrate(&mut self) -> Result<CalibrationReport, LoggerError> {
        if self.state == SessionState::Recording {
            return Err(LoggerError::AlreadyRecording);
        }
        if !self.sensor_ready {
            return Err(LoggerError::DeviceUnavailable(
                "sensor did not respond to probe".to_string(),
            ));
        }

        let report = calibration::calibrate(&mut self.sensor, self.settings.calibration_samples)?;

        if let Some(store) = &self.calibration_store {
            store
                .save(&report.offsets)
                .map_err(crate::storage::StorageError::from)?;
        }

        self.ctx.offsets = report.offsets;
        self.ctx.metrics.reset();
        tracing::info!(samples = report.samples, offsets = %report.offsets.to_line().trim_end(), "calibration applied");
        Ok(report)
    }

    /// Move staged records to the open file, counting the outcome.
    fn flush(&mut self) {
        let Some(session) = self.ctx.session.as_mut() else {
            self.ctx.buffer.clear();
            return;
        };

        match flush_buffer(session, &mut self.ctx.buffer) {
            Ok(0) => {}
            Ok(written) => {
                tracing::debug!(bytes = written, "buffer flushed");
                self.stats.record_flush(written);
            }
            Err(LoggerError::ShortWrite { requested, written }) => {
                tracing::warn!("short write: {written} of {requested} bytes reached the log");
                self.stats.record_short_write(written);
            }
            Err(e) => {
                tracing::error!("flush failed: {e}");
                self.stats.record_write_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{RawReading, SimulatedSensor, Vec3};
    use crate::storage::{LogHeader, MemoryStorage};
    use crate::timefix::NoTimeFix;

    fn controller(
        sensor: SimulatedSensor,
        storage: MemoryStorage,
    ) -> SessionController<SimulatedSensor, MemoryStorage, NoTimeFix> {
        let writer = StorageWriter::new(storage, LogHeader::new("test", "unit", 1000));
        SessionController::new(sensor, writer, NoTimeFix, SessionSettings::default())
    }

    #[test]
    fn test_start_and_stop() {
        let storage = MemoryStorage::new();
        let mut c = controller(SimulatedSensor::stationary(), storage.clone());

        assert_eq!(c.state(), SessionState::Idle);
        let path = c.start(0).unwrap();
        assert_eq!(path, PathBuf::from("00001.csv"));
        assert!(c.is_recording());
        assert!(c.clock().is_enabled());

        for i in 1..=10 {
            assert!(c.step(i * 1000));
        }

        let summary = c.stop(11_000).unwrap();
        assert_eq!(summary.samples, 10);
        assert!(summary.is_verified());
        assert_eq!(c.state(), SessionState::Idle);
        assert!(c.clock().is_enabled());
        assert!(!storage.is_open(&path));
    }

    #[test]
    fn test_second_start_rejected() {
        let storage = MemoryStorage::new();
        let mut c = controller(SimulatedSensor::stationary(), storage.clone());

        c.start(0).unwrap();
        assert!(matches!(c.start(10), Err(LoggerError::AlreadyRecording)));
        assert_eq!(storage.file_names().len(), 1);
    }

    #[test]
    fn test_unresponsive_sensor() {
        let mut c = controller(SimulatedSensor::unresponsive(), MemoryStorage::new());
        assert!(!c.sensor_ready());
        assert!(matches!(c.start(0), Err(LoggerError::DeviceUnavailable(_))));
        assert!(matches!(c.calibrate(), Err(LoggerError::DeviceUnavailable(_))));
        assert_eq!(c.state(), SessionState::Idle);
    }

    #[test]
    fn test_idle_ticks_write_nothing() {
        let storage = MemoryStorage::new();
        let mut c = controller(SimulatedSensor::stationary(), storage.clone());

        for i in 1..=5 {
            c.step(i * 1000);
        }
        assert!(storage.file_names().is_empty());
        assert!(c.context().buffer.is_empty());
        assert_eq!(c.stats().stats().ticks_processed, 5);
    }

    #[test]
    fn test_offsets_applied_to_records() {
        let storage = MemoryStorage::new();
        let reading = RawReading::new(Vec3::new(1.5, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0));
        let mut c = controller(SimulatedSensor::fixed(reading), storage.clone());
        c.ctx.offsets = CalibrationOffsets::new(Vec3::new(0.5, 0.0, 0.0), Vec3::ZERO);

        let path = c.start(0).unwrap();
        c.step(1000);
        c.stop(2000);

        let text = String::from_utf8(storage.contents(&path).unwrap()).unwrap();
        assert!(text.ends_with("1000,1.000,0.000,0.000,0.0000,0.0000,1.0000\n"));
    }

    #[test]
    fn test_sensor_errors_skip_tick() {
        let storage = MemoryStorage::new();
        let sensor = SimulatedSensor::stationary().with_read_failures(2);
        let mut c = controller(sensor, storage);

        c.start(0).unwrap();
        for i in 1..=5 {
            c.step(i * 1000);
        }
        let summary = c.stop(6000).unwrap();

        assert_eq!(summary.samples, 3);
        assert_eq!(c.stats().stats().sensor_errors, 2);
    }

    #[test]
    fn test_calibrate_resets_metrics() {
        let reading = RawReading::new(Vec3::ZERO, Vec3::new(0.5, 0.0, 1.0));
        let mut c = controller(SimulatedSensor::fixed(reading), MemoryStorage::new());

        for i in 1..=100 {
            c.step(i * 1000);
        }
        assert!(c.metrics().speed_kmh() > 0.0);

        let report = c.calibrate().unwrap();
        assert!((report.offsets.accel_bias.x - 0.5).abs() < 1e-6);
        assert_eq!(c.metrics().speed_kmh(), 0.0);

        // Calibrated input is now at rest
        c.step(101_000);
        assert!(c.metrics().speed_kmh().abs() < 1e-3);
    }

    #[test]
    fn test_calibrate_rejected_while_recording() {
        let mut c = controller(SimulatedSensor::stationary(), MemoryStorage::new());
        c.start(0).unwrap();
        assert!(matches!(c.calibrate(), Err(LoggerError::AlreadyRecording)));
    }

    #[test]
    fn test_sync_interval() {
        let storage = MemoryStorage::new();
        let mut c = controller(SimulatedSensor::stationary(), storage.clone());
        c.start(0).unwrap();

        c.step(1000);
        assert_eq!(storage.sync_count(), 0);

        // Nothing flushed yet, but staged bytes still count
        c.poll(1_000_000);
        assert_eq!(storage.sync_count(), 1);
        assert!(c.context().buffer.is_empty());
        assert!(!c.current_session().unwrap().dirty);

        // Clean file: no sync however long we wait
        c.poll(5_000_000);
        assert_eq!(storage.sync_count(), 1);
    }
}
