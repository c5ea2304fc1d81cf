//! Logger statistics.
//!
//! Counters are updated from the main loop and read by the CLI. They are
//! persisted between runs so `status` can show cumulative numbers.

use crate::core::session::SessionSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Running counters for the sampling and storage pipeline.
#[derive(Debug)]
pub struct LoggerStats {
    /// Ticks raised by the sample clock in this process
    ticks_raised: AtomicU64,
    /// Ticks raised in earlier runs, restored from disk
    ticks_raised_before: AtomicU64,
    /// Ticks observed and handled by the main context
    ticks_processed: AtomicU64,
    samples_written: AtomicU64,
    /// Samples that could not be formatted or staged
    records_dropped: AtomicU64,
    bytes_appended: AtomicU64,
    bytes_flushed: AtomicU64,
    flushes: AtomicU64,
    syncs: AtomicU64,
    short_writes: AtomicU64,
    write_errors: AtomicU64,
    sensor_errors: AtomicU64,
    sessions_started: AtomicU64,
    sessions_completed: AtomicU64,
    last_session: Mutex<Option<SessionSummary>>,
    /// When this process started counting
    started: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl LoggerStats {
    pub fn new() -> Self {
        Self {
            ticks_raised: AtomicU64::new(0),
            ticks_raised_before: AtomicU64::new(0),
            ticks_processed: AtomicU64::new(0),
            samples_written: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            bytes_appended: AtomicU64::new(0),
            bytes_flushed: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
            short_writes: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            sensor_errors: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
            last_session: Mutex::new(None),
            started: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that persist to `path`, seeded from any previous run.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("could not load previous logger stats: {e}");
        }

        stats
    }

    pub fn set_ticks_raised(&self, total: u64) {
        self.ticks_raised.store(total, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample(&self, bytes: usize) {
        self.samples_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_appended.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, bytes: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.bytes_flushed.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sync(&self) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_short_write(&self, written: usize) {
        self.short_writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_flushed.fetch_add(written as u64, Ordering::Relaxed);
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sensor_error(&self) {
        self.sensor_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_completed(&self, summary: SessionSummary) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
        let mut last = self.last_session.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(summary);
    }

    pub fn last_session(&self) -> Option<SessionSummary> {
        self.last_session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Get the current statistics.
    pub fn stats(&self) -> StatsSnapshot {
        let ticks_raised = self.ticks_raised_before.load(Ordering::Relaxed)
            + self.ticks_raised.load(Ordering::Relaxed);
        let ticks_processed = self.ticks_processed.load(Ordering::Relaxed);
        StatsSnapshot {
            ticks_raised,
            ticks_processed,
            ticks_coalesced: ticks_raised.saturating_sub(ticks_processed),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            bytes_flushed: self.bytes_flushed.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            short_writes: self.short_writes.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            sensor_errors: self.sensor_errors.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            started: self.started,
            uptime_secs: (Utc::now() - self.started).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let mut text = format!(
            "Logger Statistics:\n\
             - Ticks raised / processed: {} / {}\n\
             - Ticks lost to overrun: {}\n\
             - Samples written: {}\n\
             - Records dropped: {}\n\
             - Bytes staged / flushed: {} / {}\n\
             - Flushes / syncs: {} / {}\n\
             - Short writes: {}, write errors: {}\n\
             - Sensor read errors: {}\n\
             - Sessions started / completed: {} / {}",
            stats.ticks_raised,
            stats.ticks_processed,
            stats.ticks_coalesced,
            stats.samples_written,
            stats.records_dropped,
            stats.bytes_appended,
            stats.bytes_flushed,
            stats.flushes,
            stats.syncs,
            stats.short_writes,
            stats.write_errors,
            stats.sensor_errors,
            stats.sessions_started,
            stats.sessions_completed,
        );

        if let Some(session) = self.last_session() {
            text.push_str(&format!(
                "\n\nLast Session:\n\
                 - File: {}\n\
                 - Samples: {}\n\
                 - Size on card: {}",
                session.path.display(),
                session.samples,
                session
                    .verified_size
                    .map(|s| format!("{s} bytes"))
                    .unwrap_or_else(|| "not verified".to_string()),
            ));
        }

        text
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                ticks_raised: stats.ticks_raised,
                ticks_processed: stats.ticks_processed,
                ticks_coalesced: stats.ticks_coalesced,
                samples_written: stats.samples_written,
                records_dropped: stats.records_dropped,
                bytes_appended: stats.bytes_appended,
                bytes_flushed: stats.bytes_flushed,
                flushes: stats.flushes,
                syncs: stats.syncs,
                short_writes: stats.short_writes,
                write_errors: stats.write_errors,
                sensor_errors: stats.sensor_errors,
                sessions_started: stats.sessions_started,
                sessions_completed: stats.sessions_completed,
                last_session: self.last_session(),
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                // The clock's raise count restarts at zero each run
                self.ticks_raised_before
                    .store(persisted.ticks_raised, Ordering::Relaxed);
                self.ticks_processed
                    .store(persisted.ticks_processed, Ordering::Relaxed);
                self.samples_written
                    .store(persisted.samples_written, Ordering::Relaxed);
                self.records_dropped
                    .store(persisted.records_dropped, Ordering::Relaxed);
                self.bytes_appended
                    .store(persisted.bytes_appended, Ordering::Relaxed);
                self.bytes_flushed
                    .store(persisted.bytes_flushed, Ordering::Relaxed);
                self.flushes.store(persisted.flushes, Ordering::Relaxed);
                self.syncs.store(persisted.syncs, Ordering::Relaxed);
                self.short_writes
                    .store(persisted.short_writes, Ordering::Relaxed);
                self.write_errors
                    .store(persisted.write_errors, Ordering::Relaxed);
                self.sensor_errors
                    .store(persisted.sensor_errors, Ordering::Relaxed);
                self.sessions_started
                    .store(persisted.sessions_started, Ordering::Relaxed);
                self.sessions_completed
                    .store(persisted.sessions_completed, Ordering::Relaxed);
                *self
                    .last_session
                    .get_mut()
                    .unwrap_or_else(|e| e.into_inner()) = persisted.last_session;
            }
        }
        Ok(())
    }
}

impl Default for LoggerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of logger statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub ticks_raised: u64,
    pub ticks_processed: u64,
    /// Ticks that fired while a previous one was still pending
    pub ticks_coalesced: u64,
    pub samples_written: u64,
    pub records_dropped: u64,
    pub bytes_appended: u64,
    pub bytes_flushed: u64,
    pub flushes: u64,
    pub syncs: u64,
    pub short_writes: u64,
    pub write_errors: u64,
    pub sensor_errors: u64,
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub started: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
///
/// Counters missing from an older file load as zero.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    ticks_raised: u64,
    #[serde(default)]
    ticks_processed: u64,
    /// Informational; recomputed from the two tick counts on load
    ticks_coalesced: u64,
    samples_written: u64,
    records_dropped: u64,
    #[serde(default)]
    bytes_appended: u64,
    #[serde(default)]
    bytes_flushed: u64,
    #[serde(default)]
    flushes: u64,
    #[serde(default)]
    syncs: u64,
    short_writes: u64,
    write_errors: u64,
    #[serde(default)]
    sensor_errors: u64,
    #[serde(default)]
    sessions_started: u64,
    sessions_completed: u64,
    last_session: Option<SessionSummary>,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared stats.
pub type SharedLoggerStats = Arc<LoggerStats>;

pub fn create_shared_stats() -> SharedLoggerStats {
    Arc::new(LoggerStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedLoggerStats {
    Arc::new(LoggerStats::with_persistence(path))
}
