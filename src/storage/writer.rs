//! Log session files: naming, header, append, flush, sync, verified close.
//!
//! File names are sequential five-digit indices (`00001.csv`, `00002.csv`,
//! ...). Each new session takes the first index with no existing file, so a
//! session never overwrites earlier data.

use crate::core::record::RecordBuffer;
use crate::error::LoggerError;
use crate::storage::{LogFile, StorageError, StorageProvider};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const LOG_FILE_EXTENSION: &str = "csv";

/// Highest index representable in five digits.
pub const MAX_LOG_INDEX: u32 = 99_999;

const FORMAT_IDENTITY: &str = "GYROFLOW IMU LOG";
const FORMAT_VERSION: &str = "1.3";
const ORIENTATION: &str = "YxZ";
/// Timestamps are microseconds
const TSCALE: &str = "0.000001";
/// Gyro is logged in deg/s
const GSCALE: &str = "0.01745329252";
/// Accel is logged in g
const ASCALE: &str = "1";
const COLUMNS: &str = "t,gx,gy,gz,ax,ay,az";

/// Number of lines in a rendered header.
pub const HEADER_LINES: usize = 10;

/// Name of the log file with the given index.
pub fn log_file_name(index: u32) -> String {
    format!("{index:05}.{LOG_FILE_EXTENSION}")
}

/// First unused log path on `storage`, scanning upward from index 1.
pub fn next_log_path<P: StorageProvider + ?Sized>(storage: &P) -> Option<PathBuf> {
    (1..=MAX_LOG_INDEX)
        .map(|index| PathBuf::from(log_file_name(index)))
        .find(|path| !storage.exists(path))
}

/// The Gyroflow header written at the top of every log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHeader {
    pub logger_id: String,
    pub description: String,
    pub sample_period_us: u64,
}

impl LogHeader {
    pub fn new(
        logger_id: impl Into<String>,
        description: impl Into<String>,
        sample_period_us: u64,
    ) -> Self {
        Self {
            logger_id: logger_id.into(),
            description: description.into(),
            sample_period_us,
        }
    }

    pub fn sample_rate_hz(&self) -> u64 {
        1_000_000 / self.sample_period_us.max(1)
    }

    /// Render the header. Identical inputs always give identical bytes.
    pub fn render(&self) -> String {
        format!(
            "{FORMAT_IDENTITY}\n\
             version,{FORMAT_VERSION}\n\
             id,{}\n\
             description,{}\n\
             orientation,{ORIENTATION}\n\
             sample_rate,{}\n\
             tscale,{TSCALE}\n\
             gscale,{GSCALE}\n\
             ascale,{ASCALE}\n\
             {COLUMNS}\n",
            single_line(&self.logger_id),
            single_line(&self.description),
            self.sample_rate_hz()
        )
    }

    /// The column line that ends the header.
    pub fn columns() -> &'static str {
        COLUMNS
    }

    /// The first header line.
    pub fn identity() -> &'static str {
        FORMAT_IDENTITY
    }
}

/// Keep free text on one header line.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// The active log file and its durability bookkeeping.
#[derive(Debug)]
pub struct LogSession<F: LogFile> {
    pub id: Uuid,
    pub path: PathBuf,
    pub started_at_us: u64,
    pub last_sync_us: u64,
    /// True while bytes have been written that are not yet synced
    pub dirty: bool,
    /// UTC time at `started_at_us`, when a time fix was available
    pub utc_anchor: Option<DateTime<Utc>>,
    pub bytes_written: u64,
    pub samples: u64,
    pub short_writes: u64,
    file: F,
}

impl<F: LogFile> LogSession<F> {
    /// Write bytes, counting what the medium accepted.
    ///
    /// A short write is reported but not retried. If it stopped inside a
    /// row, a line terminator is appended so the next write starts a fresh
    /// row instead of merging into the torn one.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, LoggerError> {
        if bytes.is_empty() {
            return Ok(0);
        }

        let written = self.file.write(bytes)?;
        self.bytes_written += written as u64;
        if written > 0 {
            self.dirty = true;
        }

        if written < bytes.len() {
            self.short_writes += 1;
            if written > 0 && bytes[written - 1] != b'\n' {
                self.terminate_row();
            }
            return Err(LoggerError::ShortWrite {
                requested: bytes.len(),
                written,
            });
        }
        Ok(written)
    }

    fn terminate_row(&mut self) {
        match self.file.write(b"\n") {
            Ok(accepted) => self.bytes_written += accepted as u64,
            Err(e) => tracing::warn!("could not terminate torn row in {:?}: {e}", self.path),
        }
    }

    /// Whether a forced sync is due at `now_us`.
    pub fn sync_due(&self, now_us: u64, interval_us: u64) -> bool {
        self.dirty && now_us.saturating_sub(self.last_sync_us) >= interval_us
    }

    /// Application flush followed by a device sync.
    pub fn sync(&mut self, now_us: u64) -> Result<(), StorageError> {
        self.file.flush()?;
        self.file.sync_device()?;
        self.dirty = false;
        self.last_sync_us = now_us;
        Ok(())
    }

    /// Close the handle, returning the path for verification.
    pub fn close(self) -> Result<PathBuf, StorageError> {
        let path = self.path;
        self.file.close()?;
        Ok(path)
    }
}

/// Move the staged records into the open file.
///
/// The buffer is emptied even when the write comes up short.
pub fn flush_buffer<F: LogFile>(
    session: &mut LogSession<F>,
    buffer: &mut RecordBuffer,
) -> Result<usize, LoggerError> {
    if buffer.is_empty() {
        return Ok(0);
    }
    session.write_bytes(buffer.take_and_clear())
}

/// Creates sessions on a storage medium and verifies them after close.
#[derive(Debug)]
pub struct StorageWriter<P: StorageProvider> {
    storage: P,
    header: LogHeader,
}

impl<P: StorageProvider> StorageWriter<P> {
    pub fn new(storage: P, header: LogHeader) -> Self {
        Self { storage, header }
    }

    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    pub fn storage(&self) -> &P {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut P {
        &mut self.storage
    }

    /// Create the next log file and write its header.
    pub fn open_session(
        &mut self,
        now_us: u64,
        utc_anchor: Option<DateTime<Utc>>,
    ) -> Result<LogSession<P::File>, LoggerError> {
        let path = next_log_path(&self.storage).ok_or_else(|| LoggerError::OpenFailure {
            path: None,
            reason: format!("all {MAX_LOG_INDEX} log indices are in use"),
        })?;

        let file = self
            .storage
            .open_append_create(&path)
            .map_err(|e| LoggerError::OpenFailure {
                path: Some(path.clone()),
                reason: e.to_string(),
            })?;

        let mut session = LogSession {
            id: Uuid::new_v4(),
            path,
            started_at_us: now_us,
            last_sync_us: now_us,
            dirty: false,
            utc_anchor,
            bytes_written: 0,
            samples: 0,
            short_writes: 0,
            file,
        };

        let header = self.header.render();
        if let Err(e) = session.write_bytes(header.as_bytes()) {
            let path = session.path.clone();
            // The header is part of the format; a torn one makes the file unusable
            if let Err(close_err) = session.close() {
                tracing::warn!("closing {path:?} after torn header failed: {close_err}");
            }
            return Err(LoggerError::OpenFailure {
                path: Some(path),
                reason: format!("header write failed: {e}"),
            });
        }

        Ok(session)
    }

    /// Reopen a closed log read-only and report its size.
    pub fn verify(&self, path: &Path) -> Result<u64, StorageError> {
        self.storage.open_read_len(path)
    }
}
