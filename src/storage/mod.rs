//! Storage access for the log writer.
//!
//! The writer only needs a handful of operations from the medium, captured by
//! [`StorageProvider`] and [`LogFile`]. [`FsStorage`] backs them with the host
//! filesystem; [`MemoryStorage`] keeps files in RAM and can simulate open
//! failures, short writes and power loss.

pub mod fs;
pub mod inspect;
pub mod memory;
pub mod writer;

pub use fs::{FsLogFile, FsStorage};
pub use inspect::{inspect_log, LogReport};
pub use memory::{MemoryLogFile, MemoryStorage};
pub use writer::{
    flush_buffer, log_file_name, next_log_path, LogHeader, LogSession, StorageWriter,
    LOG_FILE_EXTENSION, MAX_LOG_INDEX,
};

use std::path::{Path, PathBuf};

/// An open, append-only log file.
pub trait LogFile {
    /// Write as much of `bytes` as the medium accepts in one call.
    ///
    /// Returns the number of bytes accepted, which may be less than
    /// `bytes.len()`.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, StorageError>;

    /// Push application-level buffers into the storage layer.
    fn flush(&mut self) -> Result<(), StorageError>;

    /// Force previously flushed bytes onto the physical medium.
    fn sync_device(&mut self) -> Result<(), StorageError>;

    /// Release the handle.
    fn close(self) -> Result<(), StorageError>
    where
        Self: Sized;
}

/// A removable medium holding log files. Paths are relative to its root.
pub trait StorageProvider {
    type File: LogFile;

    fn exists(&self, path: &Path) -> bool;

    /// Open `path` for appending, creating it if needed.
    fn open_append_create(&mut self, path: &Path) -> Result<Self::File, StorageError>;

    /// Open `path` read-only and report its size in bytes.
    fn open_read_len(&self, path: &Path) -> Result<u64, StorageError>;
}

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The medium is missing or could not be initialized
    DeviceUnavailable(String),
    NotFound(PathBuf),
    Io(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::DeviceUnavailable(e) => write!(f, "Storage device unavailable: {e}"),
            StorageError::NotFound(path) => write!(f, "File not found: {}", path.display()),
            StorageError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}
