//! Filesystem-backed storage.

use crate::storage::{LogFile, StorageError, StorageProvider};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Size of the application-level write buffer, one SD sector.
const FILE_BUFFER_SIZE: usize = 512;

/// Log files in a directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Use `root` as the log directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            StorageError::DeviceUnavailable(format!("cannot use {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a log file on this medium.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl StorageProvider for FsStorage {
    type File = FsLogFile;

    /// A name whose status cannot be read counts as taken, so an unreadable
    /// log is never appended to as if it were new.
    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).try_exists().unwrap_or(true)
    }

    fn open_append_create(&mut self, path: &Path) -> Result<FsLogFile, StorageError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(path))?;
        Ok(FsLogFile {
            writer: BufWriter::with_capacity(FILE_BUFFER_SIZE, file),
        })
    }

    fn open_read_len(&self, path: &Path) -> Result<u64, StorageError> {
        let file = File::open(self.resolve(path)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            _ => StorageError::from(e),
        })?;
        Ok(file.metadata()?.len())
    }
}

/// An open log file on the host filesystem.
#[derive(Debug)]
pub struct FsLogFile {
    writer: BufWriter<File>,
}

impl LogFile for FsLogFile {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, StorageError> {
        loop {
            match self.writer.write(bytes) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                result => return Ok(result?),
            }
        }
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.writer.flush()?;
        Ok(())
    }

    fn sync_device(&mut self) -> Result<(), StorageError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn close(mut self) -> Result<(), StorageError> {
        self.writer.flush()?;
        drop(self.writer);
        Ok(())
    }
}
