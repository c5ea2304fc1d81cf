//! In-memory storage with fault injection.
//!
//! Each file tracks how many of its bytes have been synced. A simulated
//! power loss truncates every file back to its synced length, which is what
//! a real card would retain.

use crate::storage::{LogFile, StorageError, StorageProvider};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryFile {
    data: Vec<u8>,
    durable_len: usize,
    open: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, MemoryFile>,
    fail_open: bool,
    fail_writes: bool,
    max_write: Option<usize>,
    syncs: u64,
}

/// RAM-backed storage. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    // A panicking test thread must not hide the files from the others
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pre-existing, fully synced file.
    pub fn with_file(self, path: impl Into<PathBuf>, contents: &[u8]) -> Self {
        {
            let mut state = lock(&self.state);
            state.files.insert(
                path.into(),
                MemoryFile {
                    data: contents.to_vec(),
                    durable_len: contents.len(),
                    open: false,
                },
            );
        }
        self
    }

    /// Make every subsequent open fail.
    pub fn set_fail_open(&self, fail: bool) {
        lock(&self.state).fail_open = fail;
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Accept at most `limit` bytes per write call.
    pub fn set_max_write(&self, limit: Option<usize>) {
        lock(&self.state).max_write = limit;
    }

    /// Current contents of `path`, synced or not.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        lock(&self.state)
            .files
            .get(path.as_ref())
            .map(|f| f.data.clone())
    }

    /// The part of `path` that would survive a power loss right now.
    pub fn durable_contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        lock(&self.state)
            .files
            .get(path.as_ref())
            .map(|f| f.data[..f.durable_len].to_vec())
    }

    /// Drop every unsynced byte, as an abrupt power cut would.
    pub fn power_loss(&self) {
        let mut state = lock(&self.state);
        for file in state.files.values_mut() {
            file.data.truncate(file.durable_len);
            file.open = false;
        }
    }

    pub fn file_names(&self) -> Vec<PathBuf> {
        lock(&self.state).files.keys().cloned().collect()
    }

    pub fn is_open(&self, path: impl AsRef<Path>) -> bool {
        lock(&self.state)
            .files
            .get(path.as_ref())
            .map(|f| f.open)
            .unwrap_or(false)
    }

    /// Number of device syncs performed across all files.
    pub fn sync_count(&self) -> u64 {
        lock(&self.state).syncs
    }
}

impl StorageProvider for MemoryStorage {
    type File = MemoryLogFile;

    fn exists(&self, path: &Path) -> bool {
        lock(&self.state).files.contains_key(path)
    }

    fn open_append_create(&mut self, path: &Path) -> Result<MemoryLogFile, StorageError> {
        let mut state = lock(&self.state);
        if state.fail_open {
            return Err(StorageError::Io("simulated open failure".to_string()));
        }
        state.files.entry(path.to_path_buf()).or_default().open = true;

        Ok(MemoryLogFile {
            path: path.to_path_buf(),
            state: self.state.clone(),
        })
    }

    fn open_read_len(&self, path: &Path) -> Result<u64, StorageError> {
        lock(&self.state)
            .files
            .get(path)
            .map(|f| f.data.len() as u64)
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))
    }
}

/// An open in-memory log file.
#[derive(Debug)]
pub struct MemoryLogFile {
    path: PathBuf,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLogFile {
    fn with_file<T>(
        &self,
        f: impl FnOnce(&mut MemoryFile, &mut u64) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut state = lock(&self.state);
        let MemoryState { files, syncs, .. } = &mut *state;
        match files.get_mut(&self.path) {
            Some(file) if file.open => f(file, syncs),
            _ => Err(StorageError::Io(format!(
                "{} is not open",
                self.path.display()
            ))),
        }
    }
}

impl LogFile for MemoryLogFile {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, StorageError> {
        let (fail, limit) = {
            let state = lock(&self.state);
            (state.fail_writes, state.max_write)
        };
        if fail {
            return Err(StorageError::Io("simulated write failure".to_string()));
        }

        let n = limit.map_or(bytes.len(), |limit| bytes.len().min(limit));
        self.with_file(|file, _| {
            file.data.extend_from_slice(&bytes[..n]);
            Ok(n)
        })
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.with_file(|_, _| Ok(()))
    }

    fn sync_device(&mut self) -> Result<(), StorageError> {
        self.with_file(|file, syncs| {
            file.durable_len = file.data.len();
            *syncs += 1;
            Ok(())
        })
    }

    fn close(self) -> Result<(), StorageError> {
        self.with_file(|file, _| {
            file.open = false;
            Ok(())
        })
    }
}
