//! Durable key-value slot for the engine snapshot.
//!
//! Stores deal in serialized text only; decoding and validation live in
//! `taskwatch_core::snapshot`. Implementations are blocking and are driven
//! from `spawn_blocking` by the persistence actor.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;

pub trait SnapshotStore: Send + Sync {
    /// Read the stored snapshot, `None` if nothing was ever written.
    fn read(&self) -> Result<Option<String>, StoreError>;

    /// Replace the stored snapshot.
    fn write(&self, snapshot: &str) -> Result<(), StoreError>;
}

/// JSON file with atomic replace (write temp file, then rename).
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn read(&self) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, snapshot: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, snapshot)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    value: Option<String>,
    writes: u32,
    fail_next: u32,
}

/// In-memory store. Can be told to fail a number of upcoming writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(text: impl Into<String>) -> Self {
        let store = Self::default();
        store.lock().value = Some(text.into());
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `n` writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.lock().fail_next = n;
    }

    pub fn contents(&self) -> Option<String> {
        self.lock().value.clone()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u32 {
        self.lock().writes
    }
}

impl SnapshotStore for MemoryStore {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(self.lock().value.clone())
    }

    fn write(&self, snapshot: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(StoreError::Rejected("injected write failure".to_owned()));
        }
        inner.value = Some(snapshot.to_owned());
        inner.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trip_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("nested/state.json"));
        assert!(store.read().expect("read").is_none());

        store.write("{\"a\":1}").expect("write");
        assert_eq!(store.read().expect("read").as_deref(), Some("{\"a\":1}"));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn memory_store_injected_failures_run_out() {
        let store = MemoryStore::new();
        store.fail_next_writes(2);
        assert!(store.write("x").is_err());
        assert!(store.write("x").is_err());
        store.write("y").expect("third write succeeds");
        assert_eq!(store.contents().as_deref(), Some("y"));
        assert_eq!(store.write_count(), 1);
    }
}
