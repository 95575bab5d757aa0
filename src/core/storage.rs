//! Durable keyed blobs for the conversation snapshot.
//!
//! The store writes whole snapshots, so the backend only needs to read,
//! replace, and remove a blob under a fixed key.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;

/// Storage key for the persisted conversation.
pub const HISTORY_STORAGE_KEY: &str = "history_v1";

pub trait SnapshotStorage: Send {
    fn read(&self, key: &str) -> io::Result<Option<String>>;
    fn write(&mut self, key: &str, blob: &str) -> io::Result<()>;
    fn remove(&mut self, key: &str) -> io::Result<()>;

    /// Same replacement as [`write`](Self::write) but without flushing to
    /// stable storage. A later `write` makes the blob durable.
    fn write_unsynced(&mut self, key: &str, blob: &str) -> io::Result<()> {
        self.write(key, blob)
    }
}

/// Stores each key as `<dir>/<key>.json`.
pub struct FileSnapshotStorage {
    dir: PathBuf,
}

impl FileSnapshotStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn replace_file(&self, key: &str, blob: &str, sync: bool) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(blob.as_bytes())?;
        if sync {
            temp_file.as_file_mut().sync_all()?;
        }
        temp_file
            .persist(self.path_for(key))
            .map_err(|err| err.error)?;
        Ok(())
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SnapshotStorage for FileSnapshotStorage {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&mut self, key: &str, blob: &str) -> io::Result<()> {
        self.replace_file(key, blob, true)
    }

    fn write_unsynced(&mut self, key: &str, blob: &str) -> io::Result<()> {
        self.replace_file(key, blob, false)
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// In-memory backend. Clones share the same underlying map, which lets a test
/// keep a handle to inspect what the store wrote.
#[derive(Clone, Default)]
pub struct MemorySnapshotStorage {
    blobs: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<Mutex<usize>>,
    unsynced_writes: Arc<Mutex<usize>>,
}

impl MemorySnapshotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(key: &str, blob: impl Into<String>) -> Self {
        let storage = Self::default();
        storage
            .blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), blob.into());
        storage
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    /// Number of successful `write` calls so far.
    pub fn write_count(&self) -> usize {
        *self
            .writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn unsynced_write_count(&self) -> usize {
        *self
            .unsynced_writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, key: &str, blob: &str) {
        self.blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), blob.to_string());
    }
}

impl SnapshotStorage for MemorySnapshotStorage {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.get(key))
    }

    fn write(&mut self, key: &str, blob: &str) -> io::Result<()> {
        self.insert(key, blob);
        *self
            .writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }

    fn write_unsynced(&mut self, key: &str, blob: &str) -> io::Result<()> {
        self.insert(key, blob);
        *self
            .unsynced_writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        self.blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
        Ok(())
    }
}
