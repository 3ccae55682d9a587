//! File-backed store: one directory per collection, one JSON file per key.
//!
//! Write path: take the per-key mutex, compare the current file contents
//! against the expected value, then write a temp file, fsync it, and
//! rename over the live file. Readers never lock; the atomic rename means
//! a concurrent `get` sees either the old or the new full record, never a
//! torn one. The per-key mutex serializes writers within this process,
//! which is the store's isolation scope.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::KvStore;
use crate::error::StoreError;

pub struct FileStore {
    root: PathBuf,
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl FileStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: DashMap::new(),
        })
    }

    fn key_path(&self, collection: &str, key: &str) -> PathBuf {
        self.root.join(collection).join(format!("{key}.json"))
    }

    fn lock_for(&self, collection: &str, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((collection.to_string(), key.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn read_value(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Full-record durable write: temp file, fsync, rename, fsync dir.
    fn write_durable(path: &Path, value: &[u8]) -> Result<(), StoreError> {
        let dir = path.parent().ok_or_else(|| {
            StoreError::Unavailable(io::Error::other("key path has no parent directory"))
        })?;
        let tmp = path.with_extension("json.tmp");

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(value)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        // Persist the rename itself.
        File::open(dir)?.sync_all()?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Self::read_value(&self.key_path(collection, key))
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StoreError> {
        let lock = self.lock_for(collection, key);
        let _guard = lock.lock().await;

        let path = self.key_path(collection, key);
        let current = Self::read_value(&path)?;
        if current.as_deref() != expected {
            debug!(collection, key, "compare_and_set lost the race");
            return Ok(false);
        }

        fs::create_dir_all(self.root.join(collection))?;
        Self::write_durable(&path, new)?;
        Ok(true)
    }

    async fn snapshot(&self, collection: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let dir = self.root.join(collection);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        // Numeric order for numeric keys (customer ids), lexicographic otherwise.
        keys.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        });

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            // A key deleted between listing and read is simply skipped.
            if let Some(value) = Self::read_value(&dir.join(format!("{key}.json")))? {
                out.push((key, value));
            }
        }
        Ok(out)
    }
}
