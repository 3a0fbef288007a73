//! Key/value storage backends for session state.
//!
//! Two scopes exist:
//!
//! - [`MemoryStorage`] lives as long as the process (the "tab"), and is what
//!   session-scoped data is kept in.
//! - [`FileStorage`] is a JSON document on disk that survives restarts.
//!
//! Both are synchronous; every operation is a handful of map lookups plus, for
//! the file backend, one small atomic write.

use crate::error::{StorageError, StorageResult};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A string key/value store.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Read a value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Delete every value.
    fn clear(&self) -> StorageResult<()>;
}

type Entries = BTreeMap<String, String>;

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    // A panic while holding the lock cannot leave a map half-updated.
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory storage, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<Entries>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        lock(&self.entries).clear();
        Ok(())
    }
}

/// Durable storage backed by a single JSON object on disk.
///
/// The document is cached in memory and rewritten on every mutation through a
/// sibling temp file followed by a rename, so a crash never leaves a torn file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<Entries>,
}

impl FileStorage {
    /// Open (or lazily create) the document at `path`.
    ///
    /// A document that exists but does not parse is discarded with a warning
    /// rather than failing: the session layer treats unreadable state as
    /// "logged out".
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let contents = fs::read(&path)?;
            match serde_json::from_slice::<Entries>(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Discarding unreadable session storage file"
                    );
                    Entries::new()
                }
            }
        } else {
            Entries::new()
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened file storage");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &Entries) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `f` to a copy and keep it only once it is on disk, so a failed
    /// write leaves memory matching the file.
    fn mutate(&self, f: impl FnOnce(&mut Entries) -> bool) -> StorageResult<()> {
        let mut entries = lock(&self.entries);
        let mut next = entries.clone();
        if f(&mut next) {
            self.persist(&next)?;
            *entries = next;
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.mutate(|entries| entries.remove(key).is_some())
    }

    fn clear(&self) -> StorageResult<()> {
        self.mutate(|entries| {
            let changed = !entries.is_empty();
            entries.clear();
            changed
        })
    }
}

/// Storage that rejects every write. Used to exercise failure paths.
#[derive(Debug, Default)]
pub struct ReadOnlyStorage;

impl Storage for ReadOnlyStorage {
    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable("storage is read-only".to_string()))
    }

    fn remove(&self, _key: &str) -> StorageResult<()> {
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_storage_basic_ops() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty());

        storage.set("token", "abc").unwrap();
        assert_eq!(storage.get("token").unwrap().as_deref(), Some("abc"));
        assert_eq!(storage.len(), 1);

        storage.remove("token").unwrap();
        assert_eq!(storage.get("token").unwrap(), None);

        // removing twice is fine
        storage.remove("token").unwrap();
    }

    #[test]
    fn test_memory_storage_clear() {
        let storage = MemoryStorage::new();
        storage.set("a", "1").unwrap();
        storage.set("b", "2").unwrap();
        storage.clear().unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");

        {
            let storage = FileStorage::open(&path).unwrap();
            storage.set("token", "abc").unwrap();
            storage.set("refreshToken", "xyz").unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("abc"));
        assert_eq!(reopened.get("refreshToken").unwrap().as_deref(), Some("xyz"));
    }

    #[test]
    fn test_file_storage_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("dir").join("session.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("k", "v").unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_storage_discards_corrupt_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");
        fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get("token").unwrap(), None);

        storage.set("token", "fresh").unwrap();
        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_file_storage_discards_non_utf8_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");
        fs::write(&path, [0xff, 0xfe, 0x00, b'{']).unwrap();

        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get("token").unwrap(), None);

        storage.set("token", "fresh").unwrap();
        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_file_storage_failed_write_keeps_memory_and_disk_in_step() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");
        let storage = FileStorage::open(&path).unwrap();
        storage.set("token", "abc").unwrap();
        storage.set("refreshToken", "xyz").unwrap();

        // A directory where the temp file goes makes every write fail.
        let blocker = path.with_extension("json.tmp");
        fs::create_dir(&blocker).unwrap();

        assert!(storage.clear().is_err());
        assert!(storage.set("token", "other").is_err());
        assert_eq!(storage.get("token").unwrap().as_deref(), Some("abc"));
        assert_eq!(storage.get("refreshToken").unwrap().as_deref(), Some("xyz"));

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("abc"));

        fs::remove_dir(&blocker).unwrap();
        storage.clear().unwrap();
        assert_eq!(storage.get("token").unwrap(), None);
        assert_eq!(FileStorage::open(&path).unwrap().get("token").unwrap(), None);
    }

    #[test]
    fn test_file_storage_clear_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("token", "abc").unwrap();
        storage.clear().unwrap();

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("token").unwrap(), None);
    }

    #[test]
    fn test_read_only_storage_rejects_writes() {
        let storage = ReadOnlyStorage;
        assert!(matches!(
            storage.set("token", "abc"),
            Err(StorageError::Unavailable(_))
        ));
    }
}
