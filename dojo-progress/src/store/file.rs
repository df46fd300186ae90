//! File-backed durable store
//!
//! All entries live in one JSON object file. Every read goes to disk so a
//! write made by another process is seen by the next read. Writes hold an
//! exclusive lock on a sibling lock file for the whole read-modify-write and
//! replace the data file through a uniquely named temp file and rename, so
//! concurrent writers in any number of processes never lose each other's
//! entries and readers never see a half-written file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

use super::KeyValueStore;
use crate::error::{StorageError, StorageResult};

const STORE_FILE: &str = "progress.json";
const LOCK_FILE: &str = "progress.lock";

type Entries = BTreeMap<String, String>;

#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) the store inside `dir`
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            path: dir.join(STORE_FILE),
            lock_path: dir.join(LOCK_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_load(&self) -> StorageResult<Entries> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        if raw.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn try_save(&self, entries: &Entries) -> StorageResult<()> {
        let body = serde_json::to_string_pretty(entries).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;
        tmp.write_all(body.as_bytes())
            .map_err(|e| StorageError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::io(&self.path, e.error))?;
        Ok(())
    }

    /// Exclusive lock shared with every other handle and process; released
    /// when the returned file is dropped
    fn lock(&self) -> StorageResult<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| StorageError::io(&self.lock_path, e))?;
        file.lock().map_err(|e| StorageError::io(&self.lock_path, e))?;
        Ok(file)
    }

    fn try_update(&self, update: impl FnOnce(&mut Entries) -> bool) -> StorageResult<()> {
        let _lock = self.lock()?;

        let mut entries = self.try_load()?;
        if update(&mut entries) {
            self.try_save(&entries)?;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.try_load() {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                warn!("Failed to read {}: {}", key, e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        let result = self.try_update(|entries| {
            entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        });

        if let Err(e) = result {
            warn!("Failed to write {}: {}", key, e);
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.try_update(|entries| entries.remove(key).is_some()) {
            warn!("Failed to remove {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let tmp = TempDir::new().unwrap();

        let store = FileStore::open(tmp.path()).unwrap();
        store.set("dojo:c:a:status", "solved");
        store.set("dojo:c:a:code", "print(1)");
        store.remove("dojo:c:a:code");
        drop(store);

        let reopened = FileStore::open(tmp.path()).unwrap();
        assert_eq!(reopened.get("dojo:c:a:status"), Some("solved".to_string()));
        assert_eq!(reopened.get("dojo:c:a:code"), None);
    }

    #[test]
    fn test_sees_writes_from_another_handle() {
        let tmp = TempDir::new().unwrap();
        let ours = FileStore::open(tmp.path()).unwrap();
        let theirs = FileStore::open(tmp.path()).unwrap();

        assert_eq!(ours.get("k"), None);
        theirs.set("k", "v");
        assert_eq!(ours.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_concurrent_handles_keep_every_write() {
        let tmp = TempDir::new().unwrap();

        std::thread::scope(|scope| {
            for writer in ["a", "b"] {
                let dir = tmp.path();
                scope.spawn(move || {
                    let store = FileStore::open(dir).unwrap();
                    for i in 0..50 {
                        store.set(&format!("dojo:c:{writer}{i}:status"), "solved");
                    }
                });
            }
        });

        let store = FileStore::open(tmp.path()).unwrap();
        let entries = store.try_load().unwrap();
        assert_eq!(entries.len(), 100);
        assert!(entries.values().all(|value| value == "solved"));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        store.set("k", "v");
        store.remove("k");

        let mut names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![LOCK_FILE.to_string(), STORE_FILE.to_string()]);
    }

    #[test]
    fn test_corrupt_file_degrades_without_overwriting() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();

        assert_eq!(store.get("k"), None);
        store.set("k", "v");
        store.remove("k");

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "{ not json");
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path().join("nested")).unwrap();

        assert_eq!(store.get("k"), None);
        assert!(matches!(store.try_load(), Ok(entries) if entries.is_empty()));
    }
}
