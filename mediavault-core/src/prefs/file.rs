//! File-backed shared preferences.
//!
//! The namespace is a single JSON document in a directory every participating
//! process can read (the main application's data directory, or a directory
//! both the application and its extension are configured with).
//!
//! # Storage Location
//!
//! By default the document is stored at
//! `~/.local/share/mediavault/shared/preferences.json` on Linux,
//! `~/Library/Application Support/com.raibid-labs.mediavault/shared/preferences.json`
//! on macOS and `%APPDATA%\raibid-labs\mediavault\data\shared\preferences.json`
//! on Windows.

use fs4::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::KeyValueStore;
use crate::store::StoreError;

/// On-disk format of the preference document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreferenceDocument {
    /// Version of the document format.
    version: u32,

    entries: BTreeMap<String, Value>,
}

impl Default for PreferenceDocument {
    fn default() -> Self {
        Self {
            version: 1,
            entries: BTreeMap::new(),
        }
    }
}

/// A [`KeyValueStore`] persisted as one JSON document.
///
/// Nothing is cached: every operation re-reads the document, so writes made
/// by another process are visible on the next call. Writes go to a
/// temporary file that is renamed over the document, so readers never see a
/// half-written file.
///
/// # Thread Safety
///
/// Every read-modify-write holds an exclusive advisory lock on a sidecar
/// `.{name}.lock` file, so writers in other processes (or other handles in
/// this one) never drop each other's keys. Within a handle, writers also
/// serialize through a mutex.
pub struct FileKeyValueStore {
    path: PathBuf,
    lock_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    /// Get the default path of the shared preference document.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dirs = directories::ProjectDirs::from("com", "raibid-labs", "mediavault").ok_or_else(
            || StoreError::Unavailable {
                message: "data directory not available".to_string(),
            },
        )?;

        Ok(dirs.data_dir().join("shared").join("preferences.json"))
    }

    /// Open the store at the default path.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(Self::default_path()?)
    }

    /// Open the store at `path`.
    ///
    /// Creates parent directories if they don't exist. The document itself
    /// is created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::WriteFailed {
                key: parent.display().to_string(),
                message: e.to_string(),
            })?;
        }

        let lock_path = path.with_file_name(format!(".{}.lock", document_name(&path)));

        Ok(Self {
            path,
            lock_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the path of the preference document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<PreferenceDocument, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PreferenceDocument::default()),
            Err(e) => {
                return Err(StoreError::ReadFailed {
                    key: self.path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        serde_json::from_str(&contents).map_err(|e| StoreError::ReadFailed {
            key: self.path.display().to_string(),
            message: format!("corrupt preference document: {}", e),
        })
    }

    fn write_document(&self, document: &PreferenceDocument, key: &str) -> Result<(), StoreError> {
        let write_failed = |message: String| StoreError::WriteFailed {
            key: key.to_string(),
            message,
        };

        let contents = serde_json::to_string_pretty(document).map_err(|e| StoreError::EncodingFailed {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let tmp = self.path.with_file_name(format!(
            ".{}.{}.tmp",
            document_name(&self.path),
            Uuid::new_v4()
        ));

        fs::write(&tmp, contents).map_err(|e| write_failed(e.to_string()))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_failed(e.to_string()));
        }

        Ok(())
    }

    /// Open the sidecar lock file and take an exclusive lock on it. The lock
    /// is released when the returned handle is dropped.
    fn acquire_lock(&self, key: &str) -> Result<File, StoreError> {
        let lock_failed = |e: std::io::Error| StoreError::WriteFailed {
            key: key.to_string(),
            message: format!("failed to lock {}: {}", self.lock_path.display(), e),
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(lock_failed)?;
        file.lock_exclusive().map_err(lock_failed)?;
        Ok(file)
    }

    /// Read-modify-write the document under the cross-process lock. Skips
    /// the write when `f` reports no change.
    fn update<F>(&self, key: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, Value>) -> bool,
    {
        let _guard = self.write_lock.lock();
        let lock = self.acquire_lock(key)?;

        let result = self.read_document().and_then(|mut document| {
            if f(&mut document.entries) {
                self.write_document(&document, key)
            } else {
                Ok(())
            }
        });

        let _ = fs4::FileExt::unlock(&lock);
        result
    }
}

fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "preferences.json".to_string())
}

impl std::fmt::Debug for FileKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKeyValueStore")
            .field("path", &self.path)
            .finish()
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_document()?.entries.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.update(key, |entries| {
            entries.insert(key.to_string(), value);
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(key, |entries| entries.remove(key).is_some())
            .map_err(|e| match e {
                StoreError::WriteFailed { key, message } => StoreError::DeleteFailed { key, message },
                other => other,
            })
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read_document()?
            .entries
            .into_keys()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_store() -> (FileKeyValueStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shared").join("preferences.json");
        let store = FileKeyValueStore::open(path).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_set_and_get() {
        let (store, _temp) = test_store();

        store.set("user:u1", json!({ "email": "a@example.com" })).unwrap();

        assert_eq!(
            store.get("user:u1").unwrap(),
            Some(json!({ "email": "a@example.com" }))
        );
        assert!(store.get("user:u2").unwrap().is_none());
    }

    #[test]
    fn test_missing_document_reads_empty() {
        let (store, _temp) = test_store();
        assert!(store.keys("").unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_keys_by_prefix() {
        let (store, _temp) = test_store();
        store.set("user:u1", json!(1)).unwrap();
        store.set("user:u2", json!(2)).unwrap();
        store.set("token:u1", json!("t")).unwrap();

        assert_eq!(store.keys("user:").unwrap(), vec!["user:u1", "user:u2"]);
        assert_eq!(store.keys("").unwrap().len(), 3);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (store, _temp) = test_store();
        store.set("user:u1", json!(1)).unwrap();

        store.remove("user:u1").unwrap();
        store.remove("user:u1").unwrap();

        assert!(store.get("user:u1").unwrap().is_none());
    }

    #[test]
    fn test_visible_to_second_handle() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("preferences.json");
        let app = FileKeyValueStore::open(&path).unwrap();
        let extension = FileKeyValueStore::open(&path).unwrap();

        app.set("user:u1", json!("first")).unwrap();
        assert_eq!(extension.get("user:u1").unwrap(), Some(json!("first")));

        extension.set("user:u1", json!("second")).unwrap();
        assert_eq!(app.get("user:u1").unwrap(), Some(json!("second")));
    }

    #[test]
    fn test_no_temporary_files_left_behind() {
        let (store, temp) = test_store();
        store.set("a", json!(1)).unwrap();
        store.set("b", json!(2)).unwrap();

        let mut files: Vec<_> = fs::read_dir(temp.path().join("shared"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec![".preferences.json.lock", "preferences.json"]);
    }

    #[test]
    fn test_concurrent_handles_keep_every_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("preferences.json");

        let writers: Vec<_> = ["app", "extension"]
            .into_iter()
            .map(|process| {
                let store = FileKeyValueStore::open(&path).unwrap();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.set(&format!("user:{}-{}", process, i), json!(i)).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let reader = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(reader.keys("user:app-").unwrap().len(), 100);
        assert_eq!(reader.keys("user:extension-").unwrap().len(), 100);
    }

    #[test]
    fn test_corrupt_document_is_read_error() {
        let (store, _temp) = test_store();
        fs::write(store.path(), "{ not json").unwrap();

        assert!(matches!(store.get("user:u1"), Err(StoreError::ReadFailed { .. })));
        assert!(matches!(
            store.set("user:u1", json!(1)),
            Err(StoreError::ReadFailed { .. })
        ));
    }
}
