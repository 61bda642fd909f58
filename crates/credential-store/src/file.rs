//! JSON-file storage backend.

use crate::{DurableStorage, StorageError, StorageResult};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Key/value storage persisted as a single JSON object.
///
/// Every mutation rewrites the whole file through a temp file and `rename`, so
/// a crash never leaves a half-written session behind.
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let entries = match fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                StorageError::Encoding(format!(
                    "failed to parse session file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        debug!(path = %path.display(), entries = entries.len(), "Opened session file");

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> R) -> StorageResult<R> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = entries.clone();
        let result = f(&mut next);
        if next != *entries {
            self.write_atomic(&next)?;
            *entries = next;
        }
        Ok(result)
    }

    fn write_atomic(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("session.json");
        let tmp_path = dir.join(format!("{}.tmp.{}", file_name, Uuid::new_v4()));

        let payload = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        let write_result = (|| -> std::io::Result<()> {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(payload.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
            }

            fs::rename(&tmp_path, &self.path)
        })();

        if let Err(err) = write_result {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        path = %tmp_path.display(),
                        error = %cleanup,
                        "Failed to remove temp session file"
                    );
                }
            }
            return Err(err.into());
        }

        Ok(())
    }
}

impl DurableStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        self.mutate(|entries| entries.remove(key).is_some())
    }

    fn apply(&self, writes: &[(&str, &str)], deletes: &[&str]) -> StorageResult<()> {
        self.mutate(|entries| {
            for (key, value) in writes {
                entries.insert(key.to_string(), value.to_string());
            }
            for key in deletes {
                entries.remove(*key);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("access_token", "tok-1").unwrap();
        storage.set("role", "admin").unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get("access_token").unwrap(),
            Some("tok-1".to_string())
        );
        assert_eq!(reopened.get("role").unwrap(), Some("admin".to_string()));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::open(&dir.path().join("absent.json")).unwrap();
        assert_eq!(storage.get("access_token").unwrap(), None);
        assert!(!storage.path().exists());
    }

    #[test]
    fn test_delete_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("role", "viewer").unwrap();
        assert!(storage.delete("role").unwrap());
        assert!(!storage.delete("role").unwrap());

        let reopened = FileStorage::open(&path).unwrap();
        assert!(!reopened.has("role").unwrap());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileStorage::open(&path).unwrap();
        storage
            .apply(&[("access_token", "t"), ("role", "admin")], &[])
            .unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["session.json".to_string()]);
    }

    #[test]
    fn test_corrupt_file_is_an_encoding_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();

        match FileStorage::open(&path) {
            Err(StorageError::Encoding(_)) => {}
            other => panic!("expected encoding error, got {:?}", other.err()),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        FileStorage::open(&path)
            .unwrap()
            .set("access_token", "t")
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
