//! In-memory storage backend.

use crate::{DurableStorage, StorageResult};
use std::collections::HashMap;
use std::sync::Mutex;

/// Process-local storage; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(data.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        Ok(data.remove(key).is_some())
    }

    fn apply(&self, writes: &[(&str, &str)], deletes: &[&str]) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        for (key, value) in writes {
            data.insert(key.to_string(), value.to_string());
        }
        for key in deletes {
            data.remove(*key);
        }
        Ok(())
    }
}
