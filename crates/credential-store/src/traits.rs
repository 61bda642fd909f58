//! Storage trait definitions.

use crate::StorageResult;

/// Trait for durable key/value backends that survive a restart.
pub trait DurableStorage: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value. Returns whether the key existed.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Apply several writes and deletes as one unit.
    ///
    /// The default applies them one by one; backends that can commit a batch
    /// atomically override it.
    fn apply(&self, writes: &[(&str, &str)], deletes: &[&str]) -> StorageResult<()> {
        for (key, value) in writes {
            self.set(key, value)?;
        }
        for key in deletes {
            self.delete(key)?;
        }
        Ok(())
    }
}
