//! Typed access to the persisted session entries.

use crate::{DurableStorage, StorageKeys, StorageResult};

/// Raw persisted entries.
///
/// Both halves are optional on disk: an older client may have written a token
/// without a role, and resuming such a session has to resolve the role first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedCredential {
    pub access_token: Option<String>,
    pub role: Option<String>,
}

impl PersistedCredential {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.role.is_none()
    }
}

/// High-level API over the two persisted session entries
pub struct CredentialVault {
    storage: Box<dyn DurableStorage>,
}

impl CredentialVault {
    /// Create a new vault with the given storage backend
    pub fn new(storage: Box<dyn DurableStorage>) -> Self {
        Self { storage }
    }

    /// Read both entries.
    pub fn load(&self) -> StorageResult<PersistedCredential> {
        Ok(PersistedCredential {
            access_token: self.access_token()?,
            role: self.role()?,
        })
    }

    /// Persist token and role as one unit.
    pub fn store(&self, access_token: &str, role: &str) -> StorageResult<()> {
        self.storage.apply(
            &[
                (StorageKeys::ACCESS_TOKEN, access_token),
                (StorageKeys::ROLE, role),
            ],
            &[],
        )
    }

    /// Remove both entries. Returns whether anything was persisted.
    pub fn clear(&self) -> StorageResult<bool> {
        let existed = !self.load()?.is_empty();
        self.storage
            .apply(&[], &[StorageKeys::ACCESS_TOKEN, StorageKeys::ROLE])?;
        Ok(existed)
    }

    pub fn access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS_TOKEN)
    }

    pub fn role(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ROLE)
    }

    pub fn has_session(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::ACCESS_TOKEN)
    }
}
