//! Durable credential storage for keeper.
//!
//! This crate provides:
//! - the [`DurableStorage`] key/value trait
//! - [`MemoryStorage`] for tests and ephemeral sessions
//! - [`FileStorage`], a JSON file committed with temp-file + rename
//! - [`CredentialVault`], typed access to the persisted token and role

mod file;
mod keys;
mod memory;
mod traits;
mod vault;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::DurableStorage;
pub use vault::{CredentialVault, PersistedCredential};

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a vault persisted to the given JSON file.
pub fn create_file_vault(path: &Path) -> StorageResult<CredentialVault> {
    let storage = FileStorage::open(path)?;
    Ok(CredentialVault::new(Box::new(storage)))
}
