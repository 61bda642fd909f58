//! In-memory session state mirrored to durable storage.
//!
//! The store is the single owner of the current credential. Every mutation
//! writes through to the [`CredentialVault`] first and then publishes the new
//! value on a watch channel, so observers never see a state that was not
//! persisted.
//!
//! Each explicit `set` or `clear` advances a generation counter. Work that
//! started under one generation (a renewal round, a startup resume) commits
//! through the `*_if_generation` variants and becomes a no-op once the
//! session it belonged to is gone.

use crate::error::AuthResult;
use crate::role::Role;
use credential_store::{CredentialVault, PersistedCredential};
use parking_lot::Mutex;
use std::fmt;
use tokio::sync::watch;
use tracing::debug;

/// Access token and role, always held together.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub role: Role,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("role", &self.role)
            .finish()
    }
}

pub struct SessionStore {
    vault: CredentialVault,
    generation: Mutex<u64>,
    current: watch::Sender<Option<Credential>>,
}

impl SessionStore {
    /// Create a store over `vault`. The in-memory state starts empty until a
    /// session is established or resumed.
    pub fn new(vault: CredentialVault) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            vault,
            generation: Mutex::new(0),
            current,
        }
    }

    pub fn get(&self) -> Option<Credential> {
        self.current.borrow().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.current
            .borrow()
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub fn role(&self) -> Option<Role> {
        self.current.borrow().as_ref().map(|c| c.role.clone())
    }

    /// Entries persisted by a previous run.
    pub fn persisted(&self) -> AuthResult<PersistedCredential> {
        Ok(self.vault.load()?)
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Receive every change of the current credential.
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.current.subscribe()
    }

    /// Establish a new session, superseding any work tied to the previous one.
    pub fn set(&self, access_token: &str, role: Role) -> AuthResult<Credential> {
        let mut generation = self.generation.lock();
        let credential = self.write(access_token, role)?;
        *generation += 1;
        debug!(generation = *generation, role = %credential.role, "Session established");
        Ok(credential)
    }

    /// Replace the credential only if no `set`/`clear` happened since
    /// `expected` was read. Returns `None` when the write was discarded.
    pub fn set_if_generation(
        &self,
        expected: u64,
        access_token: &str,
        role: Role,
    ) -> AuthResult<Option<Credential>> {
        let generation = self.generation.lock();
        if *generation != expected {
            debug!(
                expected,
                current = *generation,
                "Discarding credential from a superseded session"
            );
            return Ok(None);
        }
        self.write(access_token, role).map(Some)
    }

    /// Remove the credential from memory and storage.
    ///
    /// Returns whether a session (in memory or persisted) existed.
    pub fn clear(&self) -> AuthResult<bool> {
        let mut generation = self.generation.lock();
        let existed = self.erase()?;
        *generation += 1;
        Ok(existed)
    }

    /// Clear only if the session read at `expected` is still current.
    pub fn clear_if_generation(&self, expected: u64) -> AuthResult<bool> {
        let mut generation = self.generation.lock();
        if *generation != expected {
            return Ok(false);
        }
        let existed = self.erase()?;
        *generation += 1;
        Ok(existed)
    }

    fn write(&self, access_token: &str, role: Role) -> AuthResult<Credential> {
        self.vault.store(access_token, role.as_str())?;
        let credential = Credential {
            access_token: access_token.to_string(),
            role,
        };
        self.current.send_replace(Some(credential.clone()));
        Ok(credential)
    }

    fn erase(&self) -> AuthResult<bool> {
        let persisted = self.vault.clear()?;
        let in_memory = self.current.send_if_modified(|current| current.take().is_some());
        Ok(persisted || in_memory)
    }
}
