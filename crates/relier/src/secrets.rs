//! Secure storage for the session's durable entries.
//!
//! The session persists two named secrets through whatever [`SecretStore`]
//! it is handed. [`MemorySecretStore`] backs tests and short-lived tools;
//! [`KeyringSecretStore`] (behind the `keyring` feature) puts entries in
//! the platform keychain. Absence is not an error at this layer: a missing
//! entry reads as `Ok(None)` and deleting it is a no-op, so a first run
//! and a repeat run take the same code path.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

/// A secret store operation failed. Carries the backend's own description.
#[derive(Debug, thiserror::Error)]
#[error("secret store failure: {0}")]
pub struct SecretStoreError(pub String);

/// Named-secret storage used for session persistence.
///
/// Implementations map a short entry name to an opaque string value.
/// Values may hold serialized credentials, so backends should offer at
/// least the confidentiality of the platform keychain where one exists.
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Read an entry. A missing entry is `Ok(None)`.
    async fn get(&self, name: &str) -> Result<Option<String>, SecretStoreError>;

    /// Write an entry, replacing any previous value.
    async fn set(&self, name: &str, value: &str) -> Result<(), SecretStoreError>;

    /// Remove an entry. Removing a missing entry succeeds.
    async fn delete(&self, name: &str) -> Result<(), SecretStoreError>;
}

/// In-memory store. Entries live as long as the store value itself.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        Ok(self.entries().get(name).cloned())
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), SecretStoreError> {
        self.entries().insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), SecretStoreError> {
        self.entries().remove(name);
        Ok(())
    }
}

/// Platform keychain store built on the `keyring` crate.
///
/// Entries are scoped by the service name given at construction, so two
/// applications (or two configurations of one) do not read each other's
/// sessions.
#[cfg(feature = "keyring")]
#[cfg_attr(docsrs, doc(cfg(feature = "keyring")))]
#[derive(Debug)]
pub struct KeyringSecretStore {
    service: String,
}

#[cfg(feature = "keyring")]
impl KeyringSecretStore {
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry, SecretStoreError> {
        keyring::Entry::new(&self.service, name)
            .map_err(|err| SecretStoreError(err.to_string()))
    }
}

#[cfg(feature = "keyring")]
#[async_trait]
impl SecretStore for KeyringSecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        match self.entry(name)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(SecretStoreError(err.to_string())),
        }
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), SecretStoreError> {
        self.entry(name)?
            .set_password(value)
            .map_err(|err| SecretStoreError(err.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<(), SecretStoreError> {
        match self.entry(name)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(SecretStoreError(err.to_string())),
        }
    }
}
