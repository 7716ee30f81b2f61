//! System secret store abstraction
//!
//! The desktop keyring is only reachable from a logged-in session, which is
//! exactly what scheduled jobs lack. Callers treat every failure here as
//! "no secret from this layer".

use crate::credentials::CredentialKey;
use crate::error::{CredpipeError, CredpipeResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Persistent secret storage keyed by `(service, user)`
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret, `None` if there is no entry
    async fn get(&self, key: &CredentialKey) -> CredpipeResult<Option<String>>;

    /// Store or replace a secret
    async fn set(&self, key: &CredentialKey, secret: &str) -> CredpipeResult<()>;

    /// Human-readable backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// OS keychain via the `keyring` crate
///
/// - macOS: Keychain
/// - Linux: kernel keyutils
/// - Windows: Credential Manager
#[derive(Debug, Default)]
pub struct KeyringStore;

impl KeyringStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecretStore for KeyringStore {
    async fn get(&self, key: &CredentialKey) -> CredpipeResult<Option<String>> {
        let service = key.service().to_string();
        let user = key.user().to_string();

        let result = tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &user)?;
            match entry.get_password() {
                Ok(secret) => Ok(Some(secret)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| CredpipeError::SecretStore(format!("keyring task failed: {}", e)))?;

        result.map_err(|e| CredpipeError::SecretStore(e.to_string()))
    }

    async fn set(&self, key: &CredentialKey, secret: &str) -> CredpipeResult<()> {
        let service = key.service().to_string();
        let user = key.user().to_string();
        let secret = secret.to_string();

        let result = tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &user)?;
            entry.set_password(&secret)
        })
        .await
        .map_err(|e| CredpipeError::SecretStore(format!("keyring task failed: {}", e)))?;

        result.map_err(|e| CredpipeError::SecretStore(e.to_string()))?;
        debug!("Stored {} in keyring", key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "keyring"
    }
}

/// In-process store, used when no keyring backend is wanted and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    lookups: AtomicUsize,
    fail: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails, like a keyring without a session
    pub fn unavailable() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Seed an entry
    pub fn with_entry(self, key: &CredentialKey, secret: &str) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), secret.to_string());
        }
        self
    }

    /// Number of `get`/`set` calls made so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check(&self) -> CredpipeResult<()> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CredpipeError::SecretStore(
                "no secret service available".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(&self, key: &CredentialKey) -> CredpipeResult<Option<String>> {
        self.check()?;
        let entries = self
            .entries
            .lock()
            .map_err(|_| CredpipeError::Internal("memory store poisoned".to_string()))?;
        Ok(entries.get(&key.to_string()).cloned())
    }

    async fn set(&self, key: &CredentialKey, secret: &str) -> CredpipeResult<()> {
        self.check()?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CredpipeError::Internal("memory store poisoned".to_string()))?;
        entries.insert(key.to_string(), secret.to_string());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CredentialKey {
        CredentialKey::new("credpipe.1.ssh", "profile_1").unwrap()
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get(&key()).await.unwrap().is_none());

        store.set(&key(), "hunter2").await.unwrap();
        assert_eq!(store.get(&key()).await.unwrap().as_deref(), Some("hunter2"));
        assert_eq!(store.lookups(), 3);
    }

    #[tokio::test]
    async fn unavailable_store_fails() {
        let store = MemoryStore::unavailable();
        let err = store.get(&key()).await.unwrap_err();
        assert!(matches!(err, CredpipeError::SecretStore(_)));
        assert!(store.set(&key(), "x").await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires actual keychain access
    async fn keyring_roundtrip() {
        let store = KeyringStore::new();
        let key = CredentialKey::new("credpipe-test", "test-user").unwrap();

        store.set(&key, "test-secret").await.unwrap();
        let retrieved = store.get(&key).await.unwrap();
        assert_eq!(retrieved.as_deref(), Some("test-secret"));
    }
}
