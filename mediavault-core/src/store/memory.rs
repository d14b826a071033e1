//! In-memory secret storage implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{ensure_not_empty, secret_key, Secret, SecretStore, StoreError, SECRET_KEY_PREFIX};
use crate::model::UserId;

/// A process-local stand-in for the OS keychain.
///
/// Entries are keyed by `(namespace, key)`, so several [`MemorySecretStore`]s
/// can share one keychain the way applications share the platform keychain.
/// Cloning yields another handle to the same entries.
#[derive(Clone, Default)]
pub struct MemoryKeychain {
    entries: Arc<RwLock<HashMap<(String, String), Secret>>>,
}

impl MemoryKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all namespaces.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for MemoryKeychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeychain")
            .field("entries_count", &self.len())
            .finish()
    }
}

/// In-memory secret store for testing and development.
///
/// This store is not persistent; data is lost when the process exits.
///
/// # Thread Safety
///
/// This implementation uses interior mutability via `RwLock` and is
/// safe to share across threads.
#[derive(Debug, Clone)]
pub struct MemorySecretStore {
    namespace: String,
    keychain: MemoryKeychain,
}

impl MemorySecretStore {
    /// Create a store over a fresh, private keychain.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_keychain(MemoryKeychain::new(), namespace)
    }

    /// Create a store over a keychain shared with other stores.
    pub fn with_keychain(keychain: MemoryKeychain, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            keychain,
        }
    }

    fn entry_key(&self, user_id: &UserId) -> (String, String) {
        (self.namespace.clone(), secret_key(user_id))
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn save(&self, secret: &Secret, user_id: &UserId) -> Result<(), StoreError> {
        ensure_not_empty(secret)?;
        self.keychain
            .entries
            .write()
            .insert(self.entry_key(user_id), secret.clone());
        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Secret>, StoreError> {
        Ok(self.keychain.entries.read().get(&self.entry_key(user_id)).cloned())
    }

    async fn remove(&self, user_id: &UserId) -> Result<(), StoreError> {
        self.keychain.entries.write().remove(&self.entry_key(user_id));
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        self.keychain
            .entries
            .write()
            .retain(|(namespace, key), _| {
                namespace != &self.namespace || !key.starts_with(SECRET_KEY_PREFIX)
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_save_get() {
        let store = MemorySecretStore::new("mediavault");
        let user = UserId::new("u1");

        store.save(&Secret::new("test-value"), &user).await.unwrap();
        let retrieved = store.get(&user).await.unwrap();

        assert_eq!(retrieved.unwrap().expose(), "test-value");
    }

    #[tokio::test]
    async fn test_memory_store_save_replaces() {
        let store = MemorySecretStore::new("mediavault");
        let user = UserId::new("u1");

        store.save(&Secret::new("first"), &user).await.unwrap();
        store.save(&Secret::new("second"), &user).await.unwrap();

        assert_eq!(store.get(&user).await.unwrap().unwrap().expose(), "second");
        assert_eq!(store.keychain.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_rejects_empty_secret() {
        let store = MemorySecretStore::new("mediavault");
        let user = UserId::new("u1");

        let result = store.save(&Secret::new(""), &user).await;
        assert!(matches!(result, Err(StoreError::EmptySecret)));
        assert!(store.get(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_get_nonexistent() {
        let store = MemorySecretStore::new("mediavault");
        let result = store.get(&UserId::new("nobody")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_remove_is_idempotent() {
        let store = MemorySecretStore::new("mediavault");
        let user = UserId::new("u1");

        store.save(&Secret::new("test-value"), &user).await.unwrap();
        store.remove(&user).await.unwrap();
        store.remove(&user).await.unwrap();

        assert!(store.get(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_all_is_namespace_scoped() {
        let keychain = MemoryKeychain::new();
        let app = MemorySecretStore::with_keychain(keychain.clone(), "mediavault");
        let other = MemorySecretStore::with_keychain(keychain.clone(), "other-app");
        let user = UserId::new("u1");

        app.save(&Secret::new("a"), &user).await.unwrap();
        app.save(&Secret::new("b"), &UserId::new("u2")).await.unwrap();
        other.save(&Secret::new("c"), &user).await.unwrap();

        app.remove_all().await.unwrap();

        assert!(app.get(&user).await.unwrap().is_none());
        assert_eq!(other.get(&user).await.unwrap().unwrap().expose(), "c");
        assert_eq!(keychain.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_all_on_empty_namespace() {
        let store = MemorySecretStore::new("mediavault");
        store.remove_all().await.unwrap();
    }
}
