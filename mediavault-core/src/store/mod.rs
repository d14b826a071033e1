//! Secret storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`SecretStore`] - Trait for namespace-scoped, one-secret-per-user backends
//! - [`MemorySecretStore`] - In-memory implementation for testing
//! - [`KeyringSecretStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`PreferenceSecretStore`] - Degraded-mode store over the shared preferences
//! - [`create_secret_store`] - Helper to select a backend
//!
//! # Storage Key Convention
//!
//! Inside a namespace, the secret of a user is stored under `token:{user_id}`.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediavault_core::store::{MemorySecretStore, Secret, SecretStore};
//! use mediavault_core::UserId;
//!
//! let store = MemorySecretStore::new("mediavault");
//! let user = UserId::new("u1");
//!
//! store.save(&Secret::new("bearer-token"), &user).await.unwrap();
//! let retrieved = store.get(&user).await.unwrap();
//! assert_eq!(retrieved.unwrap().expose(), "bearer-token");
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::model::UserId;

mod memory;
mod preference;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use memory::{MemoryKeychain, MemorySecretStore};
pub use preference::PreferenceSecretStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringSecretStore;

/// Key prefix for secrets, both in a secure namespace and in the legacy
/// preference layout.
pub const SECRET_KEY_PREFIX: &str = "token:";

/// Default secure namespace.
pub const DEFAULT_NAMESPACE: &str = "mediavault";

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is wiped when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type shared by the secret and preference stores.
///
/// Variants carry storage keys and backend messages, never secret values.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An empty secret was passed to a write.
    #[error("refusing to store an empty secret")]
    EmptySecret,

    /// A value could not be serialized.
    #[error("failed to encode {key}: {message}")]
    EncodingFailed { key: String, message: String },

    /// A stored value could not be deserialized.
    #[error("failed to decode {key}: {message}")]
    DecodingFailed { key: String, message: String },

    /// The backend rejected a write.
    #[error("storage write failed for {key}: {message}")]
    WriteFailed { key: String, message: String },

    /// The backend could not be read.
    #[error("storage read failed for {key}: {message}")]
    ReadFailed { key: String, message: String },

    /// The backend rejected a delete.
    #[error("storage delete failed for {key}: {message}")]
    DeleteFailed { key: String, message: String },

    /// No user record exists for the id.
    #[error("user not found: {id}")]
    UserNotFound { id: String },

    /// No secret exists for the id.
    #[error("no secret stored for user {id}")]
    SecretNotFound { id: String },

    /// The storage backend is not available on this system.
    #[error("secret store unavailable: {message}")]
    Unavailable { message: String },
}

/// Namespace-scoped storage holding at most one secret per user.
///
/// Implementations include:
/// - [`MemorySecretStore`] - In-memory storage for testing
/// - [`KeyringSecretStore`] (with `keyring-store` feature) - OS keyring
/// - [`PreferenceSecretStore`] - Degraded mode over the shared preferences
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// The namespace this store is scoped to.
    fn namespace(&self) -> &str;

    /// Store the secret for `user_id`, replacing any previous value.
    ///
    /// Returns [`StoreError::EmptySecret`] for an empty secret.
    async fn save(&self, secret: &Secret, user_id: &UserId) -> Result<(), StoreError>;

    /// Retrieve the secret for `user_id`.
    ///
    /// Returns `Ok(None)` if no secret is stored.
    async fn get(&self, user_id: &UserId) -> Result<Option<Secret>, StoreError>;

    /// Delete the secret for `user_id`.
    ///
    /// Returns `Ok(())` even if no secret was stored.
    async fn remove(&self, user_id: &UserId) -> Result<(), StoreError>;

    /// Delete every secret in this store's namespace.
    async fn remove_all(&self) -> Result<(), StoreError>;

    /// Check if a secret exists without keeping the value around.
    async fn exists(&self, user_id: &UserId) -> Result<bool, StoreError> {
        Ok(self.get(user_id).await?.is_some())
    }
}

/// Storage key for the secret of `user_id`: `token:{user_id}`.
pub fn secret_key(user_id: &UserId) -> String {
    format!("{}{}", SECRET_KEY_PREFIX, user_id)
}

pub(crate) fn ensure_not_empty(secret: &Secret) -> Result<(), StoreError> {
    if secret.is_empty() {
        return Err(StoreError::EmptySecret);
    }
    Ok(())
}

/// Create the persistent secure secret store for `namespace`.
///
/// # Backend Selection Logic
///
/// - If `prefer_keyring` is `true` and the `keyring-store` feature is enabled,
///   a [`KeyringSecretStore`] is returned, or [`StoreError::Unavailable`] if
///   the platform keyring cannot store and return a secret.
/// - Otherwise the secure store is [`StoreError::Unavailable`].
///
/// There is no in-memory fallback: the result feeds the secret migration,
/// which deletes legacy secrets once they are confirmed in the returned
/// store. An unavailable store makes
/// [`open_repository`](crate::selection::open_repository) keep secrets in
/// the shared preferences instead.
pub fn create_secret_store(
    namespace: &str,
    prefer_keyring: bool,
) -> Result<std::sync::Arc<dyn SecretStore>, StoreError> {
    if !prefer_keyring {
        return Err(StoreError::Unavailable {
            message: "secure storage disabled by configuration".to_string(),
        });
    }

    keyring_store(namespace)
}

#[cfg(feature = "keyring-store")]
fn keyring_store(namespace: &str) -> Result<std::sync::Arc<dyn SecretStore>, StoreError> {
    let store = KeyringSecretStore::try_new(namespace)?;
    tracing::info!(namespace, "Using OS keyring for secret storage");
    Ok(std::sync::Arc::new(store))
}

#[cfg(not(feature = "keyring-store"))]
fn keyring_store(_namespace: &str) -> Result<std::sync::Arc<dyn SecretStore>, StoreError> {
    Err(StoreError::Unavailable {
        message: "keyring storage requested but keyring-store feature not enabled".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::new("super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_display_redacted() {
        let secret = Secret::new("super-secret");
        let display = format!("{}", secret);
        assert!(!display.contains("super-secret"));
        assert!(display.contains("REDACTED"));
    }

    #[test]
    fn test_secret_serializes_as_plain_string() {
        let json = serde_json::to_string(&Secret::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }

    #[test]
    fn test_secret_key() {
        assert_eq!(secret_key(&UserId::new("u1")), "token:u1");
    }

    #[test]
    fn test_store_error_never_contains_secret() {
        let err = StoreError::WriteFailed {
            key: secret_key(&UserId::new("u1")),
            message: "backend offline".to_string(),
        };
        assert_eq!(err.to_string(), "storage write failed for token:u1: backend offline");
    }

    #[test]
    fn test_keyring_disabled_is_unavailable() {
        let result = create_secret_store("mediavault-test", false);
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_create_store_prefer_keyring_persists() {
        // A keyring that is missing or cannot hold a secret is reported as
        // unavailable; a returned store must give back what it saved.
        let store = match create_secret_store("mediavault-test-prefer", true) {
            Ok(store) => store,
            Err(StoreError::Unavailable { .. }) => return,
            Err(e) => panic!("unexpected error: {}", e),
        };

        let user = UserId::new("create-store-check");
        store.save(&Secret::new("test"), &user).await.unwrap();
        let retrieved = store.get(&user).await.unwrap();
        store.remove(&user).await.unwrap();

        assert_eq!(retrieved.map(|s| s.expose().to_string()).as_deref(), Some("test"));
    }
}
