//! OS keyring-backed secret storage implementation.

use async_trait::async_trait;
use keyring::Entry;
use parking_lot::Mutex;
use std::collections::BTreeSet;

use super::{ensure_not_empty, secret_key, Secret, SecretStore, StoreError};
use crate::model::UserId;

/// Account name of the entry that lists the user ids stored in a namespace.
const INDEX_ACCOUNT: &str = "__index__";

/// Account name used to check that the backend keeps what it is given.
const PROBE_ACCOUNT: &str = "__probe__";
const PROBE_VALUE: &str = "mediavault-keyring-probe";

/// OS keyring-backed secret store.
///
/// This store uses the platform's native keyring service:
/// - macOS: Keychain
/// - Linux: Secret Service API (via libsecret)
/// - Windows: Credential Manager
///
/// # Storage Layout
///
/// Every entry uses the namespace as the keyring *service* and `token:{id}`
/// as the keyring *user*, so entries of other applications are never
/// addressed. Platform keyrings cannot enumerate entries, so the store also
/// keeps an index entry listing the ids it has written; [`remove_all`]
/// walks that index. Index updates inside one process serialize through a
/// mutex; an index that cannot be read is left as it is.
///
/// [`remove_all`]: SecretStore::remove_all
///
/// # Example
///
/// ```rust,ignore
/// use mediavault_core::store::{KeyringSecretStore, SecretStore, Secret};
///
/// let store = KeyringSecretStore::try_new("mediavault").unwrap();
/// store.save(&Secret::new("my-token"), &"u1".into()).await.unwrap();
/// ```
pub struct KeyringSecretStore {
    namespace: String,
    index_lock: Mutex<()>,
}

impl KeyringSecretStore {
    /// Try to create a new keyring store.
    ///
    /// Writes a probe entry and reads it back through a second handle.
    /// Returns [`StoreError::Unavailable`] if the backend is missing or does
    /// not return what was written, as with a mock or non-persistent store.
    pub fn try_new(namespace: &str) -> Result<Self, StoreError> {
        let unavailable = |message: String| StoreError::Unavailable { message };

        Entry::new(namespace, PROBE_ACCOUNT)
            .and_then(|entry| entry.set_password(PROBE_VALUE))
            .map_err(|e| unavailable(format!("keyring backend not available: {}", e)))?;

        let reader = Entry::new(namespace, PROBE_ACCOUNT)
            .map_err(|e| unavailable(format!("keyring backend not available: {}", e)))?;
        let read_back = reader.get_password();
        let _ = reader.delete_credential();

        match read_back {
            Ok(value) if value == PROBE_VALUE => Ok(Self {
                namespace: namespace.to_string(),
                index_lock: Mutex::new(()),
            }),
            Ok(_) => Err(unavailable("keyring returned a different value".to_string())),
            Err(e) => Err(unavailable(format!("keyring did not keep a written value: {}", e))),
        }
    }

    fn entry(&self, account: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.namespace, account).map_err(|e| StoreError::Unavailable {
            message: format!("failed to create keyring entry: {}", e),
        })
    }

    fn read_index(&self) -> Result<BTreeSet<String>, StoreError> {
        match self.entry(INDEX_ACCOUNT)?.get_password() {
            Ok(json) => serde_json::from_str(&json).map_err(|e| StoreError::DecodingFailed {
                key: INDEX_ACCOUNT.to_string(),
                message: e.to_string(),
            }),
            Err(keyring::Error::NoEntry) => Ok(BTreeSet::new()),
            Err(e) => Err(StoreError::ReadFailed {
                key: INDEX_ACCOUNT.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn write_index(&self, ids: &BTreeSet<String>) -> Result<(), StoreError> {
        let entry = self.entry(INDEX_ACCOUNT)?;

        if ids.is_empty() {
            return match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(StoreError::DeleteFailed {
                    key: INDEX_ACCOUNT.to_string(),
                    message: e.to_string(),
                }),
            };
        }

        let json = serde_json::to_string(ids).map_err(|e| StoreError::EncodingFailed {
            key: INDEX_ACCOUNT.to_string(),
            message: e.to_string(),
        })?;
        entry
            .set_password(&json)
            .map_err(|e| StoreError::WriteFailed {
                key: INDEX_ACCOUNT.to_string(),
                message: e.to_string(),
            })
    }

    fn delete_entry(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::DeleteFailed {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// The index after adding `id`, or `None` if it already lists `id`.
///
/// An unreadable index is an error so callers never replace it with a
/// partial one.
fn index_with(
    current: Result<BTreeSet<String>, StoreError>,
    id: &str,
) -> Result<Option<BTreeSet<String>>, StoreError> {
    let mut index = current?;
    Ok(index.insert(id.to_string()).then_some(index))
}

impl std::fmt::Debug for KeyringSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringSecretStore")
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[async_trait]
impl SecretStore for KeyringSecretStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn save(&self, secret: &Secret, user_id: &UserId) -> Result<(), StoreError> {
        ensure_not_empty(secret)?;
        let key = secret_key(user_id);

        self.entry(&key)?
            .set_password(secret.expose())
            .map_err(|e| StoreError::WriteFailed {
                key: key.clone(),
                message: e.to_string(),
            })?;

        // Index failures are non-fatal once the secret itself is written.
        let _guard = self.index_lock.lock();
        match index_with(self.read_index(), user_id.as_str()) {
            Ok(Some(index)) => {
                if let Err(e) = self.write_index(&index) {
                    tracing::warn!(namespace = %self.namespace, "Failed to update keyring index: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(namespace = %self.namespace, user_id = %user_id, "Keyring index unreadable, left unchanged: {}", e);
            }
        }

        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Secret>, StoreError> {
        let key = secret_key(user_id);

        match self.entry(&key)?.get_password() {
            Ok(password) => Ok(Some(Secret::new(password))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::Ambiguous(_)) => Err(StoreError::ReadFailed {
                key,
                message: "ambiguous keyring entry".to_string(),
            }),
            Err(keyring::Error::PlatformFailure(e)) => Err(StoreError::ReadFailed {
                key,
                message: format!("platform keyring failure: {}", e),
            }),
            Err(e) => Err(StoreError::ReadFailed {
                key,
                message: e.to_string(),
            }),
        }
    }

    async fn remove(&self, user_id: &UserId) -> Result<(), StoreError> {
        self.delete_entry(&secret_key(user_id))?;

        let _guard = self.index_lock.lock();
        let mut index = self.read_index()?;
        if index.remove(user_id.as_str()) {
            self.write_index(&index)?;
        }
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        let _guard = self.index_lock.lock();
        let index = self.read_index()?;
        let mut remaining = BTreeSet::new();
        let mut first_error = None;

        for id in index {
            if let Err(e) = self.delete_entry(&secret_key(&UserId::new(id.as_str()))) {
                tracing::warn!(namespace = %self.namespace, user_id = %id, "Failed to delete keyring entry: {}", e);
                remaining.insert(id);
                first_error.get_or_insert(e);
            }
        }

        self.write_index(&remaining)?;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
