//! Shared preference storage.
//!
//! User records and small app settings live in a key/value namespace that
//! both the main application and its extension process read. Nothing in
//! this namespace is secret once the secret migration has completed.
//!
//! This module provides:
//! - [`KeyValueStore`] - The injected capability over a shared namespace
//! - [`FileKeyValueStore`] - A JSON document in a shared directory
//! - [`MemoryKeyValueStore`] - In-memory implementation for testing
//! - [`PreferenceStore`] - Typed access to user records, settings and the
//!   legacy secret keys
//!
//! # Storage Key Convention
//!
//! - `user:{id}` - one serialized [`UserRecord`]
//! - `token:{id}` - a legacy secret, read only for migration
//! - anything else - an app setting, e.g. `migration.secrets.v1`

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::model::{user_key, UserId, UserRecord, USER_KEY_PREFIX};
use crate::store::{secret_key, Secret, StoreError, SECRET_KEY_PREFIX};

mod file;
mod memory;

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;

/// Settings key recording that the legacy preference location has been
/// relocated into the shared one.
pub const SHARED_LOCATION_MIGRATION_KEY: &str = "migration.shared-location.v1";

/// A key/value namespace readable across process boundaries.
///
/// Operations are atomic per key and last-write-wins. There is no
/// transaction spanning several keys.
pub trait KeyValueStore: Send + Sync {
    /// Read the value at `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write `value` at `key`, replacing any previous value.
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Delete `key`. Absent keys are not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// List every key starting with `prefix`.
    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Typed view over the shared preference namespace.
pub struct PreferenceStore {
    shared: Arc<dyn KeyValueStore>,
}

impl PreferenceStore {
    /// Wrap a shared namespace without relocating anything.
    pub fn new(shared: Arc<dyn KeyValueStore>) -> Self {
        Self { shared }
    }

    /// Open the shared namespace, first relocating the contents of the
    /// legacy, non-shared location if that has not happened yet.
    ///
    /// A failed relocation is logged and retried on the next open; the store
    /// is usable either way.
    pub fn open(shared: Arc<dyn KeyValueStore>, legacy: Option<Arc<dyn KeyValueStore>>) -> Self {
        let store = Self::new(shared);

        if let Some(legacy) = legacy {
            if let Err(e) = store.relocate_from(legacy.as_ref()) {
                warn!("Failed to relocate legacy preferences, will retry on next start: {}", e);
            }
        }

        store
    }

    /// Copy every key of `legacy` into the shared namespace, then delete the
    /// legacy copies.
    ///
    /// Keys already present in the shared namespace are kept as they are.
    /// Legacy keys are only deleted after every key has been confirmed in
    /// the shared namespace, and every copied key reads back with the value
    /// that was copied. Returns the number of keys copied; a completed
    /// relocation makes further calls return `Ok(0)` without reading
    /// `legacy`.
    pub fn relocate_from(&self, legacy: &dyn KeyValueStore) -> Result<usize, StoreError> {
        if self.setting::<bool>(SHARED_LOCATION_MIGRATION_KEY)?.unwrap_or(false) {
            return Ok(0);
        }

        let keys = legacy.keys("")?;
        let mut copied = BTreeMap::new();

        for key in &keys {
            if self.shared.get(key)?.is_some() {
                continue;
            }
            let Some(value) = legacy.get(key)? else {
                continue;
            };
            self.shared.set(key, value.clone())?;
            copied.insert(key.as_str(), value);
        }

        for key in &keys {
            let stored = self.shared.get(key)?;
            let intact = match (copied.get(key.as_str()), &stored) {
                (Some(expected), Some(stored)) => expected == stored,
                (None, stored) => stored.is_some(),
                (Some(_), None) => false,
            };
            if !intact {
                return Err(StoreError::WriteFailed {
                    key: key.clone(),
                    message: "relocated key missing or altered in shared preferences".to_string(),
                });
            }
        }
        let copied = copied.len();

        self.set_setting(SHARED_LOCATION_MIGRATION_KEY, &true)?;

        for key in &keys {
            if let Err(e) = legacy.remove(key) {
                warn!(key = %key, "Failed to remove relocated legacy key: {}", e);
            }
        }

        info!(copied, total = keys.len(), "Relocated legacy preferences");
        Ok(copied)
    }

    /// Store `record` under `user:{id}`, replacing any previous record.
    pub fn save_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let key = record.key();
        let value = serde_json::to_value(record).map_err(|e| StoreError::EncodingFailed {
            key: key.clone(),
            message: e.to_string(),
        })?;

        self.shared.set(&key, value)?;
        debug!(user_id = %record.id, "Saved user record");
        Ok(())
    }

    /// Load every user record, newest first.
    ///
    /// Records that fail to decode are logged and skipped.
    pub fn load_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let mut users = Vec::new();

        for key in self.shared.keys(USER_KEY_PREFIX)? {
            let Some(value) = self.shared.get(&key)? else {
                continue;
            };
            match serde_json::from_value::<UserRecord>(value) {
                Ok(record) => users.push(record),
                Err(e) => warn!(key = %key, "Skipping corrupt user record: {}", e),
            }
        }

        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    /// Load a single user record.
    pub fn load_user(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError> {
        let key = user_key(id);
        match self.shared.get(&key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::DecodingFailed {
                    key,
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn remove_user(&self, id: &UserId) -> Result<(), StoreError> {
        self.shared.remove(&user_key(id))
    }

    pub fn remove_all_users(&self) -> Result<(), StoreError> {
        for key in self.shared.keys(USER_KEY_PREFIX)? {
            self.shared.remove(&key)?;
        }
        Ok(())
    }

    /// Read the pre-migration secret of `id`, if one is still stored next to
    /// the user records.
    pub fn legacy_secret(&self, id: &UserId) -> Result<Option<Secret>, StoreError> {
        let key = secret_key(id);
        match self.shared.get(&key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::DecodingFailed {
                    key,
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Ids of every legacy secret key, whether or not a user record exists.
    pub fn legacy_secret_ids(&self) -> Result<Vec<UserId>, StoreError> {
        Ok(self
            .shared
            .keys(SECRET_KEY_PREFIX)?
            .into_iter()
            .filter_map(|key| key.strip_prefix(SECRET_KEY_PREFIX).map(UserId::from))
            .collect())
    }

    pub fn remove_legacy_secret(&self, id: &UserId) -> Result<(), StoreError> {
        self.shared.remove(&secret_key(id))
    }

    /// Only the degraded-mode [`PreferenceSecretStore`] writes here.
    ///
    /// [`PreferenceSecretStore`]: crate::store::PreferenceSecretStore
    pub(crate) fn write_legacy_secret(&self, secret: &Secret, id: &UserId) -> Result<(), StoreError> {
        self.shared
            .set(&secret_key(id), Value::String(secret.expose().to_string()))
    }

    /// Read a typed app setting.
    pub fn setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.shared.get(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::DecodingFailed {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Write a typed app setting.
    pub fn set_setting<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|e| StoreError::EncodingFailed {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.shared.set(key, value)
    }

    pub fn remove_setting(&self, key: &str) -> Result<(), StoreError> {
        self.shared.remove(key)
    }
}

impl std::fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceStore").finish_non_exhaustive()
    }
}
