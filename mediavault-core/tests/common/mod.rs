//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mediavault_core::{
    AuthType, KeyValueStore, MemoryKeyValueStore, MemorySecretStore, PreferenceSecretStore,
    PreferenceStore, Secret, SecretStore, StoreError, UserId, UserRecord,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

/// Create a record whose `created_at` lies `age_minutes` in the past.
pub fn user(id: &str, age_minutes: i64) -> UserRecord {
    let mut record = UserRecord::new(
        UserId::new(id),
        format!("{}@example.com", id),
        Url::parse("https://photos.example.com").unwrap(),
        AuthType::Token,
    );
    record.created_at = Utc::now() - Duration::minutes(age_minutes);
    record
}

pub fn memory_preferences() -> Arc<PreferenceStore> {
    Arc::new(PreferenceStore::new(Arc::new(MemoryKeyValueStore::new())))
}

/// Store a user the way pre-migration releases did: record plus secret in
/// the shared preferences.
pub async fn legacy_user(prefs: &Arc<PreferenceStore>, id: &str, secret: Option<&str>) {
    prefs.save_user(&user(id, 0)).unwrap();
    if let Some(secret) = secret {
        PreferenceSecretStore::new(prefs.clone())
            .save(&Secret::new(secret), &UserId::new(id))
            .await
            .unwrap();
    }
}

/// A secret store whose operations fail for chosen users.
pub struct FlakySecretStore {
    inner: MemorySecretStore,
    failing_saves: Mutex<HashSet<String>>,
    failing_removes: Mutex<HashSet<String>>,
    lossy_reads: Mutex<HashSet<String>>,
    fail_remove_all: bool,
}

impl FlakySecretStore {
    pub fn new() -> Self {
        Self {
            inner: MemorySecretStore::new("mediavault-test"),
            failing_saves: Mutex::new(HashSet::new()),
            failing_removes: Mutex::new(HashSet::new()),
            lossy_reads: Mutex::new(HashSet::new()),
            fail_remove_all: false,
        }
    }

    pub fn failing_remove_all() -> Self {
        Self {
            fail_remove_all: true,
            ..Self::new()
        }
    }

    pub fn fail_saves_for(&self, id: &str) {
        self.failing_saves.lock().insert(id.to_string());
    }

    pub fn heal_saves(&self) {
        self.failing_saves.lock().clear();
    }

    pub fn fail_removes_for(&self, id: &str) {
        self.failing_removes.lock().insert(id.to_string());
    }

    /// Accept writes for `id` but never return them.
    pub fn lose_reads_for(&self, id: &str) {
        self.lossy_reads.lock().insert(id.to_string());
    }
}

#[async_trait]
impl SecretStore for FlakySecretStore {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    async fn save(&self, secret: &Secret, user_id: &UserId) -> Result<(), StoreError> {
        if self.failing_saves.lock().contains(user_id.as_str()) {
            return Err(StoreError::WriteFailed {
                key: format!("token:{}", user_id),
                message: "keychain locked".to_string(),
            });
        }
        self.inner.save(secret, user_id).await
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Secret>, StoreError> {
        if self.lossy_reads.lock().contains(user_id.as_str()) {
            return Ok(None);
        }
        self.inner.get(user_id).await
    }

    async fn remove(&self, user_id: &UserId) -> Result<(), StoreError> {
        if self.failing_removes.lock().contains(user_id.as_str()) {
            return Err(StoreError::DeleteFailed {
                key: format!("token:{}", user_id),
                message: "keychain locked".to_string(),
            });
        }
        self.inner.remove(user_id).await
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        if self.fail_remove_all {
            return Err(StoreError::DeleteFailed {
                key: "token:*".to_string(),
                message: "keychain locked".to_string(),
            });
        }
        self.inner.remove_all().await
    }
}

/// A key/value store whose operations fail for chosen keys or prefixes.
pub struct FlakyKeyValueStore {
    inner: MemoryKeyValueStore,
    failing_reads: Mutex<HashSet<String>>,
    failing_removes: Mutex<HashSet<String>>,
}

impl FlakyKeyValueStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryKeyValueStore::new(),
            failing_reads: Mutex::new(HashSet::new()),
            failing_removes: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_reads_of(&self, key: &str) {
        self.failing_reads.lock().insert(key.to_string());
    }

    pub fn fail_removes_of(&self, key: &str) {
        self.failing_removes.lock().insert(key.to_string());
    }
}

impl KeyValueStore for FlakyKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if self.failing_reads.lock().contains(key) {
            return Err(StoreError::ReadFailed {
                key: key.to_string(),
                message: "shared container unavailable".to_string(),
            });
        }
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        if self.failing_removes.lock().contains(key) {
            return Err(StoreError::DeleteFailed {
                key: key.to_string(),
                message: "shared container read-only".to_string(),
            });
        }
        self.inner.remove(key)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys(prefix)
    }
}
