//! Degraded-mode secret storage over the shared preferences.

use async_trait::async_trait;
use std::sync::Arc;

use super::{ensure_not_empty, Secret, SecretStore, StoreError};
use crate::model::UserId;
use crate::prefs::PreferenceStore;

/// Secret store that keeps secrets next to the user records, under the
/// legacy `token:{id}` keys of the shared preference namespace.
///
/// This is only ever selected when the secure store cannot be used (see
/// [`open_repository`](crate::selection::open_repository)). Secrets written
/// here are readable by every process sharing the preferences.
#[derive(Debug, Clone)]
pub struct PreferenceSecretStore {
    preferences: Arc<PreferenceStore>,
}

impl PreferenceSecretStore {
    pub fn new(preferences: Arc<PreferenceStore>) -> Self {
        Self { preferences }
    }
}

#[async_trait]
impl SecretStore for PreferenceSecretStore {
    fn namespace(&self) -> &str {
        "preferences"
    }

    async fn save(&self, secret: &Secret, user_id: &UserId) -> Result<(), StoreError> {
        ensure_not_empty(secret)?;
        self.preferences.write_legacy_secret(secret, user_id)
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Secret>, StoreError> {
        self.preferences.legacy_secret(user_id)
    }

    async fn remove(&self, user_id: &UserId) -> Result<(), StoreError> {
        self.preferences.remove_legacy_secret(user_id)
    }

    async fn remove_all(&self) -> Result<(), StoreError> {
        for user_id in self.preferences.legacy_secret_ids()? {
            self.preferences.remove_legacy_secret(&user_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryKeyValueStore;

    fn store() -> (PreferenceSecretStore, Arc<PreferenceStore>) {
        let prefs = Arc::new(PreferenceStore::new(Arc::new(MemoryKeyValueStore::new())));
        (PreferenceSecretStore::new(prefs.clone()), prefs)
    }

    #[tokio::test]
    async fn test_secrets_land_in_legacy_keys() {
        let (store, prefs) = store();
        let user = UserId::new("u1");

        store.save(&Secret::new("abc"), &user).await.unwrap();

        assert_eq!(prefs.legacy_secret(&user).unwrap().unwrap().expose(), "abc");
        assert_eq!(store.get(&user).await.unwrap().unwrap().expose(), "abc");
    }

    #[tokio::test]
    async fn test_remove_all_keeps_settings() {
        let (store, prefs) = store();
        prefs.set_setting("app.theme", &"dark").unwrap();
        store.save(&Secret::new("a"), &UserId::new("u1")).await.unwrap();
        store.save(&Secret::new("b"), &UserId::new("u2")).await.unwrap();

        store.remove_all().await.unwrap();

        assert!(prefs.legacy_secret_ids().unwrap().is_empty());
        assert_eq!(prefs.setting::<String>("app.theme").unwrap().as_deref(), Some("dark"));
    }
}
