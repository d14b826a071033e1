//! The credential repository.
//!
//! [`CredentialRepository`] is the only surface the rest of the application
//! (sign-in flow, settings, the extension process) uses to reach stored
//! credentials. User records go to the [`PreferenceStore`]; secrets go to the
//! injected [`SecretStore`] and nowhere else.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{AuthHeader, UserId, UserRecord};
use crate::prefs::PreferenceStore;
use crate::store::{Secret, SecretStore, StoreError};

/// Which secret store backs a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Secrets live in the secure store.
    Secure,

    /// Secrets live next to the user records in the shared preferences.
    Degraded,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secure => f.write_str("secure"),
            Self::Degraded => f.write_str("degraded"),
        }
    }
}

/// Error type for repository operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A single-store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Some of the store operations of a dual-store call failed. The ones
    /// that succeeded are not rolled back.
    #[error("{} of {attempted} store operations failed: {}", .failures.len(), join(.failures))]
    Incomplete {
        attempted: usize,
        failures: Vec<StoreError>,
    },
}

fn join(failures: &[StoreError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fold the results of independently attempted store operations.
fn settle<const N: usize>(results: [Result<(), StoreError>; N]) -> Result<(), CredentialError> {
    let failures: Vec<StoreError> = results.into_iter().filter_map(Result::err).collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(CredentialError::Incomplete {
            attempted: N,
            failures,
        })
    }
}

/// One "user + secret" API over the preference and secret stores.
///
/// Records are never cached; every call goes to the stores.
#[derive(Clone)]
pub struct CredentialRepository {
    preferences: Arc<PreferenceStore>,
    secrets: Arc<dyn SecretStore>,
    mode: StorageMode,
}

impl CredentialRepository {
    /// Create a repository over the secure secret store.
    pub fn new(preferences: Arc<PreferenceStore>, secrets: Arc<dyn SecretStore>) -> Self {
        Self::with_mode(preferences, secrets, StorageMode::Secure)
    }

    pub(crate) fn with_mode(
        preferences: Arc<PreferenceStore>,
        secrets: Arc<dyn SecretStore>,
        mode: StorageMode,
    ) -> Self {
        Self {
            preferences,
            secrets,
            mode,
        }
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.mode
    }

    /// The shared preference store, for app settings.
    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.preferences
    }

    pub async fn save_user(&self, record: &UserRecord) -> Result<(), CredentialError> {
        self.preferences.save_user(record)?;
        Ok(())
    }

    /// All user records, newest first.
    pub async fn load_users(&self) -> Result<Vec<UserRecord>, CredentialError> {
        Ok(self.preferences.load_users()?)
    }

    pub async fn load_user(&self, id: &UserId) -> Result<Option<UserRecord>, CredentialError> {
        Ok(self.preferences.load_user(id)?)
    }

    /// Apply `change` to the stored record of `id` and save it.
    ///
    /// Used on re-authentication to switch `auth_type` or `server_url`. The
    /// record's id cannot be changed this way.
    pub async fn update_user<F>(&self, id: &UserId, change: F) -> Result<UserRecord, CredentialError>
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut record = self
            .preferences
            .load_user(id)?
            .ok_or_else(|| StoreError::UserNotFound { id: id.to_string() })?;

        change(&mut record);
        record.id = id.clone();

        self.preferences.save_user(&record)?;
        Ok(record)
    }

    /// Remove the record of `id` and its secret.
    ///
    /// Both deletes are attempted even if the first fails; failures are
    /// reported together and nothing is rolled back.
    pub async fn remove_user(&self, id: &UserId) -> Result<(), CredentialError> {
        let record = self.preferences.remove_user(id);
        let secret = self.secrets.remove(id).await;

        if let Err(e) = &record {
            warn!(user_id = %id, "Failed to remove user record: {}", e);
        }
        if let Err(e) = &secret {
            warn!(user_id = %id, "Failed to remove user secret: {}", e);
        }

        settle([record, secret])?;
        info!(user_id = %id, "Removed user");
        Ok(())
    }

    pub async fn save_secret(&self, secret: &Secret, user_id: &UserId) -> Result<(), CredentialError> {
        self.secrets.save(secret, user_id).await?;
        debug!(user_id = %user_id, mode = %self.mode, "Saved secret");
        Ok(())
    }

    /// The secret of `user_id`, or `None` if none is stored.
    pub async fn get_secret(&self, user_id: &UserId) -> Result<Option<Secret>, CredentialError> {
        Ok(self.secrets.get(user_id).await?)
    }

    pub async fn remove_secret(&self, user_id: &UserId) -> Result<(), CredentialError> {
        self.secrets.remove(user_id).await?;
        Ok(())
    }

    /// Build the request header for `user_id` from its record and secret.
    pub async fn authorization(&self, user_id: &UserId) -> Result<AuthHeader, CredentialError> {
        let record = self
            .preferences
            .load_user(user_id)?
            .ok_or_else(|| StoreError::UserNotFound { id: user_id.to_string() })?;
        let secret = self
            .secrets
            .get(user_id)
            .await?
            .ok_or_else(|| StoreError::SecretNotFound { id: user_id.to_string() })?;

        Ok(AuthHeader::new(record.auth_type, &secret))
    }

    /// Clear every user record and every secret.
    ///
    /// Both stores are cleared even if the first fails. App settings,
    /// including migration state, are kept.
    pub async fn remove_all_data(&self) -> Result<(), CredentialError> {
        let records = self.preferences.remove_all_users();
        let secrets = self.secrets.remove_all().await;

        if let Err(e) = &records {
            warn!("Failed to clear user records: {}", e);
        }
        if let Err(e) = &secrets {
            warn!(namespace = self.secrets.namespace(), "Failed to clear secrets: {}", e);
        }

        settle([records, secrets])?;
        info!("Removed all credential data");
        Ok(())
    }
}

impl fmt::Debug for CredentialRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRepository")
            .field("namespace", &self.secrets.namespace())
            .field("mode", &self.mode)
            .finish()
    }
}
