//! Choosing the secret store the application runs on.

use std::sync::Arc;
use tracing::{info, warn};

use crate::migration::MigrationCoordinator;
use crate::prefs::PreferenceStore;
use crate::repository::{CredentialRepository, StorageMode};
use crate::store::{PreferenceSecretStore, SecretStore, StoreError};

/// Build the application's credential repository.
///
/// The secret migration always runs first against `secure`. The repository
/// uses the secure store unless it could not be created or the migration
/// failed outright; in those cases it falls back to keeping secrets in the
/// shared preferences ([`StorageMode::Degraded`]) so the application still
/// has credential storage.
///
/// A migration that merely left some users unmigrated is not a failure: it
/// retries on the next start while the secure store stays active.
pub async fn open_repository(
    preferences: Arc<PreferenceStore>,
    secure: Result<Arc<dyn SecretStore>, StoreError>,
) -> CredentialRepository {
    let secure = match secure {
        Ok(store) => store,
        Err(e) => {
            warn!("Secure secret store unavailable, storing secrets in shared preferences: {}", e);
            return degraded(preferences);
        }
    };

    match MigrationCoordinator::new(preferences.clone(), secure.clone()).run().await {
        Ok(report) => {
            if !report.is_complete() {
                warn!(
                    failures = report.failures.len(),
                    "Secret migration incomplete, will retry on next start"
                );
            }
            info!(namespace = secure.namespace(), "Using secure secret storage");
            CredentialRepository::with_mode(preferences, secure, StorageMode::Secure)
        }
        Err(e) => {
            warn!("Secret migration failed, storing secrets in shared preferences: {}", e);
            degraded(preferences)
        }
    }
}

fn degraded(preferences: Arc<PreferenceStore>) -> CredentialRepository {
    let secrets = Arc::new(PreferenceSecretStore::new(preferences.clone()));
    CredentialRepository::with_mode(preferences, secrets, StorageMode::Degraded)
}
