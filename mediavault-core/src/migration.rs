//! One-time relocation of secrets out of the shared preferences.
//!
//! Earlier releases stored each account's secret next to its user record,
//! under `token:{id}` in the shared preference namespace. The
//! [`MigrationCoordinator`] copies those secrets into the secure
//! [`SecretStore`], reads every copy back, and only deletes legacy keys whose
//! copy was confirmed. Once everything is confirmed it records
//! [`SECRET_MIGRATION_KEY`] and never runs again.
//!
//! Running the coordinator concurrently or repeatedly is safe: a user whose
//! secret store entry already exists is never overwritten with the legacy
//! value, deletes are idempotent, and a user whose legacy key is already
//! gone is simply skipped.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::UserId;
use crate::prefs::PreferenceStore;
use crate::store::{Secret, SecretStore, StoreError};

/// Settings key of the migration flag.
pub const SECRET_MIGRATION_KEY: &str = "migration.secrets.v1";

/// Outright migration failure. Per-user failures are reported in
/// [`MigrationReport::failures`] instead.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to read migration state: {0}")]
    State(#[source] StoreError),

    #[error("failed to load user records: {0}")]
    Users(#[source] StoreError),

    #[error("failed to list legacy secrets: {0}")]
    LegacyKeys(#[source] StoreError),

    #[error("failed to record migration completion: {0}")]
    MarkComplete(#[source] StoreError),
}

/// How a migration run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The flag was already set; nothing was touched.
    AlreadyComplete,

    /// Every legacy secret was confirmed, legacy keys were purged and the
    /// flag was set.
    Completed,

    /// Some secrets could not be moved or confirmed. The flag is unset so
    /// the next run retries.
    Incomplete,
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyComplete => f.write_str("already complete"),
            Self::Completed => f.write_str("completed"),
            Self::Incomplete => f.write_str("incomplete"),
        }
    }
}

/// A per-user failure during migration.
#[derive(Debug)]
pub struct UserFailure {
    pub user_id: UserId,
    pub error: StoreError,
}

/// Result of one migration run.
#[derive(Debug)]
pub struct MigrationReport {
    pub outcome: MigrationOutcome,

    /// Users whose legacy secret was written to the secret store this run.
    pub migrated: Vec<UserId>,

    /// Users whose secret read back from the secret store with the legacy
    /// value.
    pub verified: Vec<UserId>,

    /// Users the secret store already held a secret for. Their legacy value
    /// was not written, and their legacy key is purged like a verified one.
    pub kept: Vec<UserId>,

    /// Number of legacy secret keys deleted.
    pub purged: usize,

    pub failures: Vec<UserFailure>,
}

impl MigrationReport {
    fn already_complete() -> Self {
        Self {
            outcome: MigrationOutcome::AlreadyComplete,
            migrated: Vec::new(),
            verified: Vec::new(),
            kept: Vec::new(),
            purged: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(
            self.outcome,
            MigrationOutcome::AlreadyComplete | MigrationOutcome::Completed
        )
    }
}

/// Moves legacy secrets from the shared preferences into a secret store.
pub struct MigrationCoordinator {
    preferences: Arc<PreferenceStore>,
    secrets: Arc<dyn SecretStore>,
}

impl MigrationCoordinator {
    pub fn new(preferences: Arc<PreferenceStore>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            preferences,
            secrets,
        }
    }

    /// Whether a previous run completed.
    pub fn is_complete(&self) -> Result<bool, StoreError> {
        Ok(self
            .preferences
            .setting::<bool>(SECRET_MIGRATION_KEY)?
            .unwrap_or(false))
    }

    /// Run the migration.
    ///
    /// Returns `Err` only when the preference store itself cannot be used;
    /// every per-user problem ends up in the report.
    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        if self.is_complete().map_err(MigrationError::State)? {
            debug!("Secret migration already complete");
            return Ok(MigrationReport::already_complete());
        }

        let users = self.preferences.load_users().map_err(MigrationError::Users)?;
        let mut failures = Vec::new();
        let mut pending: Vec<(UserId, Secret)> = Vec::new();

        for user in users {
            match self.preferences.legacy_secret(&user.id) {
                Ok(Some(secret)) => pending.push((user.id, secret)),
                Ok(None) => {}
                Err(error) => {
                    warn!(user_id = %user.id, "Unreadable legacy secret: {}", error);
                    failures.push(UserFailure {
                        user_id: user.id,
                        error,
                    });
                }
            }
        }

        let mut kept = Vec::new();
        let mut written = Vec::new();
        for (user_id, secret) in pending {
            // A secret saved after sign-in is newer than the legacy copy.
            match self.secrets.get(&user_id).await {
                Ok(Some(_)) => {
                    debug!(user_id = %user_id, "Secret store already holds a secret, keeping it");
                    kept.push(user_id);
                    continue;
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(user_id = %user_id, "Failed to check secret store before migrating: {}", error);
                    failures.push(UserFailure { user_id, error });
                    continue;
                }
            }

            match self.secrets.save(&secret, &user_id).await {
                Ok(()) => written.push((user_id, secret)),
                Err(error) => {
                    warn!(user_id = %user_id, "Failed to migrate secret: {}", error);
                    failures.push(UserFailure { user_id, error });
                }
            }
        }

        let verified = self.verify(&written).await;
        let migrated: Vec<UserId> = written.into_iter().map(|(user_id, _)| user_id).collect();

        let migrated_set: BTreeSet<&UserId> = migrated.iter().collect();
        let verified_set: BTreeSet<&UserId> = verified.iter().collect();
        let mismatch = migrated_set != verified_set;

        let mut report = MigrationReport {
            outcome: MigrationOutcome::Incomplete,
            migrated,
            verified,
            kept,
            purged: 0,
            failures,
        };

        if mismatch {
            warn!(
                migrated = report.migrated.len(),
                verified = report.verified.len(),
                "Secret verification mismatch, keeping legacy secrets"
            );
            return Ok(report);
        }

        if report.failures.is_empty() {
            let legacy = self
                .preferences
                .legacy_secret_ids()
                .map_err(MigrationError::LegacyKeys)?;
            report.purged = self.purge(&legacy, &mut report.failures);

            if report.failures.is_empty() {
                self.preferences
                    .set_setting(SECRET_MIGRATION_KEY, &true)
                    .map_err(MigrationError::MarkComplete)?;
                report.outcome = MigrationOutcome::Completed;
            }
        } else {
            let confirmed: Vec<UserId> = report
                .verified
                .iter()
                .chain(&report.kept)
                .cloned()
                .collect();
            report.purged = self.purge(&confirmed, &mut report.failures);
        }

        info!(
            outcome = %report.outcome,
            migrated = report.migrated.len(),
            verified = report.verified.len(),
            kept = report.kept.len(),
            purged = report.purged,
            failures = report.failures.len(),
            "Secret migration finished"
        );
        Ok(report)
    }

    /// Read back every written secret; returns the users whose stored value
    /// matches the legacy one.
    async fn verify(&self, written: &[(UserId, Secret)]) -> Vec<UserId> {
        let mut verified = Vec::new();

        for (user_id, expected) in written {
            match self.secrets.get(user_id).await {
                Ok(Some(stored)) if stored == *expected => verified.push(user_id.clone()),
                Ok(Some(_)) => warn!(user_id = %user_id, "Migrated secret differs from legacy value"),
                Ok(None) => warn!(user_id = %user_id, "Migrated secret missing on read-back"),
                Err(e) => warn!(user_id = %user_id, "Failed to read back migrated secret: {}", e),
            }
        }

        verified
    }

    /// Delete the legacy secret of each id; returns how many were deleted.
    fn purge(&self, ids: &[UserId], failures: &mut Vec<UserFailure>) -> usize {
        let mut purged = 0;

        for user_id in ids {
            match self.preferences.remove_legacy_secret(user_id) {
                Ok(()) => purged += 1,
                Err(error) => {
                    warn!(user_id = %user_id, "Failed to delete legacy secret: {}", error);
                    failures.push(UserFailure {
                        user_id: user_id.clone(),
                        error,
                    });
                }
            }
        }

        purged
    }
}

impl fmt::Debug for MigrationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationCoordinator")
            .field("namespace", &self.secrets.namespace())
            .finish()
    }
}
