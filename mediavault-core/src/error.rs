//! Top-level error types for mediavault.

use thiserror::Error;

use crate::migration::MigrationError;
use crate::repository::CredentialError;
use crate::store::StoreError;

/// Top-level error type encompassing all mediavault errors.
#[derive(Debug, Error)]
pub enum MediavaultError {
    /// Error from secret or preference storage operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from repository operations.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Outright secret migration failure.
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),
}
