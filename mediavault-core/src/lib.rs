//! # mediavault Core
//!
//! Credential storage for the mediavault media-server client.
//!
//! This crate provides:
//! - Domain types for user records and their secrets
//! - A namespace-scoped [`SecretStore`] trait with keyring and in-memory backends
//! - A shared [`PreferenceStore`] the extension process can read
//! - [`CredentialRepository`], the one API the application uses for credentials
//! - [`MigrationCoordinator`], which moves legacy secrets out of the preferences
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mediavault_core::{
//!     create_secret_store, open_repository, FileKeyValueStore, PreferenceStore, UserId,
//! };
//!
//! async fn token(user: &UserId) -> Result<Option<String>, mediavault_core::MediavaultError> {
//!     let shared = Arc::new(FileKeyValueStore::open_default()?);
//!     let preferences = Arc::new(PreferenceStore::open(shared, None));
//!     let repository = open_repository(preferences, create_secret_store("mediavault", true)).await;
//!     Ok(repository.get_secret(user).await?.map(|s| s.expose().to_string()))
//! }
//! ```

pub mod error;
pub mod migration;
pub mod model;
pub mod prefs;
pub mod repository;
pub mod selection;
pub mod store;

// Re-export commonly used types at crate root
pub use model::{
    AuthHeader,
    AuthType,
    UserId,
    UserRecord,
};

pub use store::{
    create_secret_store,
    MemoryKeychain,
    MemorySecretStore,
    PreferenceSecretStore,
    Secret,
    SecretStore,
    StoreError,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringSecretStore;

pub use prefs::{
    FileKeyValueStore,
    KeyValueStore,
    MemoryKeyValueStore,
    PreferenceStore,
};

pub use repository::{
    CredentialError,
    CredentialRepository,
    StorageMode,
};

pub use migration::{
    MigrationCoordinator,
    MigrationError,
    MigrationOutcome,
    MigrationReport,
};

pub use selection::open_repository;

pub use error::MediavaultError;
