//! Domain model types for mediavault.
//!
//! This module defines the core types shared by both stores:
//! - [`UserId`] - Stable identifier for one media-server account
//! - [`AuthType`] - How the account authenticates (bearer token or API key)
//! - [`UserRecord`] - Non-secret identity and connection metadata
//! - [`AuthHeader`] - The request header built from a record and its secret

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::store::Secret;

/// Storage key prefix for user records in the shared preference namespace.
pub const USER_KEY_PREFIX: &str = "user:";

/// Identifier for one account on a media server.
///
/// The identifier is assigned by the server at sign-in and never changes for
/// the lifetime of the account.
///
/// # Examples
///
/// ```
/// use mediavault_core::UserId;
///
/// let id = UserId::new("3f1c9a");
/// assert_eq!(id.as_str(), "3f1c9a");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a new user ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the user ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// How an account authenticates against the media server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthType {
    /// Session bearer token obtained from a password login.
    Token,

    /// Long-lived API key created in the server's web UI.
    ApiKey,
}

impl AuthType {
    /// Name of the HTTP header that carries the credential.
    pub fn header_name(self) -> &'static str {
        match self {
            Self::Token => "Authorization",
            Self::ApiKey => "x-api-key",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::ApiKey => "apiKey",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and connection metadata for one account.
///
/// Records hold nothing secret, so they live in the shared preference
/// namespace where the extension process can read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Server-assigned account identifier.
    pub id: UserId,

    /// Email address the account signed in with.
    pub email: String,

    /// Base URL of the media server.
    pub server_url: Url,

    /// How the stored secret is presented to the server.
    pub auth_type: AuthType,

    /// When the account was added. Drives list ordering.
    pub created_at: DateTime<Utc>,

    /// Small avatar image, if one was fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<Vec<u8>>,
}

impl UserRecord {
    /// Create a new record stamped with the current time.
    pub fn new(id: UserId, email: impl Into<String>, server_url: Url, auth_type: AuthType) -> Self {
        Self {
            id,
            email: email.into(),
            server_url,
            auth_type,
            created_at: Utc::now(),
            profile_image: None,
        }
    }

    /// Storage key for this record: `user:{id}`.
    pub fn key(&self) -> String {
        user_key(&self.id)
    }
}

/// Storage key for the record of `id`.
pub fn user_key(id: &UserId) -> String {
    format!("{}{}", USER_KEY_PREFIX, id)
}

/// An HTTP header carrying an account's credential.
///
/// The value is kept as a [`Secret`] so the header can be logged safely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeader {
    pub name: &'static str,
    pub value: Secret,
}

impl AuthHeader {
    /// Build the header for `auth_type` from the stored secret.
    pub fn new(auth_type: AuthType, secret: &Secret) -> Self {
        let value = match auth_type {
            AuthType::Token => Secret::new(format!("Bearer {}", secret.expose())),
            AuthType::ApiKey => secret.clone(),
        };

        Self {
            name: auth_type.header_name(),
            value,
        }
    }
}
