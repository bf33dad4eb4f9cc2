//! External account model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a connected external account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One connected external contact source (e.g. a Google account)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAccount {
    /// Unique identifier
    pub id: AccountId,
    /// Account email, unique across accounts
    pub email: String,
    /// Human-friendly label shown in the UI
    pub display_name: Option<String>,
    /// Whether this account participates in sync passes
    pub sync_enabled: bool,
    /// Last completed sync timestamp (Unix ms)
    pub last_synced_at: Option<i64>,
    /// Next scheduled sync timestamp (Unix ms)
    pub next_sync_at: Option<i64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

impl ExternalAccount {
    /// Create a new account for the given email
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            email: email.into(),
            display_name: None,
            sync_enabled: true,
            last_synced_at: None,
            next_sync_at: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
