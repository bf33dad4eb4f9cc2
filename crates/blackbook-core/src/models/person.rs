//! Person model

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a person, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonId(Uuid);

impl PersonId {
    /// Create a new unique person ID using UUID v7
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

impl Default for PersonId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PersonId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Per-person sync state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Has local changes not yet pushed to any account
    #[default]
    Pending,
    /// Last push to every mapped account succeeded
    Synced,
    /// Last sync attempt failed (see sync log for the error)
    Error,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// A labeled email address ("work", "home", "other", ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub label: String,
    pub address: String,
}

impl EmailAddress {
    #[must_use]
    pub fn new(label: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            address: address.into(),
        }
    }
}

/// A person in the black book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Unique identifier
    pub id: PersonId,
    /// Full display name
    pub display_name: String,
    /// Job title
    pub title: Option<String>,
    /// Phone numbers (normalized, deduplicated)
    pub phones: Vec<String>,
    /// Birthday as `YYYY-MM-DD`
    pub birthday: Option<String>,
    /// Free-text notes
    pub notes: String,
    /// City / location
    pub location: Option<String>,
    /// Labeled email addresses
    pub emails: Vec<EmailAddress>,
    /// Mapping from external account ID to that account's contact resource ID
    pub external_ids: BTreeMap<String, String>,
    /// Whether this record participates in sync passes
    pub sync_enabled: bool,
    /// Current sync state
    pub sync_status: SyncStatus,
    /// Last successful sync timestamp (Unix ms)
    pub last_synced_at: Option<i64>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Person {
    /// Create a new person with the given display name
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: PersonId::new(),
            display_name: display_name.into(),
            title: None,
            phones: Vec::new(),
            birthday: None,
            notes: String::new(),
            location: None,
            emails: Vec::new(),
            external_ids: BTreeMap::new(),
            sync_enabled: true,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The external resource ID this person maps to on the given account, if any
    #[must_use]
    pub fn resource_id_for(&self, account_id: &str) -> Option<&str> {
        self.external_ids.get(account_id).map(String::as_str)
    }

    /// True when this person has a non-empty email matching `address` (case-insensitive)
    #[must_use]
    pub fn has_email(&self, address: &str) -> bool {
        let needle = normalize_email(address);
        self.emails
            .iter()
            .any(|email| normalize_email(&email.address) == needle)
    }
}

/// Normalize an email address for deduplication
#[must_use]
pub fn normalize_email(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Normalize a phone number for deduplication: keep digits and a leading `+`
#[must_use]
pub fn normalize_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (index, ch) in trimmed.chars().enumerate() {
        if ch.is_ascii_digit() || (index == 0 && ch == '+') {
            out.push(ch);
        }
    }
    out
}
