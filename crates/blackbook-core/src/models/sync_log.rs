//! Sync log model
//!
//! Every sync-triggered mutation of a person produces exactly one log
//! entry, success or failure. Entries are append-only.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::person::PersonId;

/// Which way the operation moved data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    ExternalToLocal,
    LocalToExternal,
}

impl SyncDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExternalToLocal => "external_to_local",
            Self::LocalToExternal => "local_to_external",
        }
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "external_to_local" => Ok(Self::ExternalToLocal),
            "local_to_external" => Ok(Self::LocalToExternal),
            other => Err(format!("unknown sync direction: {other}")),
        }
    }
}

/// What the operation did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
    Archive,
    Restore,
}

impl SyncAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Archive => "archive",
            Self::Restore => "restore",
        }
    }
}

impl FromStr for SyncAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "archive" => Ok(Self::Archive),
            "restore" => Ok(Self::Restore),
            other => Err(format!("unknown sync action: {other}")),
        }
    }
}

/// How the operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncLogStatus {
    Success,
    Failed,
    PendingReview,
}

impl SyncLogStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::PendingReview => "pending_review",
        }
    }
}

impl FromStr for SyncLogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "pending_review" => Ok(Self::PendingReview),
            other => Err(format!("unknown sync log status: {other}")),
        }
    }
}

/// One immutable record of a sync operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Log row identifier
    pub id: i64,
    /// Person involved; best-effort, the person may be deleted later
    pub person_id: Option<PersonId>,
    /// Account involved; best-effort, the account may be removed later
    pub account_id: Option<AccountId>,
    pub direction: SyncDirection,
    pub action: SyncAction,
    pub status: SyncLogStatus,
    /// Field name to new value, as applied (or attempted)
    pub changed_fields: serde_json::Map<String, serde_json::Value>,
    /// Human-readable error text for failed operations
    pub error: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
}

/// Builder-style payload for appending a new log entry
#[derive(Debug, Clone)]
pub struct NewSyncLogEntry {
    pub person_id: Option<PersonId>,
    pub account_id: Option<AccountId>,
    pub direction: SyncDirection,
    pub action: SyncAction,
    pub status: SyncLogStatus,
    pub changed_fields: serde_json::Map<String, serde_json::Value>,
    pub error: Option<String>,
}

impl NewSyncLogEntry {
    #[must_use]
    pub fn new(direction: SyncDirection, action: SyncAction, status: SyncLogStatus) -> Self {
        Self {
            person_id: None,
            account_id: None,
            direction,
            action,
            status,
            changed_fields: serde_json::Map::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn person(mut self, id: PersonId) -> Self {
        self.person_id = Some(id);
        self
    }

    #[must_use]
    pub fn account(mut self, id: AccountId) -> Self {
        self.account_id = Some(id);
        self
    }

    #[must_use]
    pub fn changed_fields(mut self, fields: serde_json::Map<String, serde_json::Value>) -> Self {
        self.changed_fields = fields;
        self
    }

    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_roundtrip() {
        for direction in [SyncDirection::ExternalToLocal, SyncDirection::LocalToExternal] {
            let parsed: SyncDirection = direction.as_str().parse().unwrap();
            assert_eq!(parsed, direction);
        }
    }

    #[test]
    fn test_action_roundtrip() {
        for action in [
            SyncAction::Create,
            SyncAction::Update,
            SyncAction::Delete,
            SyncAction::Archive,
            SyncAction::Restore,
        ] {
            let parsed: SyncAction = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn test_builder() {
        let person = PersonId::new();
        let entry = NewSyncLogEntry::new(
            SyncDirection::LocalToExternal,
            SyncAction::Create,
            SyncLogStatus::Failed,
        )
        .person(person)
        .error("rate limited");

        assert_eq!(entry.person_id, Some(person));
        assert_eq!(entry.error.as_deref(), Some("rate limited"));
        assert!(entry.account_id.is_none());
    }
}
