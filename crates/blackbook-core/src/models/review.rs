//! Review queue model
//!
//! Conflicts the detector cannot merge automatically wait here for a
//! human decision. Items leave `pending` only through an explicit
//! resolve or dismiss.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;
use super::person::PersonId;

/// A unique identifier for a review queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewId(Uuid);

impl ReviewId {
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

impl Default for ReviewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReviewId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What kind of conflict this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    NameConflict,
    DataConflict,
}

impl ReviewType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NameConflict => "name_conflict",
            Self::DataConflict => "data_conflict",
        }
    }
}

impl FromStr for ReviewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name_conflict" => Ok(Self::NameConflict),
            "data_conflict" => Ok(Self::DataConflict),
            other => Err(format!("unknown review type: {other}")),
        }
    }
}

/// Lifecycle state of a review item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl ReviewStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(format!("unknown review status: {other}")),
        }
    }
}

/// A pending (or settled) manual-resolution case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    /// Unique identifier
    pub id: ReviewId,
    /// The person whose field is in conflict
    pub person_id: PersonId,
    /// The account the conflicting data came from
    pub account_id: Option<AccountId>,
    pub review_type: ReviewType,
    /// The conflicting field name
    pub field: String,
    /// The local side's value at detection time
    pub local_value: serde_json::Value,
    /// The external side's value at detection time
    pub external_value: serde_json::Value,
    pub status: ReviewStatus,
    /// The chosen resolution, once resolved
    pub resolution: Option<serde_json::Value>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Resolution/dismissal timestamp (Unix ms)
    pub resolved_at: Option<i64>,
}

/// A conflict the detector wants routed to review, before persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewDraft {
    pub review_type: ReviewType,
    pub field: String,
    pub local_value: serde_json::Value,
    pub external_value: serde_json::Value,
}

impl ReviewItem {
    /// Materialize a detector draft against a person/account pair
    #[must_use]
    pub fn from_draft(draft: ReviewDraft, person_id: PersonId, account_id: Option<AccountId>) -> Self {
        Self {
            id: ReviewId::new(),
            person_id,
            account_id,
            review_type: draft.review_type,
            field: draft.field,
            local_value: draft.local_value,
            external_value: draft.external_value,
            status: ReviewStatus::Pending,
            resolution: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            resolved_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_draft_is_pending() {
        let draft = ReviewDraft {
            review_type: ReviewType::NameConflict,
            field: "display_name".to_string(),
            local_value: serde_json::json!("Robert Smith"),
            external_value: serde_json::json!("Roberta Smith"),
        };
        let item = ReviewItem::from_draft(draft, PersonId::new(), None);
        assert_eq!(item.status, ReviewStatus::Pending);
        assert!(item.resolution.is_none());
        assert!(item.resolved_at.is_none());
    }

    #[test]
    fn test_review_type_roundtrip() {
        for ty in [ReviewType::NameConflict, ReviewType::DataConflict] {
            let parsed: ReviewType = ty.as_str().parse().unwrap();
            assert_eq!(parsed, ty);
        }
    }
}
