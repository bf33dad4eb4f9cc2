//! Archived person model
//!
//! A full point-in-time snapshot taken immediately before a destructive
//! operation. An entry is live until it is restored or its retention
//! window expires.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;
use super::person::{Person, PersonId};

/// A unique identifier for an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveId(Uuid);

impl ArchiveId {
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

impl Default for ArchiveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ArchiveId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Which side initiated the deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionSource {
    Local,
    External,
}

impl DeletionSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::External => "external",
        }
    }
}

impl FromStr for DeletionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "external" => Ok(Self::External),
            other => Err(format!("unknown deletion source: {other}")),
        }
    }
}

/// A snapshot of a person taken before deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedPerson {
    /// Unique identifier
    pub id: ArchiveId,
    /// The original person's ID (never reused on restore)
    pub person_id: PersonId,
    /// Full field snapshot at time of archival
    pub snapshot: Person,
    /// Which side initiated the deletion
    pub deleted_from: DeletionSource,
    /// The account that reported the deletion, when external
    pub account_id: Option<AccountId>,
    /// External resource ids held at time of archival
    pub external_ids: BTreeMap<String, String>,
    /// Archival timestamp (Unix ms)
    pub archived_at: i64,
    /// Expiry timestamp: `archived_at` + retention window (Unix ms)
    pub expires_at: i64,
    /// Set when restored; an entry restores at most once
    pub restored_at: Option<i64>,
    /// The person created by the restore, if any
    pub restored_person_id: Option<PersonId>,
}

impl ArchivedPerson {
    /// Snapshot the given person with the given retention window
    #[must_use]
    pub fn snapshot(
        person: &Person,
        deleted_from: DeletionSource,
        account_id: Option<AccountId>,
        retention_days: u32,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: ArchiveId::new(),
            person_id: person.id,
            snapshot: person.clone(),
            deleted_from,
            account_id,
            external_ids: person.external_ids.clone(),
            archived_at: now,
            expires_at: now + i64::from(retention_days) * 86_400_000,
            restored_at: None,
            restored_person_id: None,
        }
    }

    /// True when this entry is still restorable at `now`
    #[must_use]
    pub const fn is_live(&self, now: i64) -> bool {
        self.restored_at.is_none() && self.expires_at > now
    }

    /// True when this entry may be purged at `now`: expired and never restored
    #[must_use]
    pub const fn purge_eligible(&self, now: i64) -> bool {
        self.restored_at.is_none() && self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_expiry_window() {
        let person = Person::new("Mira Kovač");
        let archived = ArchivedPerson::snapshot(&person, DeletionSource::Local, None, 90);
        assert_eq!(archived.expires_at - archived.archived_at, 90 * 86_400_000);
        assert_eq!(archived.person_id, person.id);
        assert!(archived.restored_at.is_none());
    }

    #[test]
    fn test_live_until_expiry() {
        let person = Person::new("Mira Kovač");
        let archived = ArchivedPerson::snapshot(&person, DeletionSource::Local, None, 90);
        assert!(archived.is_live(archived.archived_at + 1));
        assert!(!archived.is_live(archived.expires_at));
    }

    #[test]
    fn test_purge_eligibility() {
        let person = Person::new("Mira Kovač");
        let mut archived = ArchivedPerson::snapshot(&person, DeletionSource::External, None, 90);

        // Not eligible while the window is open
        assert!(!archived.purge_eligible(archived.archived_at + 1));
        // Eligible one day past expiry
        assert!(archived.purge_eligible(archived.expires_at + 86_400_000));

        // Never eligible once restored, regardless of expiry
        archived.restored_at = Some(archived.archived_at + 10);
        assert!(!archived.purge_eligible(archived.expires_at + 86_400_000));
    }
}
