//! Archive manager
//!
//! Guarantees no destructive operation on a person is unrecoverable
//! within the retention window. The snapshot is durably recorded before
//! the live person may be deleted: archive-then-delete, never the
//! reverse.

use rusqlite::Connection;

use crate::db::{
    ArchiveRepository, PersonRepository, SettingsRepository, SqliteArchiveRepository,
    SqlitePersonRepository, SqliteSettingsRepository, SqliteSyncLogRepository, SyncLogRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    AccountId, ArchiveId, ArchivedPerson, DeletionSource, NewSyncLogEntry, Person, PersonId,
    SyncAction, SyncDirection, SyncLogStatus, SyncStatus,
};

/// Archive operations over one borrowed connection
pub struct ArchiveManager<'a> {
    conn: &'a Connection,
}

impl<'a> ArchiveManager<'a> {
    #[must_use]
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Snapshot the person ahead of a deletion.
    ///
    /// The returned entry is committed when this returns; only then may
    /// the caller delete the live person or push the delete remotely.
    pub fn archive(
        &self,
        person: &Person,
        deleted_from: DeletionSource,
        account_id: Option<AccountId>,
    ) -> Result<ArchivedPerson> {
        let settings = SqliteSettingsRepository::new(self.conn).load()?;
        let archived =
            ArchivedPerson::snapshot(person, deleted_from, account_id, settings.retention_days);

        let direction = match deleted_from {
            DeletionSource::Local => SyncDirection::LocalToExternal,
            DeletionSource::External => SyncDirection::ExternalToLocal,
        };
        let mut entry =
            NewSyncLogEntry::new(direction, SyncAction::Archive, SyncLogStatus::Success)
                .person(person.id);
        if let Some(account_id) = account_id {
            entry = entry.account(account_id);
        }
        SqliteSyncLogRepository::new(self.conn).append(&entry)?;
        SqliteArchiveRepository::new(self.conn).create(&archived)?;

        tracing::info!(
            "Archived person {} ({}), restorable until {}",
            person.id,
            person.display_name,
            archived.expires_at
        );
        Ok(archived)
    }

    /// Archive the person, then delete the live record
    pub fn archive_then_delete(
        &self,
        person: &Person,
        deleted_from: DeletionSource,
        account_id: Option<AccountId>,
    ) -> Result<ArchivedPerson> {
        let archived = self.archive(person, deleted_from, account_id)?;

        let direction = match deleted_from {
            DeletionSource::Local => SyncDirection::LocalToExternal,
            DeletionSource::External => SyncDirection::ExternalToLocal,
        };
        let mut entry = NewSyncLogEntry::new(direction, SyncAction::Delete, SyncLogStatus::Success)
            .person(person.id);
        if let Some(account_id) = account_id {
            entry = entry.account(account_id);
        }
        SqliteSyncLogRepository::new(self.conn).append(&entry)?;
        SqlitePersonRepository::new(self.conn).delete(&person.id)?;

        Ok(archived)
    }

    /// Restore an archived person as a new record.
    ///
    /// Fails with [`Error::AlreadyRestored`] on a second attempt. The new
    /// person gets a fresh ID and no external mappings, and is scheduled
    /// for export on the next pass.
    pub fn restore(&self, id: &ArchiveId) -> Result<Person> {
        let archive_repo = SqliteArchiveRepository::new(self.conn);
        let archived = archive_repo
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if archived.restored_at.is_some() {
            return Err(Error::AlreadyRestored(id.to_string()));
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut person = archived.snapshot.clone();
        person.id = PersonId::new();
        person.external_ids.clear();
        person.sync_status = SyncStatus::Pending;
        person.last_synced_at = None;
        person.created_at = now;
        person.updated_at = now;

        // Claim the entry first so a second restore can never race past
        archive_repo.mark_restored(id, now, &person.id)?;

        SqliteSyncLogRepository::new(self.conn).append(
            &NewSyncLogEntry::new(
                SyncDirection::LocalToExternal,
                SyncAction::Restore,
                SyncLogStatus::Success,
            )
            .person(person.id),
        )?;
        SqlitePersonRepository::new(self.conn).create(&person)?;

        tracing::info!(
            "Restored archive {} as new person {}",
            id,
            person.id
        );
        Ok(person)
    }

    /// Remove expired, unrestored entries. Returns how many were purged.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let purged = SqliteArchiveRepository::new(self.conn).purge_expired(now)?;
        if purged > 0 {
            tracing::info!("Purged {purged} expired archive entries");
        }
        Ok(purged)
    }
}
