//! Archived person repository implementation

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{ArchiveId, ArchivedPerson, PersonId};

use super::{parse_json_column, parse_text_column};

/// Trait for archive storage operations
pub trait ArchiveRepository {
    /// Insert a new archive entry
    fn create(&self, archived: &ArchivedPerson) -> Result<()>;

    /// Get an archive entry by ID
    fn get(&self, id: &ArchiveId) -> Result<Option<ArchivedPerson>>;

    /// List entries that have not been restored, newest first
    fn list_unrestored(&self) -> Result<Vec<ArchivedPerson>>;

    /// Mark an entry restored; fails if it was already restored
    fn mark_restored(&self, id: &ArchiveId, restored_at: i64, new_person: &PersonId) -> Result<()>;

    /// Delete entries whose retention expired without a restore.
    /// Returns how many rows were removed.
    fn purge_expired(&self, now: i64) -> Result<usize>;
}

/// `SQLite` implementation of `ArchiveRepository`
pub struct SqliteArchiveRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteArchiveRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_archived(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArchivedPerson> {
        let id: String = row.get(0)?;
        let person_id: String = row.get(1)?;
        let snapshot: String = row.get(2)?;
        let deleted_from: String = row.get(3)?;
        let account_id: Option<String> = row.get(4)?;
        let external_ids: String = row.get(5)?;
        let restored_person_id: Option<String> = row.get(9)?;
        Ok(ArchivedPerson {
            id: parse_text_column(0, &id)?,
            person_id: parse_text_column(1, &person_id)?,
            snapshot: parse_json_column(2, &snapshot)?,
            deleted_from: parse_text_column(3, &deleted_from)?,
            account_id: account_id.as_deref().map(|s| parse_text_column(4, s)).transpose()?,
            external_ids: parse_json_column(5, &external_ids)?,
            archived_at: row.get(6)?,
            expires_at: row.get(7)?,
            restored_at: row.get(8)?,
            restored_person_id: restored_person_id
                .as_deref()
                .map(|s| parse_text_column(9, s))
                .transpose()?,
        })
    }
}

const ARCHIVE_COLUMNS: &str = "id, person_id, snapshot, deleted_from, account_id, external_ids, \
     archived_at, expires_at, restored_at, restored_person_id";

impl ArchiveRepository for SqliteArchiveRepository<'_> {
    fn create(&self, archived: &ArchivedPerson) -> Result<()> {
        self.conn.execute(
            "INSERT INTO archived_persons (id, person_id, snapshot, deleted_from, account_id, \
             external_ids, archived_at, expires_at, restored_at, restored_person_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                archived.id.as_str(),
                archived.person_id.as_str(),
                serde_json::to_string(&archived.snapshot)?,
                archived.deleted_from.as_str(),
                archived.account_id.map(|id| id.as_str()),
                serde_json::to_string(&archived.external_ids)?,
                archived.archived_at,
                archived.expires_at,
                archived.restored_at,
                archived.restored_person_id.map(|id| id.as_str()),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &ArchiveId) -> Result<Option<ArchivedPerson>> {
        let result = self.conn.query_row(
            &format!("SELECT {ARCHIVE_COLUMNS} FROM archived_persons WHERE id = ?"),
            params![id.as_str()],
            Self::parse_archived,
        );

        match result {
            Ok(archived) => Ok(Some(archived)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_unrestored(&self) -> Result<Vec<ArchivedPerson>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archived_persons \
             WHERE restored_at IS NULL ORDER BY archived_at DESC"
        ))?;

        let entries = stmt
            .query_map([], Self::parse_archived)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn mark_restored(&self, id: &ArchiveId, restored_at: i64, new_person: &PersonId) -> Result<()> {
        // The restored_at guard makes a double restore a no-op at the SQL level
        let rows = self.conn.execute(
            "UPDATE archived_persons SET restored_at = ?, restored_person_id = ? \
             WHERE id = ? AND restored_at IS NULL",
            params![restored_at, new_person.as_str(), id.as_str()],
        )?;

        if rows == 0 {
            return match self.get(id)? {
                Some(_) => Err(Error::AlreadyRestored(id.to_string())),
                None => Err(Error::NotFound(id.to_string())),
            };
        }

        Ok(())
    }

    fn purge_expired(&self, now: i64) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM archived_persons WHERE restored_at IS NULL AND expires_at <= ?",
            params![now],
        )?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::Database;
    use crate::models::{DeletionSource, Person};

    fn sample_archive(retention_days: u32) -> ArchivedPerson {
        let person = Person::new("Mira Kovač");
        ArchivedPerson::snapshot(&person, DeletionSource::Local, None, retention_days)
    }

    #[test]
    fn test_create_and_get_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteArchiveRepository::new(conn);
            let archived = sample_archive(90);
            repo.create(&archived).unwrap();

            let fetched = repo.get(&archived.id).unwrap().unwrap();
            assert_eq!(fetched, archived);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_restore_only_once() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteArchiveRepository::new(conn);
            let archived = sample_archive(90);
            repo.create(&archived).unwrap();

            let new_person = PersonId::new();
            repo.mark_restored(&archived.id, 1_000, &new_person).unwrap();

            let fetched = repo.get(&archived.id).unwrap().unwrap();
            assert_eq!(fetched.restored_at, Some(1_000));
            assert_eq!(fetched.restored_person_id, Some(new_person));

            assert!(matches!(
                repo.mark_restored(&archived.id, 2_000, &PersonId::new()),
                Err(Error::AlreadyRestored(_))
            ));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_restore_missing_entry() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteArchiveRepository::new(conn);
            assert!(matches!(
                repo.mark_restored(&ArchiveId::new(), 1_000, &PersonId::new()),
                Err(Error::NotFound(_))
            ));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_purge_spares_live_and_restored() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteArchiveRepository::new(conn);

            let live = sample_archive(90);
            let mut expired = sample_archive(90);
            expired.expires_at = expired.archived_at - 1;
            let mut restored_expired = sample_archive(90);
            restored_expired.expires_at = restored_expired.archived_at - 1;

            repo.create(&live).unwrap();
            repo.create(&expired).unwrap();
            repo.create(&restored_expired).unwrap();
            repo.mark_restored(&restored_expired.id, 500, &PersonId::new()).unwrap();

            let now = chrono::Utc::now().timestamp_millis();
            let purged = repo.purge_expired(now).unwrap();
            assert_eq!(purged, 1);

            assert!(repo.get(&expired.id).unwrap().is_none());
            assert!(repo.get(&live.id).unwrap().is_some());
            assert!(repo.get(&restored_expired.id).unwrap().is_some());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_unrestored() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteArchiveRepository::new(conn);
            let first = sample_archive(90);
            let second = sample_archive(90);
            repo.create(&first).unwrap();
            repo.create(&second).unwrap();
            repo.mark_restored(&first.id, 1_000, &PersonId::new()).unwrap();

            let unrestored = repo.list_unrestored().unwrap();
            assert_eq!(unrestored.len(), 1);
            assert_eq!(unrestored[0].id, second.id);
            Ok(())
        })
        .unwrap();
    }
}
