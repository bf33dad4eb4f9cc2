//! Person repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{Person, PersonId, SyncStatus};

use super::{parse_json_column, parse_text_column};

/// Trait for person storage operations
pub trait PersonRepository {
    /// Insert a new person
    fn create(&self, person: &Person) -> Result<()>;

    /// Get a person by ID
    fn get(&self, id: &PersonId) -> Result<Option<Person>>;

    /// List persons, most recently updated first
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Person>>;

    /// List all persons participating in sync
    fn list_sync_enabled(&self) -> Result<Vec<Person>>;

    /// Persist all fields of an existing person, bumping `updated_at`
    fn update(&self, person: &Person) -> Result<()>;

    /// Hard-delete a person (caller must archive first)
    fn delete(&self, id: &PersonId) -> Result<()>;

    /// Find the person mapped to the given external resource on the given account
    fn find_by_external_id(&self, account_id: &str, resource_id: &str) -> Result<Option<Person>>;

    /// Update only the sync bookkeeping fields
    fn set_sync_state(
        &self,
        id: &PersonId,
        status: SyncStatus,
        last_synced_at: Option<i64>,
    ) -> Result<()>;
}

/// `SQLite` implementation of `PersonRepository`
pub struct SqlitePersonRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqlitePersonRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a person from a database row
    fn parse_person(row: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
        let id: String = row.get(0)?;
        let phones: String = row.get(3)?;
        let emails: String = row.get(7)?;
        let external_ids: String = row.get(8)?;
        let sync_status: String = row.get(10)?;
        Ok(Person {
            id: parse_text_column(0, &id)?,
            display_name: row.get(1)?,
            title: row.get(2)?,
            phones: parse_json_column(3, &phones)?,
            birthday: row.get(4)?,
            notes: row.get(5)?,
            location: row.get(6)?,
            emails: parse_json_column(7, &emails)?,
            external_ids: parse_json_column(8, &external_ids)?,
            sync_enabled: row.get::<_, i32>(9)? != 0,
            sync_status: parse_text_column(10, &sync_status)?,
            last_synced_at: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

const PERSON_COLUMNS: &str = "id, display_name, title, phones, birthday, notes, location, \
     emails, external_ids, sync_enabled, sync_status, last_synced_at, created_at, updated_at";

impl PersonRepository for SqlitePersonRepository<'_> {
    fn create(&self, person: &Person) -> Result<()> {
        self.conn.execute(
            "INSERT INTO persons (id, display_name, title, phones, birthday, notes, location, \
             emails, external_ids, sync_enabled, sync_status, last_synced_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                person.id.as_str(),
                person.display_name,
                person.title,
                serde_json::to_string(&person.phones)?,
                person.birthday,
                person.notes,
                person.location,
                serde_json::to_string(&person.emails)?,
                serde_json::to_string(&person.external_ids)?,
                i32::from(person.sync_enabled),
                person.sync_status.as_str(),
                person.last_synced_at,
                person.created_at,
                person.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &PersonId) -> Result<Option<Person>> {
        let result = self.conn.query_row(
            &format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = ?"),
            params![id.as_str()],
            Self::parse_person,
        );

        match result {
            Ok(person) => Ok(Some(person)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Person>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PERSON_COLUMNS} FROM persons ORDER BY updated_at DESC LIMIT ? OFFSET ?"
        ))?;

        let persons = stmt
            .query_map(params![limit as i64, offset as i64], Self::parse_person)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(persons)
    }

    fn list_sync_enabled(&self) -> Result<Vec<Person>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PERSON_COLUMNS} FROM persons WHERE sync_enabled = 1 ORDER BY created_at ASC"
        ))?;

        let persons = stmt
            .query_map([], Self::parse_person)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(persons)
    }

    fn update(&self, person: &Person) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        let rows = self.conn.execute(
            "UPDATE persons SET display_name = ?, title = ?, phones = ?, birthday = ?, \
             notes = ?, location = ?, emails = ?, external_ids = ?, sync_enabled = ?, \
             sync_status = ?, last_synced_at = ?, updated_at = ? WHERE id = ?",
            params![
                person.display_name,
                person.title,
                serde_json::to_string(&person.phones)?,
                person.birthday,
                person.notes,
                person.location,
                serde_json::to_string(&person.emails)?,
                serde_json::to_string(&person.external_ids)?,
                i32::from(person.sync_enabled),
                person.sync_status.as_str(),
                person.last_synced_at,
                now,
                person.id.as_str(),
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(person.id.to_string()));
        }

        Ok(())
    }

    fn delete(&self, id: &PersonId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM persons WHERE id = ?", params![id.as_str()])?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn find_by_external_id(&self, account_id: &str, resource_id: &str) -> Result<Option<Person>> {
        // external_ids is a JSON object keyed by account id
        let path = format!("$.\"{account_id}\"");
        let result = self.conn.query_row(
            &format!(
                "SELECT {PERSON_COLUMNS} FROM persons WHERE json_extract(external_ids, ?) = ?"
            ),
            params![path, resource_id],
            Self::parse_person,
        );

        match result {
            Ok(person) => Ok(Some(person)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_sync_state(
        &self,
        id: &PersonId,
        status: SyncStatus,
        last_synced_at: Option<i64>,
    ) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE persons SET sync_status = ?, \
             last_synced_at = COALESCE(?, last_synced_at) WHERE id = ?",
            params![status.as_str(), last_synced_at, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }
}
