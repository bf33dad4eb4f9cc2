//! Sync log repository implementation
//!
//! The log is append-only: there is deliberately no update or delete.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{NewSyncLogEntry, PersonId, SyncLogEntry, SyncLogStatus};

use super::{parse_json_column, parse_text_column};

/// Filter for listing log entries
#[derive(Debug, Clone, Default)]
pub struct SyncLogFilter {
    pub status: Option<SyncLogStatus>,
    pub person_id: Option<PersonId>,
}

/// Trait for sync log storage operations
pub trait SyncLogRepository {
    /// Append one entry, returning its row id
    fn append(&self, entry: &NewSyncLogEntry) -> Result<i64>;

    /// List entries newest-first, filtered and paginated
    fn list(&self, filter: &SyncLogFilter, limit: usize, offset: usize) -> Result<Vec<SyncLogEntry>>;

    /// Count entries matching the filter
    fn count(&self, filter: &SyncLogFilter) -> Result<u64>;
}

/// `SQLite` implementation of `SyncLogRepository`
pub struct SqliteSyncLogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncLogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncLogEntry> {
        let person_id: Option<String> = row.get(1)?;
        let account_id: Option<String> = row.get(2)?;
        let direction: String = row.get(3)?;
        let action: String = row.get(4)?;
        let status: String = row.get(5)?;
        let changed_fields: String = row.get(6)?;
        Ok(SyncLogEntry {
            id: row.get(0)?,
            person_id: person_id.as_deref().map(|s| parse_text_column(1, s)).transpose()?,
            account_id: account_id.as_deref().map(|s| parse_text_column(2, s)).transpose()?,
            direction: parse_text_column(3, &direction)?,
            action: parse_text_column(4, &action)?,
            status: parse_text_column(5, &status)?,
            changed_fields: parse_json_column(6, &changed_fields)?,
            error: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn where_clause(filter: &SyncLogFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(person_id) = filter.person_id {
            clauses.push("person_id = ?");
            values.push(Box::new(person_id.as_str()));
        }
        let sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        (sql, values)
    }
}

impl SyncLogRepository for SqliteSyncLogRepository<'_> {
    fn append(&self, entry: &NewSyncLogEntry) -> Result<i64> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO sync_log (person_id, account_id, direction, action, status, \
             changed_fields, error, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.person_id.map(|id| id.as_str()),
                entry.account_id.map(|id| id.as_str()),
                entry.direction.as_str(),
                entry.action.as_str(),
                entry.status.as_str(),
                serde_json::to_string(&entry.changed_fields)?,
                entry.error,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list(
        &self,
        filter: &SyncLogFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SyncLogEntry>> {
        let (where_sql, mut values) = Self::where_clause(filter);
        values.push(Box::new(limit as i64));
        values.push(Box::new(offset as i64));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, person_id, account_id, direction, action, status, changed_fields, \
             error, created_at FROM sync_log{where_sql} ORDER BY id DESC LIMIT ? OFFSET ?"
        ))?;

        let entries = stmt
            .query_map(
                rusqlite::params_from_iter(values.iter().map(std::convert::AsRef::as_ref)),
                Self::parse_entry,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn count(&self, filter: &SyncLogFilter) -> Result<u64> {
        let (where_sql, values) = Self::where_clause(filter);
        let count: u64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM sync_log{where_sql}"),
            rusqlite::params_from_iter(values.iter().map(std::convert::AsRef::as_ref)),
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
