//! Sync run bookkeeping
//!
//! One row per pass, so the status surface can report the most recent
//! completed (or partial/canceled) pass.

use std::str::FromStr;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::parse_text_column;

/// Lifecycle state of one sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunStatus {
    Running,
    Completed,
    Partial,
    Failed,
}

impl SyncRunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for SyncRunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown sync run status: {other}")),
        }
    }
}

/// One recorded pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i64,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub status: SyncRunStatus,
    /// The per-account report, serialized
    pub summary: Option<serde_json::Value>,
}

/// Trait for sync run storage operations
pub trait RunRepository {
    /// Record the start of a pass, returning its row id
    fn start(&self, started_at: i64) -> Result<i64>;

    /// Record the end of a pass
    fn finish(
        &self,
        id: i64,
        finished_at: i64,
        status: SyncRunStatus,
        summary: &serde_json::Value,
    ) -> Result<()>;

    /// The most recent pass, if any
    fn latest(&self) -> Result<Option<SyncRun>>;
}

/// `SQLite` implementation of `RunRepository`
pub struct SqliteRunRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRunRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncRun> {
        let status: String = row.get(3)?;
        let summary: Option<String> = row.get(4)?;
        Ok(SyncRun {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            status: parse_text_column(3, &status)?,
            summary: summary
                .as_deref()
                .map(|s| super::parse_json_column(4, s))
                .transpose()?,
        })
    }
}

impl RunRepository for SqliteRunRepository<'_> {
    fn start(&self, started_at: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sync_runs (started_at, status) VALUES (?, 'running')",
            params![started_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish(
        &self,
        id: i64,
        finished_at: i64,
        status: SyncRunStatus,
        summary: &serde_json::Value,
    ) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sync_runs SET finished_at = ?, status = ?, summary = ? WHERE id = ?",
            params![
                finished_at,
                status.as_str(),
                serde_json::to_string(summary)?,
                id
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("sync run {id}")));
        }

        Ok(())
    }

    fn latest(&self) -> Result<Option<SyncRun>> {
        let result = self.conn.query_row(
            "SELECT id, started_at, finished_at, status, summary \
             FROM sync_runs ORDER BY id DESC LIMIT 1",
            [],
            Self::parse_run,
        );

        match result {
            Ok(run) => Ok(Some(run)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
