//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|v| v != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: core sync entities
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS persons (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            title TEXT,
            phones TEXT NOT NULL DEFAULT '[]',
            birthday TEXT,
            notes TEXT NOT NULL DEFAULT '',
            location TEXT,
            emails TEXT NOT NULL DEFAULT '[]',
            external_ids TEXT NOT NULL DEFAULT '{}',
            sync_enabled INTEGER NOT NULL DEFAULT 1,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            last_synced_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_persons_updated ON persons(updated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_persons_sync_enabled ON persons(sync_enabled);
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            display_name TEXT,
            sync_enabled INTEGER NOT NULL DEFAULT 1,
            last_synced_at INTEGER,
            next_sync_at INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS sync_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id TEXT,
            account_id TEXT,
            direction TEXT NOT NULL,
            action TEXT NOT NULL,
            status TEXT NOT NULL,
            changed_fields TEXT NOT NULL DEFAULT '{}',
            error TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sync_log_person ON sync_log(person_id);
        CREATE INDEX IF NOT EXISTS idx_sync_log_status ON sync_log(status);
        CREATE INDEX IF NOT EXISTS idx_sync_log_created ON sync_log(created_at DESC);
        CREATE TABLE IF NOT EXISTS archived_persons (
            id TEXT PRIMARY KEY,
            person_id TEXT NOT NULL,
            snapshot TEXT NOT NULL,
            deleted_from TEXT NOT NULL,
            account_id TEXT,
            external_ids TEXT NOT NULL DEFAULT '{}',
            archived_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            restored_at INTEGER,
            restored_person_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_archived_expires ON archived_persons(expires_at);
        CREATE TABLE IF NOT EXISTS review_queue (
            id TEXT PRIMARY KEY,
            person_id TEXT NOT NULL,
            account_id TEXT,
            review_type TEXT NOT NULL,
            field TEXT NOT NULL,
            local_value TEXT NOT NULL,
            external_value TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            resolution TEXT,
            created_at INTEGER NOT NULL,
            resolved_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_review_status ON review_queue(status);
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        INSERT INTO schema_version (version) VALUES (1);
        COMMIT;",
    )?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: sync run bookkeeping for the status surface
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS sync_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at INTEGER NOT NULL,
            finished_at INTEGER,
            status TEXT NOT NULL DEFAULT 'running',
            summary TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_sync_runs_started ON sync_runs(started_at DESC);
        INSERT INTO schema_version (version) VALUES (2);
        COMMIT;",
    )?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
