//! Database connection management

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::{Error, Result};

use super::migrations;

/// Database wrapper for the `SQLite` connection
///
/// The connection is shared between the sync engine, the scheduler, and
/// the HTTP surface, so it lives behind a mutex. Callers borrow it for
/// the duration of one closure and must not hold it across awaits.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let database = Self {
            conn: Mutex::new(conn),
        };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let database = Self {
            conn: Mutex::new(conn),
        };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for optimal performance
    fn configure(&self) -> Result<()> {
        self.with_conn(|conn| {
            // WAL is a no-op for in-memory databases
            conn.pragma_update(None, "journal_mode", "WAL").ok();
            conn.pragma_update(None, "synchronous", "NORMAL").ok();
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        })
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        self.with_conn(migrations::run)
    }

    /// Run a closure against the connection
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Database("connection mutex poisoned".to_string()))?;
        f(&conn)
    }
}
