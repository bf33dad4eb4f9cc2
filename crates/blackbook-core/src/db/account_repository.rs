//! External account repository implementation

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{AccountId, ExternalAccount};

use super::parse_text_column;

/// Trait for external account storage operations
pub trait AccountRepository {
    /// Insert a new account
    fn create(&self, account: &ExternalAccount) -> Result<()>;

    /// Get an account by ID
    fn get(&self, id: &AccountId) -> Result<Option<ExternalAccount>>;

    /// List all accounts, oldest first
    fn list(&self) -> Result<Vec<ExternalAccount>>;

    /// List accounts participating in sync
    fn list_sync_enabled(&self) -> Result<Vec<ExternalAccount>>;

    /// Persist all fields of an existing account
    fn update(&self, account: &ExternalAccount) -> Result<()>;

    /// Record a completed sync for the account
    fn mark_synced(&self, id: &AccountId, synced_at: i64, next_sync_at: Option<i64>) -> Result<()>;
}

/// `SQLite` implementation of `AccountRepository`
pub struct SqliteAccountRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteAccountRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExternalAccount> {
        let id: String = row.get(0)?;
        Ok(ExternalAccount {
            id: parse_text_column(0, &id)?,
            email: row.get(1)?,
            display_name: row.get(2)?,
            sync_enabled: row.get::<_, i32>(3)? != 0,
            last_synced_at: row.get(4)?,
            next_sync_at: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

const ACCOUNT_COLUMNS: &str =
    "id, email, display_name, sync_enabled, last_synced_at, next_sync_at, created_at";

impl AccountRepository for SqliteAccountRepository<'_> {
    fn create(&self, account: &ExternalAccount) -> Result<()> {
        self.conn.execute(
            "INSERT INTO accounts (id, email, display_name, sync_enabled, last_synced_at, \
             next_sync_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                account.id.as_str(),
                account.email,
                account.display_name,
                i32::from(account.sync_enabled),
                account.last_synced_at,
                account.next_sync_at,
                account.created_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &AccountId) -> Result<Option<ExternalAccount>> {
        let result = self.conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"),
            params![id.as_str()],
            Self::parse_account,
        );

        match result {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<ExternalAccount>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at ASC"
        ))?;

        let accounts = stmt
            .query_map([], Self::parse_account)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(accounts)
    }

    fn list_sync_enabled(&self) -> Result<Vec<ExternalAccount>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE sync_enabled = 1 ORDER BY created_at ASC"
        ))?;

        let accounts = stmt
            .query_map([], Self::parse_account)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(accounts)
    }

    fn update(&self, account: &ExternalAccount) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE accounts SET email = ?, display_name = ?, sync_enabled = ?, \
             last_synced_at = ?, next_sync_at = ? WHERE id = ?",
            params![
                account.email,
                account.display_name,
                i32::from(account.sync_enabled),
                account.last_synced_at,
                account.next_sync_at,
                account.id.as_str(),
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(account.id.to_string()));
        }

        Ok(())
    }

    fn mark_synced(&self, id: &AccountId, synced_at: i64, next_sync_at: Option<i64>) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE accounts SET last_synced_at = ?, next_sync_at = ? WHERE id = ?",
            params![synced_at, next_sync_at, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::Database;

    #[test]
    fn test_create_and_get() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteAccountRepository::new(conn);
            let account = ExternalAccount::new("mira@example.com");
            repo.create(&account).unwrap();

            let fetched = repo.get(&account.id).unwrap().unwrap();
            assert_eq!(fetched, account);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteAccountRepository::new(conn);
            repo.create(&ExternalAccount::new("mira@example.com")).unwrap();
            assert!(repo.create(&ExternalAccount::new("Mira@Example.com")).is_err());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_sync_enabled() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteAccountRepository::new(conn);
            let enabled = ExternalAccount::new("on@example.com");
            let mut disabled = ExternalAccount::new("off@example.com");
            disabled.sync_enabled = false;
            repo.create(&enabled).unwrap();
            repo.create(&disabled).unwrap();

            let accounts = repo.list_sync_enabled().unwrap();
            assert_eq!(accounts.len(), 1);
            assert_eq!(accounts[0].email, "on@example.com");
            assert_eq!(repo.list().unwrap().len(), 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_mark_synced() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteAccountRepository::new(conn);
            let account = ExternalAccount::new("mira@example.com");
            repo.create(&account).unwrap();

            repo.mark_synced(&account.id, 1_000, Some(2_000)).unwrap();
            let fetched = repo.get(&account.id).unwrap().unwrap();
            assert_eq!(fetched.last_synced_at, Some(1_000));
            assert_eq!(fetched.next_sync_at, Some(2_000));
            Ok(())
        })
        .unwrap();
    }
}
