//! Review queue repository implementation

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{ReviewId, ReviewItem, ReviewStatus};

use super::{parse_json_column, parse_text_column};

/// Trait for review queue storage operations
pub trait ReviewRepository {
    /// Insert a new review item
    fn create(&self, item: &ReviewItem) -> Result<()>;

    /// Get a review item by ID
    fn get(&self, id: &ReviewId) -> Result<Option<ReviewItem>>;

    /// List pending items, oldest first
    fn list_pending(&self) -> Result<Vec<ReviewItem>>;

    /// Count pending items
    fn count_pending(&self) -> Result<u64>;

    /// Resolve a pending item with the chosen payload
    fn resolve(&self, id: &ReviewId, resolution: &serde_json::Value) -> Result<ReviewItem>;

    /// Dismiss a pending item
    fn dismiss(&self, id: &ReviewId) -> Result<ReviewItem>;
}

/// `SQLite` implementation of `ReviewRepository`
pub struct SqliteReviewRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteReviewRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReviewItem> {
        let id: String = row.get(0)?;
        let person_id: String = row.get(1)?;
        let account_id: Option<String> = row.get(2)?;
        let review_type: String = row.get(3)?;
        let local_value: String = row.get(5)?;
        let external_value: String = row.get(6)?;
        let status: String = row.get(7)?;
        let resolution: Option<String> = row.get(8)?;
        Ok(ReviewItem {
            id: parse_text_column(0, &id)?,
            person_id: parse_text_column(1, &person_id)?,
            account_id: account_id.as_deref().map(|s| parse_text_column(2, s)).transpose()?,
            review_type: parse_text_column(3, &review_type)?,
            field: row.get(4)?,
            local_value: parse_json_column(5, &local_value)?,
            external_value: parse_json_column(6, &external_value)?,
            status: parse_text_column(7, &status)?,
            resolution: resolution.as_deref().map(|s| parse_json_column(8, s)).transpose()?,
            created_at: row.get(9)?,
            resolved_at: row.get(10)?,
        })
    }

    /// Move a pending item to a terminal state
    fn settle(
        &self,
        id: &ReviewId,
        status: ReviewStatus,
        resolution: Option<&serde_json::Value>,
    ) -> Result<ReviewItem> {
        let now = chrono::Utc::now().timestamp_millis();
        let resolution_json = resolution.map(serde_json::to_string).transpose()?;
        let rows = self.conn.execute(
            "UPDATE review_queue SET status = ?, resolution = ?, resolved_at = ? \
             WHERE id = ? AND status = 'pending'",
            params![status.as_str(), resolution_json, now, id.as_str()],
        )?;

        if rows == 0 {
            return match self.get(id)? {
                Some(item) => Err(Error::InvalidInput(format!(
                    "review item {id} is already {}",
                    item.status.as_str()
                ))),
                None => Err(Error::NotFound(id.to_string())),
            };
        }

        self.get(id)?.ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

const REVIEW_COLUMNS: &str = "id, person_id, account_id, review_type, field, local_value, \
     external_value, status, resolution, created_at, resolved_at";

impl ReviewRepository for SqliteReviewRepository<'_> {
    fn create(&self, item: &ReviewItem) -> Result<()> {
        self.conn.execute(
            "INSERT INTO review_queue (id, person_id, account_id, review_type, field, \
             local_value, external_value, status, resolution, created_at, resolved_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                item.id.as_str(),
                item.person_id.as_str(),
                item.account_id.map(|id| id.as_str()),
                item.review_type.as_str(),
                item.field,
                serde_json::to_string(&item.local_value)?,
                serde_json::to_string(&item.external_value)?,
                item.status.as_str(),
                item.resolution
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                item.created_at,
                item.resolved_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &ReviewId) -> Result<Option<ReviewItem>> {
        let result = self.conn.query_row(
            &format!("SELECT {REVIEW_COLUMNS} FROM review_queue WHERE id = ?"),
            params![id.as_str()],
            Self::parse_item,
        );

        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_pending(&self) -> Result<Vec<ReviewItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review_queue \
             WHERE status = 'pending' ORDER BY created_at ASC"
        ))?;

        let items = stmt
            .query_map([], Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(items)
    }

    fn count_pending(&self) -> Result<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM review_queue WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn resolve(&self, id: &ReviewId, resolution: &serde_json::Value) -> Result<ReviewItem> {
        self.settle(id, ReviewStatus::Resolved, Some(resolution))
    }

    fn dismiss(&self, id: &ReviewId) -> Result<ReviewItem> {
        self.settle(id, ReviewStatus::Dismissed, None)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::Database;
    use crate::models::{PersonId, ReviewDraft, ReviewType};

    fn sample_item() -> ReviewItem {
        ReviewItem::from_draft(
            ReviewDraft {
                review_type: ReviewType::NameConflict,
                field: "display_name".to_string(),
                local_value: serde_json::json!("Robert Smith"),
                external_value: serde_json::json!("Roberta Smith"),
            },
            PersonId::new(),
            None,
        )
    }

    #[test]
    fn test_create_and_get_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteReviewRepository::new(conn);
            let item = sample_item();
            repo.create(&item).unwrap();

            let fetched = repo.get(&item.id).unwrap().unwrap();
            assert_eq!(fetched, item);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_resolve_transitions_once() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteReviewRepository::new(conn);
            let item = sample_item();
            repo.create(&item).unwrap();

            let resolution = serde_json::json!({"choice": "external"});
            let resolved = repo.resolve(&item.id, &resolution).unwrap();
            assert_eq!(resolved.status, ReviewStatus::Resolved);
            assert_eq!(resolved.resolution, Some(resolution.clone()));
            assert!(resolved.resolved_at.is_some());

            // A settled item cannot be resolved or dismissed again
            assert!(repo.resolve(&item.id, &resolution).is_err());
            assert!(repo.dismiss(&item.id).is_err());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_dismiss() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteReviewRepository::new(conn);
            let item = sample_item();
            repo.create(&item).unwrap();

            let dismissed = repo.dismiss(&item.id).unwrap();
            assert_eq!(dismissed.status, ReviewStatus::Dismissed);
            assert!(dismissed.resolution.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_pending_listing_and_count() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteReviewRepository::new(conn);
            let first = sample_item();
            let second = sample_item();
            repo.create(&first).unwrap();
            repo.create(&second).unwrap();

            assert_eq!(repo.count_pending().unwrap(), 2);
            repo.dismiss(&first.id).unwrap();
            assert_eq!(repo.count_pending().unwrap(), 1);

            let pending = repo.list_pending().unwrap();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].id, second.id);
            Ok(())
        })
        .unwrap();
    }
}
