use crate::store::MarketStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored notification. Delivery is someone else's job; this store only
/// keeps the rows the HTTP layer reads and mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl MarketStore {
    /// Stores a notification and returns its assigned id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn save_notification(&self, title: &str, body: &str, kind: &str) -> Result<i64> {
        let result = sqlx::query(
            r"
            INSERT INTO notifications (title, body, kind, is_read, created_at)
            VALUES (?1, ?2, ?3, 0, ?4)
            ",
        )
        .bind(title)
        .bind(body)
        .bind(kind)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Notifications, newest first, optionally unread only.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_notifications(&self, unread_only: bool) -> Result<Vec<NotificationRecord>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            r"
            SELECT * FROM notifications
            WHERE (?1 = 0 OR is_read = 0)
            ORDER BY created_at DESC
            ",
        )
        .bind(i64::from(unread_only))
        .fetch_all(self.pool())
        .await?;
        Ok(records)
    }

    /// Marks a notification read. Returns false when the id is unknown.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn mark_notification_read(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes a notification. Returns false when the id is unknown.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn delete_notification(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
