use crate::core::timers::{Timer, TimerError, TimerStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

/// Timestamps are stored as unix milliseconds so they sort numerically.
pub struct SqliteTimerStore {
    pool: Pool<Sqlite>,
}

impl SqliteTimerStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn storage_error(e: impl std::fmt::Display) -> TimerError {
    TimerError::StorageError(e.to_string())
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}

fn timer_from_row(row: &SqliteRow) -> Result<Timer, TimerError> {
    let metadata: String = row.get("metadata");
    Ok(Timer {
        id: row.get("id"),
        event: row.get("event"),
        created_at: from_millis(row.get("created_at")),
        expires_at: from_millis(row.get("expires_at")),
        metadata: serde_json::from_str(&metadata).map_err(storage_error)?,
    })
}

#[async_trait]
impl TimerStore for SqliteTimerStore {
    async fn insert(
        &self,
        event: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        metadata: &Value,
    ) -> Result<i64, TimerError> {
        let result = sqlx::query(
            "INSERT INTO timers (event, created_at, expires_at, metadata) VALUES (?, ?, ?, ?)",
        )
        .bind(event)
        .bind(created_at.timestamp_millis())
        .bind(expires_at.timestamp_millis())
        .bind(metadata.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> Result<Option<Timer>, TimerError> {
        let row = sqlx::query("SELECT * FROM timers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(timer_from_row).transpose()
    }

    async fn earliest(&self) -> Result<Option<Timer>, TimerError> {
        let row = sqlx::query("SELECT * FROM timers ORDER BY expires_at ASC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(timer_from_row).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool, TimerError> {
        let result = sqlx::query("DELETE FROM timers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_metadata(&self, id: i64, metadata: &Value) -> Result<bool, TimerError> {
        let result = sqlx::query("UPDATE timers SET metadata = ? WHERE id = ?")
            .bind(metadata.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_event(&self, event: &str) -> Result<Vec<Timer>, TimerError> {
        let rows = sqlx::query("SELECT * FROM timers WHERE event = ? ORDER BY expires_at ASC")
            .bind(event)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter().map(timer_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::database::Database;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn timers_are_ordered_by_expiry() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteTimerStore::new(db.pool());
        let now = Utc::now();

        let late = store
            .insert("reminder", now, now + Duration::days(2), &json!({"author_id": 1}))
            .await
            .unwrap();
        let soon = store
            .insert("giveaway_end", now, now + Duration::hours(1), &json!({}))
            .await
            .unwrap();

        let earliest = store.earliest().await.unwrap().unwrap();
        assert_eq!(earliest.id, soon);
        assert_eq!(
            earliest.expires_at.timestamp_millis(),
            (now + Duration::hours(1)).timestamp_millis()
        );

        let reminders = store.list_for_event("reminder").await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].metadata_u64("author_id"), Some(1));

        assert!(store.update_metadata(late, &json!({"author_id": 2})).await.unwrap());
        assert_eq!(
            store.get(late).await.unwrap().unwrap().metadata_u64("author_id"),
            Some(2)
        );

        assert!(store.delete(soon).await.unwrap());
        assert!(!store.delete(soon).await.unwrap());
        assert_eq!(store.earliest().await.unwrap().unwrap().id, late);
    }
}
