use crate::core::invites::{InviteError, InviteStore};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteInviteStore {
    pool: Pool<Sqlite>,
}

impl SqliteInviteStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn storage(e: sqlx::Error) -> InviteError {
    InviteError::StorageError(e.to_string())
}

#[async_trait]
impl InviteStore for SqliteInviteStore {
    async fn tracking_channels(&self) -> Result<Vec<(u64, u64)>, InviteError> {
        let rows = sqlx::query("SELECT guild_id, channel_id FROM invite_tracking")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get::<i64, _>("guild_id") as u64,
                    row.get::<i64, _>("channel_id") as u64,
                )
            })
            .collect())
    }

    async fn set_channel(&self, guild_id: u64, channel_id: Option<u64>) -> Result<(), InviteError> {
        match channel_id {
            Some(channel_id) => {
                sqlx::query(
                    r#"
                    INSERT INTO invite_tracking (guild_id, channel_id)
                    VALUES (?, ?)
                    ON CONFLICT(guild_id) DO UPDATE SET channel_id = excluded.channel_id
                    "#,
                )
                .bind(guild_id as i64)
                .bind(channel_id as i64)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
            }
            None => {
                sqlx::query("DELETE FROM invite_tracking WHERE guild_id = ?")
                    .bind(guild_id as i64)
                    .execute(&self.pool)
                    .await
                    .map_err(storage)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::database::Database;

    #[tokio::test]
    async fn channels_are_upserted_and_removed() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteInviteStore::new(db.pool());
        assert!(store.tracking_channels().await.unwrap().is_empty());

        store.set_channel(1, Some(10)).await.unwrap();
        store.set_channel(1, Some(11)).await.unwrap();
        store.set_channel(2, Some(20)).await.unwrap();
        let mut channels = store.tracking_channels().await.unwrap();
        channels.sort();
        assert_eq!(channels, vec![(1, 11), (2, 20)]);

        store.set_channel(1, None).await.unwrap();
        assert_eq!(store.tracking_channels().await.unwrap(), vec![(2, 20)]);
    }
}
