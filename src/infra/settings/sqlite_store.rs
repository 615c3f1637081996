use crate::core::settings::{GuildSettings, SettingsError, SettingsStore};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteSettingsStore {
    pool: Pool<Sqlite>,
}

impl SqliteSettingsStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get_guild(&self, guild_id: u64) -> Result<Option<GuildSettings>, SettingsError> {
        let row = sqlx::query("SELECT prefixes, giveaway_role_id FROM guilds WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SettingsError::StorageError(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let prefixes: String = row.get("prefixes");
        Ok(Some(GuildSettings {
            guild_id,
            prefixes: serde_json::from_str(&prefixes)
                .map_err(|e| SettingsError::StorageError(e.to_string()))?,
            giveaway_role_id: row
                .get::<Option<i64>, _>("giveaway_role_id")
                .map(|id| id as u64),
        }))
    }

    async fn save_guild(&self, settings: &GuildSettings) -> Result<(), SettingsError> {
        let prefixes = serde_json::to_string(&settings.prefixes)
            .map_err(|e| SettingsError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO guilds (guild_id, prefixes, giveaway_role_id)
            VALUES (?, ?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
            prefixes = excluded.prefixes,
            giveaway_role_id = excluded.giveaway_role_id
            "#,
        )
        .bind(settings.guild_id as i64)
        .bind(prefixes)
        .bind(settings.giveaway_role_id.map(|id| id as i64))
        .execute(&self.pool)
        .await
        .map_err(|e| SettingsError::StorageError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::database::Database;

    #[tokio::test]
    async fn guild_settings_round_trip() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteSettingsStore::new(db.pool());
        assert!(store.get_guild(1).await.unwrap().is_none());

        let mut settings = GuildSettings::new(1, ">");
        settings.prefixes.push("lambda ".into());
        store.save_guild(&settings).await.unwrap();
        assert_eq!(store.get_guild(1).await.unwrap(), Some(settings.clone()));

        settings.giveaway_role_id = Some(99);
        store.save_guild(&settings).await.unwrap();
        assert_eq!(store.get_guild(1).await.unwrap(), Some(settings));
    }
}
