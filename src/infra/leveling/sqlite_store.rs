use crate::core::leveling::{
    CooldownSettings, GainRange, LevelUpChannel, LevelingConfig, LevelingError, LevelingRecord,
    LevelingSpec, LevelingStore,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteLevelingStore {
    pool: Pool<Sqlite>,
}

impl SqliteLevelingStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn storage_error(e: impl std::fmt::Display) -> LevelingError {
    LevelingError::StorageError(e.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, LevelingError> {
    serde_json::to_string(value).map_err(storage_error)
}

fn from_json<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T, LevelingError> {
    let raw: String = row.get(column);
    serde_json::from_str(&raw).map_err(storage_error)
}

fn config_from_row(row: &SqliteRow) -> Result<LevelingConfig, LevelingError> {
    Ok(LevelingConfig {
        guild_id: row.get::<i64, _>("guild_id") as u64,
        module_enabled: row.get("module_enabled"),
        role_stack: row.get("role_stack"),
        spec: LevelingSpec {
            base: row.get::<i64, _>("base") as u32,
            factor: row.get("factor"),
            gain: GainRange {
                min: row.get::<i64, _>("min_gain") as u32,
                max: row.get::<i64, _>("max_gain") as u32,
            },
        },
        cooldown: CooldownSettings {
            rate: row.get::<i64, _>("cooldown_rate") as u32,
            per: row.get("cooldown_per"),
        },
        level_up_message: row.get("level_up_message"),
        special_level_up_messages: from_json(row, "special_level_up_messages")?,
        level_up_channel: LevelUpChannel::from_raw(row.get::<i64, _>("level_up_channel") as u64),
        blacklisted_roles: from_json(row, "blacklisted_roles")?,
        blacklisted_channels: from_json(row, "blacklisted_channels")?,
        blacklisted_users: from_json(row, "blacklisted_users")?,
        level_roles: from_json(row, "level_roles")?,
        multiplier_roles: from_json(row, "multiplier_roles")?,
        multiplier_channels: from_json(row, "multiplier_channels")?,
        reset_on_leave: row.get("reset_on_leave"),
    })
}

fn record_from_row(row: &SqliteRow) -> LevelingRecord {
    LevelingRecord {
        guild_id: row.get::<i64, _>("guild_id") as u64,
        user_id: row.get::<i64, _>("user_id") as u64,
        level: row.get("level"),
        xp: row.get("xp"),
    }
}

#[async_trait]
impl LevelingStore for SqliteLevelingStore {
    async fn get_config(&self, guild_id: u64) -> Result<Option<LevelingConfig>, LevelingError> {
        let row = sqlx::query("SELECT * FROM level_config WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(config_from_row).transpose()
    }

    async fn save_config(&self, config: &LevelingConfig) -> Result<(), LevelingError> {
        sqlx::query(
            r#"
            INSERT INTO level_config (
                guild_id, module_enabled, role_stack, base, factor, min_gain, max_gain,
                cooldown_rate, cooldown_per, level_up_message, special_level_up_messages,
                level_up_channel, blacklisted_roles, blacklisted_channels, blacklisted_users,
                level_roles, multiplier_roles, multiplier_channels, reset_on_leave
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                module_enabled = excluded.module_enabled,
                role_stack = excluded.role_stack,
                base = excluded.base,
                factor = excluded.factor,
                min_gain = excluded.min_gain,
                max_gain = excluded.max_gain,
                cooldown_rate = excluded.cooldown_rate,
                cooldown_per = excluded.cooldown_per,
                level_up_message = excluded.level_up_message,
                special_level_up_messages = excluded.special_level_up_messages,
                level_up_channel = excluded.level_up_channel,
                blacklisted_roles = excluded.blacklisted_roles,
                blacklisted_channels = excluded.blacklisted_channels,
                blacklisted_users = excluded.blacklisted_users,
                level_roles = excluded.level_roles,
                multiplier_roles = excluded.multiplier_roles,
                multiplier_channels = excluded.multiplier_channels,
                reset_on_leave = excluded.reset_on_leave
            "#,
        )
        .bind(config.guild_id as i64)
        .bind(config.module_enabled)
        .bind(config.role_stack)
        .bind(config.spec.base as i64)
        .bind(config.spec.factor)
        .bind(config.spec.gain.min as i64)
        .bind(config.spec.gain.max as i64)
        .bind(config.cooldown.rate as i64)
        .bind(config.cooldown.per)
        .bind(config.level_up_message.as_deref())
        .bind(to_json(&config.special_level_up_messages)?)
        .bind(config.level_up_channel.to_raw() as i64)
        .bind(to_json(&config.blacklisted_roles)?)
        .bind(to_json(&config.blacklisted_channels)?)
        .bind(to_json(&config.blacklisted_users)?)
        .bind(to_json(&config.level_roles)?)
        .bind(to_json(&config.multiplier_roles)?)
        .bind(to_json(&config.multiplier_channels)?)
        .bind(config.reset_on_leave)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn get_record(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<LevelingRecord>, LevelingError> {
        let row = sqlx::query("SELECT * FROM levels WHERE guild_id = ? AND user_id = ?")
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.as_ref().map(record_from_row))
    }

    async fn save_record(&self, record: &LevelingRecord) -> Result<(), LevelingError> {
        sqlx::query(
            r#"
            INSERT INTO levels (guild_id, user_id, level, xp)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(guild_id, user_id) DO UPDATE SET
            level = excluded.level,
            xp = excluded.xp
            "#,
        )
        .bind(record.guild_id as i64)
        .bind(record.user_id as i64)
        .bind(record.level)
        .bind(record.xp)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn delete_record(&self, guild_id: u64, user_id: u64) -> Result<bool, LevelingError> {
        let result = sqlx::query("DELETE FROM levels WHERE guild_id = ? AND user_id = ?")
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn leaderboard(
        &self,
        guild_id: u64,
        limit: usize,
    ) -> Result<Vec<LevelingRecord>, LevelingError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM levels
            WHERE guild_id = ? AND (level > 0 OR xp > 0)
            ORDER BY level DESC, xp DESC
            LIMIT ?
            "#,
        )
        .bind(guild_id as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn count_ahead(&self, guild_id: u64, level: i64, xp: i64) -> Result<u64, LevelingError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS ahead FROM levels
            WHERE guild_id = ? AND (level > ? OR (level = ? AND xp > ?))
            "#,
        )
        .bind(guild_id as i64)
        .bind(level)
        .bind(level)
        .bind(xp)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.get::<i64, _>("ahead") as u64)
    }
}
