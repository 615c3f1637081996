// Shared SQLite pool plus the schema every store relies on.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

/// Ordered schema changes. Each entry runs once and is recorded in
/// `schema_migrations`. Never edit an applied entry, append a new one.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_guilds",
        r#"
        CREATE TABLE IF NOT EXISTS guilds (
            guild_id INTEGER PRIMARY KEY,
            prefixes TEXT NOT NULL DEFAULT '[]',
            giveaway_role_id INTEGER
        )
        "#,
    ),
    (
        "0002_custom_commands",
        r#"
        CREATE TABLE IF NOT EXISTS custom_commands (
            guild_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            response TEXT NOT NULL,
            is_python BOOLEAN NOT NULL DEFAULT 0,
            required_permissions INTEGER NOT NULL DEFAULT 0,
            toggled_users TEXT NOT NULL DEFAULT '[]',
            toggled_roles TEXT NOT NULL DEFAULT '[]',
            toggled_channels TEXT NOT NULL DEFAULT '[]',
            is_whitelist_toggle BOOLEAN NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (guild_id, name)
        )
        "#,
    ),
    (
        "0003_timers",
        r#"
        CREATE TABLE IF NOT EXISTS timers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    ),
    (
        "0004_timers_expiry_index",
        "CREATE INDEX IF NOT EXISTS timers_expires_at ON timers (expires_at)",
    ),
    (
        "0005_giveaways",
        r#"
        CREATE TABLE IF NOT EXISTS giveaways (
            timer_id INTEGER PRIMARY KEY,
            guild_id INTEGER NOT NULL,
            channel_id INTEGER NOT NULL,
            message_id INTEGER NOT NULL,
            level_requirement INTEGER NOT NULL DEFAULT 0,
            roles_requirement TEXT NOT NULL DEFAULT '[]',
            prize TEXT NOT NULL,
            winners INTEGER NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "0006_giveaway_entrants",
        r#"
        CREATE TABLE IF NOT EXISTS giveaway_entrants (
            giveaway_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            PRIMARY KEY (giveaway_id, user_id)
        )
        "#,
    ),
    (
        "0007_level_config",
        r#"
        CREATE TABLE IF NOT EXISTS level_config (
            guild_id INTEGER PRIMARY KEY,
            module_enabled BOOLEAN NOT NULL DEFAULT 0,
            role_stack BOOLEAN NOT NULL DEFAULT 1,
            base INTEGER NOT NULL,
            factor REAL NOT NULL,
            min_gain INTEGER NOT NULL,
            max_gain INTEGER NOT NULL,
            cooldown_rate INTEGER NOT NULL,
            cooldown_per REAL NOT NULL,
            level_up_message TEXT,
            special_level_up_messages TEXT NOT NULL DEFAULT '{}',
            level_up_channel INTEGER NOT NULL DEFAULT 1,
            blacklisted_roles TEXT NOT NULL DEFAULT '[]',
            blacklisted_channels TEXT NOT NULL DEFAULT '[]',
            blacklisted_users TEXT NOT NULL DEFAULT '[]',
            level_roles TEXT NOT NULL DEFAULT '{}',
            multiplier_roles TEXT NOT NULL DEFAULT '{}',
            multiplier_channels TEXT NOT NULL DEFAULT '{}',
            reset_on_leave BOOLEAN NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "0008_levels",
        r#"
        CREATE TABLE IF NOT EXISTS levels (
            guild_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            level INTEGER NOT NULL DEFAULT 0,
            xp INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (guild_id, user_id)
        )
        "#,
    ),
    (
        "0009_invite_tracking",
        r#"
        CREATE TABLE IF NOT EXISTS invite_tracking (
            guild_id INTEGER PRIMARY KEY,
            channel_id INTEGER NOT NULL
        )
        "#,
    ),
];

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let options = if database_url.contains(":memory:") {
            // Every connection to ":memory:" is its own database, so keep exactly one alive.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options.connect(&conn_str).await?;

        let database = Self { pool };
        database.migrate().await?;
        Ok(database)
    }

    /// A throwaway in-memory database with the full schema.
    pub async fn in_memory() -> anyhow::Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let applied: Vec<String> = sqlx::query("SELECT name FROM schema_migrations")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        for (name, sql) in MIGRATIONS {
            if applied.iter().any(|a| a.as_str() == *name) {
                continue;
            }

            let mut tx = self.pool.begin().await?;
            sqlx::query(sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_migrations (name, applied_at) VALUES (?, ?)")
                .bind(*name)
                .bind(chrono::Utc::now().timestamp())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!("Applied migration {}", name);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_run_once() {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM schema_migrations")
            .fetch_one(&db.pool)
            .await
            .unwrap()
            .get("n");
        assert_eq!(count as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn file_databases_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lambda.db");
        let url = format!("sqlite://{}", path.display());

        Database::connect(&url).await.unwrap();
        assert!(path.exists());
    }
}
