use crate::core::custom_commands::{CustomCommand, CustomCommandError, CustomCommandStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, QueryBuilder, Row, Sqlite};

pub struct SqliteCustomCommandStore {
    pool: Pool<Sqlite>,
}

impl SqliteCustomCommandStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn storage_error(e: impl std::fmt::Display) -> CustomCommandError {
    CustomCommandError::StorageError(e.to_string())
}

fn ids_from_row(row: &SqliteRow, column: &str) -> Result<Vec<u64>, CustomCommandError> {
    let raw: String = row.get(column);
    serde_json::from_str(&raw).map_err(storage_error)
}

fn command_from_row(row: &SqliteRow) -> Result<CustomCommand, CustomCommandError> {
    Ok(CustomCommand {
        name: row.get("name"),
        guild_id: row.get::<i64, _>("guild_id") as u64,
        response: row.get("response"),
        is_python: row.get("is_python"),
        required_permissions: row.get::<i64, _>("required_permissions") as u64,
        toggled_users: ids_from_row(row, "toggled_users")?,
        toggled_roles: ids_from_row(row, "toggled_roles")?,
        toggled_channels: ids_from_row(row, "toggled_channels")?,
        is_whitelist_toggle: row.get("is_whitelist_toggle"),
        created_at: DateTime::<Utc>::from_timestamp(row.get::<i64, _>("created_at"), 0)
            .unwrap_or_default(),
    })
}

#[async_trait]
impl CustomCommandStore for SqliteCustomCommandStore {
    async fn insert(&self, command: &CustomCommand) -> Result<bool, CustomCommandError> {
        let result = sqlx::query(
            r#"
            INSERT INTO custom_commands (
                guild_id, name, response, is_python, required_permissions,
                toggled_users, toggled_roles, toggled_channels, is_whitelist_toggle, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guild_id, name) DO NOTHING
            "#,
        )
        .bind(command.guild_id as i64)
        .bind(&command.name)
        .bind(&command.response)
        .bind(command.is_python)
        .bind(command.required_permissions as i64)
        .bind(serde_json::to_string(&command.toggled_users).map_err(storage_error)?)
        .bind(serde_json::to_string(&command.toggled_roles).map_err(storage_error)?)
        .bind(serde_json::to_string(&command.toggled_channels).map_err(storage_error)?)
        .bind(command.is_whitelist_toggle)
        .bind(command.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, guild_id: u64) -> Result<Vec<CustomCommand>, CustomCommandError> {
        let rows = sqlx::query("SELECT * FROM custom_commands WHERE guild_id = ? ORDER BY name")
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter().map(command_from_row).collect()
    }

    async fn update_response(
        &self,
        guild_id: u64,
        name: &str,
        response: &str,
    ) -> Result<bool, CustomCommandError> {
        let result =
            sqlx::query("UPDATE custom_commands SET response = ? WHERE guild_id = ? AND name = ?")
                .bind(response)
                .bind(guild_id as i64)
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, guild_id: u64, names: &[String]) -> Result<u64, CustomCommandError> {
        if names.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM custom_commands WHERE guild_id = ");
        builder.push_bind(guild_id as i64);
        builder.push(" AND name IN (");
        let mut separated = builder.separated(", ");
        for name in names {
            separated.push_bind(name);
        }
        separated.push_unseparated(")");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::database::Database;

    fn command(guild_id: u64, name: &str) -> CustomCommand {
        CustomCommand {
            name: name.to_string(),
            guild_id,
            response: "hi {user}".into(),
            is_python: false,
            required_permissions: 1 << 5,
            toggled_users: vec![1, 2],
            toggled_roles: vec![],
            toggled_channels: vec![3],
            is_whitelist_toggle: true,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn insert_list_update_delete() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteCustomCommandStore::new(db.pool());

        assert!(store.insert(&command(1, "b")).await.unwrap());
        assert!(store.insert(&command(1, "a")).await.unwrap());
        assert!(!store.insert(&command(1, "a")).await.unwrap());
        assert!(store.insert(&command(2, "a")).await.unwrap());

        let listed = store.list(1).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], command(1, "a"));

        assert!(store.update_response(1, "a", "changed").await.unwrap());
        assert!(!store.update_response(1, "zzz", "changed").await.unwrap());

        let deleted = store
            .delete_many(1, &["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.list(2).await.unwrap().len(), 1);
    }
}
