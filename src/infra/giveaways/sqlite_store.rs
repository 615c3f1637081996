use crate::core::giveaways::{Giveaway, GiveawayError, GiveawayStore};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeSet;

pub struct SqliteGiveawayStore {
    pool: Pool<Sqlite>,
}

impl SqliteGiveawayStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn storage_error(e: impl std::fmt::Display) -> GiveawayError {
    GiveawayError::StorageError(e.to_string())
}

fn giveaway_from_row(row: &SqliteRow) -> Result<Giveaway, GiveawayError> {
    let roles: String = row.get("roles_requirement");
    let roles_requirement: BTreeSet<u64> = serde_json::from_str(&roles).map_err(storage_error)?;

    Ok(Giveaway {
        guild_id: row.get::<i64, _>("guild_id") as u64,
        channel_id: row.get::<i64, _>("channel_id") as u64,
        message_id: row.get::<i64, _>("message_id") as u64,
        timer_id: row.get("timer_id"),
        level_requirement: row.get("level_requirement"),
        roles_requirement,
        prize: row.get("prize"),
        winners: row.get::<i64, _>("winners") as u32,
    })
}

#[async_trait]
impl GiveawayStore for SqliteGiveawayStore {
    async fn insert(&self, giveaway: &Giveaway) -> Result<(), GiveawayError> {
        sqlx::query(
            r#"
            INSERT INTO giveaways (
                timer_id, guild_id, channel_id, message_id,
                level_requirement, roles_requirement, prize, winners
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(giveaway.timer_id)
        .bind(giveaway.guild_id as i64)
        .bind(giveaway.channel_id as i64)
        .bind(giveaway.message_id as i64)
        .bind(giveaway.level_requirement)
        .bind(serde_json::to_string(&giveaway.roles_requirement).map_err(storage_error)?)
        .bind(&giveaway.prize)
        .bind(giveaway.winners as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Giveaway>, GiveawayError> {
        let rows = sqlx::query("SELECT * FROM giveaways")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter().map(giveaway_from_row).collect()
    }

    async fn delete(&self, giveaway_id: i64) -> Result<bool, GiveawayError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query("DELETE FROM giveaway_entrants WHERE giveaway_id = ?")
            .bind(giveaway_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        let result = sqlx::query("DELETE FROM giveaways WHERE timer_id = ?")
            .bind(giveaway_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_entrant(&self, giveaway_id: i64, user_id: u64) -> Result<u64, GiveawayError> {
        sqlx::query(
            "INSERT INTO giveaway_entrants (giveaway_id, user_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(giveaway_id)
        .bind(user_id as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        let row = sqlx::query("SELECT COUNT(*) AS entrants FROM giveaway_entrants WHERE giveaway_id = ?")
            .bind(giveaway_id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.get::<i64, _>("entrants") as u64)
    }

    async fn remove_entrant(&self, giveaway_id: i64, user_id: u64) -> Result<bool, GiveawayError> {
        let result = sqlx::query("DELETE FROM giveaway_entrants WHERE giveaway_id = ? AND user_id = ?")
            .bind(giveaway_id)
            .bind(user_id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn entrants(&self, giveaway_id: i64) -> Result<Vec<u64>, GiveawayError> {
        let rows = sqlx::query("SELECT user_id FROM giveaway_entrants WHERE giveaway_id = ?")
            .bind(giveaway_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(rows
            .iter()
            .map(|row| row.get::<i64, _>("user_id") as u64)
            .collect())
    }

    async fn purge_temporary(&self) -> Result<u64, GiveawayError> {
        let result = sqlx::query("DELETE FROM giveaways WHERE timer_id < 0")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        sqlx::query("DELETE FROM giveaway_entrants WHERE giveaway_id < 0")
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

    fn giveaway(timer_id: i64) -> Giveaway {
        Giveaway {
            guild_id: 1,
            channel_id: 2,
            message_id: 3 + timer_id.unsigned_abs(),
            timer_id,
            level_requirement: 4,
            roles_requirement: BTreeSet::from([10, 11]),
            prize: "A cake".into(),
            winners: 2,
        }
    }

    #[tokio::test]
    async fn entrants_are_unique_and_removed_with_the_giveaway() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteGiveawayStore::new(db.pool());
        store.insert(&giveaway(5)).await.unwrap();

        assert_eq!(store.add_entrant(5, 100).await.unwrap(), 1);
        assert_eq!(store.add_entrant(5, 100).await.unwrap(), 1);
        assert_eq!(store.add_entrant(5, 101).await.unwrap(), 2);
        assert!(store.remove_entrant(5, 101).await.unwrap());
        assert_eq!(store.entrants(5).await.unwrap(), vec![100]);

        assert_eq!(store.list_all().await.unwrap(), vec![giveaway(5)]);
        assert!(store.delete(5).await.unwrap());
        assert!(store.entrants(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn temporary_giveaways_are_purged() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteGiveawayStore::new(db.pool());
        store.insert(&giveaway(-1)).await.unwrap();
        store.insert(&giveaway(7)).await.unwrap();
        store.add_entrant(-1, 100).await.unwrap();

        assert_eq!(store.purge_temporary().await.unwrap(), 1);
        assert!(store.entrants(-1).await.unwrap().is_empty());
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }
}
