use crate::core::leveling::{LevelDelta, LevelRecord, LevelStore, LevelingError};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

/// Level records in an embedded SQLite database.
///
/// Counters are incremented by SQLite inside a single upsert statement, so
/// concurrent messages never race on a read-modify-write.
pub struct SqliteLevelStore {
    pool: Pool<Sqlite>,
}

impl SqliteLevelStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let in_memory = database_url.contains(":memory:");

        // Ensure the file exists if it's a file path
        let path_str = database_url.trim_start_matches("sqlite://");
        if !in_memory && !Path::new(path_str).exists() {
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

        // Every connection to :memory: opens its own empty database.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&conn_str)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS level_records (
                guild_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                display_name TEXT NOT NULL DEFAULT '',
                xp INTEGER NOT NULL DEFAULT 0,
                message_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (guild_id, user_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_level_records_guild_xp
            ON level_records(guild_id, xp DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn storage_error(e: sqlx::Error) -> LevelingError {
    LevelingError::StorageError(e.to_string())
}

fn row_to_record(row: &SqliteRow) -> LevelRecord {
    LevelRecord {
        guild_id: row.get::<i64, _>("guild_id") as u64,
        user_id: row.get::<i64, _>("user_id") as u64,
        display_name: row.get("display_name"),
        xp: row.get::<i64, _>("xp") as u64,
        message_count: row.get::<i64, _>("message_count") as u64,
    }
}

#[async_trait]
impl LevelStore for SqliteLevelStore {
    async fn apply_delta(
        &self,
        guild_id: u64,
        user_id: u64,
        delta: &LevelDelta,
    ) -> Result<LevelRecord, LevelingError> {
        let row = sqlx::query(
            r#"
            INSERT INTO level_records (guild_id, user_id, display_name, xp, message_count)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(guild_id, user_id) DO UPDATE SET
                display_name = excluded.display_name,
                xp = xp + excluded.xp,
                message_count = message_count + excluded.message_count
            RETURNING guild_id, user_id, display_name, xp, message_count
            "#,
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .bind(&delta.display_name)
        .bind(delta.xp as i64)
        .bind(delta.messages as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row_to_record(&row))
    }

    async fn find_record(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<LevelRecord>, LevelingError> {
        let row = sqlx::query(
            r#"
            SELECT guild_id, user_id, display_name, xp, message_count
            FROM level_records
            WHERE guild_id = ? AND user_id = ?
            "#,
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.as_ref().map(row_to_record))
    }

    async fn set_record(
        &self,
        guild_id: u64,
        user_id: u64,
        xp: u64,
        message_count: u64,
        display_name: Option<&str>,
    ) -> Result<(), LevelingError> {
        sqlx::query(
            r#"
            INSERT INTO level_records (guild_id, user_id, display_name, xp, message_count)
            VALUES (?, ?, COALESCE(?, ''), ?, ?)
            ON CONFLICT(guild_id, user_id) DO UPDATE SET
                display_name = COALESCE(?, display_name),
                xp = excluded.xp,
                message_count = excluded.message_count
            "#,
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .bind(display_name)
        .bind(xp as i64)
        .bind(message_count as i64)
        .bind(display_name)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn get_leaderboard(
        &self,
        guild_id: u64,
        limit: usize,
    ) -> Result<Vec<LevelRecord>, LevelingError> {
        let rows = sqlx::query(
            r#"
            SELECT guild_id, user_id, display_name, xp, message_count
            FROM level_records
            WHERE guild_id = ?
            ORDER BY xp DESC, user_id ASC
            LIMIT ?
            "#,
        )
        .bind(guild_id as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn count_records(&self, guild_id: u64) -> Result<u64, LevelingError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM level_records WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn memory_store() -> SqliteLevelStore {
        SqliteLevelStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn apply_delta_upserts_and_returns_new_totals() {
        let store = memory_store().await;

        let first = store
            .apply_delta(1, 2, &LevelDelta::with_xp(18, "ferris#0001"))
            .await
            .unwrap();
        assert_eq!(first.xp, 18);
        assert_eq!(first.message_count, 1);

        let second = store
            .apply_delta(1, 2, &LevelDelta::message_only("ferris#0002"))
            .await
            .unwrap();
        assert_eq!(second.xp, 18);
        assert_eq!(second.message_count, 2);
        assert_eq!(second.display_name, "ferris#0002");

        let third = store
            .apply_delta(1, 2, &LevelDelta::with_xp(25, "ferris#0002"))
            .await
            .unwrap();
        assert_eq!(third.xp, 43);
        assert_eq!(third.message_count, 3);
    }

    #[tokio::test]
    async fn set_record_overwrites_totals() {
        let store = memory_store().await;
        store
            .apply_delta(1, 2, &LevelDelta::with_xp(20, "named"))
            .await
            .unwrap();

        store.set_record(1, 2, 5_000, 300, None).await.unwrap();
        let record = store.find_record(1, 2).await.unwrap().unwrap();
        assert_eq!(record.xp, 5_000);
        assert_eq!(record.message_count, 300);
        assert_eq!(record.display_name, "named");

        store.set_record(1, 3, 10, 1, Some("fresh")).await.unwrap();
        let record = store.find_record(1, 3).await.unwrap().unwrap();
        assert_eq!(record.display_name, "fresh");
    }

    #[tokio::test]
    async fn leaderboard_is_sorted_and_scoped_to_guild() {
        let store = memory_store().await;
        store.set_record(100, 1, 500, 1, None).await.unwrap();
        store.set_record(100, 2, 300, 1, None).await.unwrap();
        store.set_record(100, 3, 700, 1, None).await.unwrap();
        store.set_record(200, 4, 900, 1, None).await.unwrap();

        let board = store.get_leaderboard(100, 10).await.unwrap();
        let ids: Vec<u64> = board.iter().map(|r| r.user_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(store.count_records(100).await.unwrap(), 3);
        assert_eq!(store.count_records(300).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn records_survive_reopening_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("levels.db");
        let path = path.to_str().unwrap();

        let store = SqliteLevelStore::new(path).await.unwrap();
        store
            .apply_delta(7, 8, &LevelDelta::with_xp(21, "persisted"))
            .await
            .unwrap();
        drop(store);

        let reopened = SqliteLevelStore::new(path).await.unwrap();
        let record = reopened.find_record(7, 8).await.unwrap().unwrap();
        assert_eq!(record.xp, 21);
        assert_eq!(record.display_name, "persisted");
    }
}
