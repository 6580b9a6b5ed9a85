// SQLite implementation of the GuildSettingsStore trait

use crate::core::guild_settings::{GuildSettings, GuildSettingsStore, SettingsError};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

pub struct SqliteGuildSettingsStore {
    pool: SqlitePool,
}

impl SqliteGuildSettingsStore {
    /// Open (or create) the settings database at `database_path`.
    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        let connection_string = if database_path.starts_with("sqlite:") {
            database_path.to_string()
        } else {
            format!("sqlite://{}?mode=rwc", database_path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&connection_string)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guild_settings (
                guild_id INTEGER PRIMARY KEY,
                level_system BOOLEAN NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl GuildSettingsStore for SqliteGuildSettingsStore {
    async fn get_settings(&self, guild_id: u64) -> Result<Option<GuildSettings>, SettingsError> {
        let row = sqlx::query("SELECT guild_id, level_system FROM guild_settings WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SettingsError::Store(e.to_string()))?;

        Ok(row.map(|row| GuildSettings {
            guild_id: row.get::<i64, _>("guild_id") as u64,
            level_system: row.get("level_system"),
        }))
    }

    async fn save_settings(&self, settings: GuildSettings) -> Result<(), SettingsError> {
        sqlx::query(
            r#"
            INSERT INTO guild_settings (guild_id, level_system)
            VALUES (?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                level_system = excluded.level_system
            "#,
        )
        .bind(settings.guild_id as i64)
        .bind(settings.level_system)
        .execute(&self.pool)
        .await
        .map_err(|e| SettingsError::Store(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settings_roundtrip_and_overwrite() {
        let store = SqliteGuildSettingsStore::new("sqlite::memory:")
            .await
            .unwrap();

        assert!(store.get_settings(5).await.unwrap().is_none());

        store
            .save_settings(GuildSettings {
                guild_id: 5,
                level_system: true,
            })
            .await
            .unwrap();
        store
            .save_settings(GuildSettings {
                guild_id: 5,
                level_system: false,
            })
            .await
            .unwrap();

        let settings = store.get_settings(5).await.unwrap().unwrap();
        assert_eq!(
            settings,
            GuildSettings {
                guild_id: 5,
                level_system: false,
            }
        );
    }
}
