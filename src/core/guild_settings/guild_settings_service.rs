// Per-guild settings. For now that's just whether the level system is on.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSettings {
    pub guild_id: u64,
    pub level_system: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Store error: {0}")]
    Store(String),
    #[error("Invalid guild ID")]
    InvalidId,
}

#[async_trait]
pub trait GuildSettingsStore: Send + Sync {
    async fn get_settings(&self, guild_id: u64) -> Result<Option<GuildSettings>, SettingsError>;
    async fn save_settings(&self, settings: GuildSettings) -> Result<(), SettingsError>;
}

pub struct GuildSettingsService<S: GuildSettingsStore> {
    store: S,
    /// Used for guilds that never changed the setting.
    level_system_default: bool,
}

impl<S: GuildSettingsStore> GuildSettingsService<S> {
    pub fn new(store: S, level_system_default: bool) -> Self {
        Self {
            store,
            level_system_default,
        }
    }

    /// Whether messages in this guild earn XP.
    ///
    /// Falls back to the default when the store can't be read, so a broken
    /// settings database only stops XP, never message counting.
    pub async fn level_system_enabled(&self, guild_id: u64) -> bool {
        match self.store.get_settings(guild_id).await {
            Ok(Some(settings)) => settings.level_system,
            Ok(None) => self.level_system_default,
            Err(e) => {
                tracing::error!(guild_id, "Failed to read guild settings: {e}");
                self.level_system_default
            }
        }
    }

    pub async fn set_level_system(&self, guild_id: u64, enabled: bool) -> Result<(), SettingsError> {
        if guild_id == 0 {
            return Err(SettingsError::InvalidId);
        }

        self.store
            .save_settings(GuildSettings {
                guild_id,
                level_system: enabled,
            })
            .await?;
        tracing::info!(guild_id, enabled, "Level system toggled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct MapStore {
        settings: RwLock<HashMap<u64, GuildSettings>>,
    }

    #[async_trait]
    impl GuildSettingsStore for MapStore {
        async fn get_settings(&self, guild_id: u64) -> Result<Option<GuildSettings>, SettingsError> {
            Ok(self.settings.read().await.get(&guild_id).cloned())
        }

        async fn save_settings(&self, settings: GuildSettings) -> Result<(), SettingsError> {
            self.settings
                .write()
                .await
                .insert(settings.guild_id, settings);
            Ok(())
        }
    }

    struct UnreadableStore;

    #[async_trait]
    impl GuildSettingsStore for UnreadableStore {
        async fn get_settings(&self, _: u64) -> Result<Option<GuildSettings>, SettingsError> {
            Err(SettingsError::Store("corrupt".to_string()))
        }

        async fn save_settings(&self, _: GuildSettings) -> Result<(), SettingsError> {
            Err(SettingsError::Store("corrupt".to_string()))
        }
    }

    #[tokio::test]
    async fn unknown_guild_uses_default() {
        let service = GuildSettingsService::new(MapStore::default(), true);
        assert!(service.level_system_enabled(42).await);

        let service = GuildSettingsService::new(MapStore::default(), false);
        assert!(!service.level_system_enabled(42).await);
    }

    #[tokio::test]
    async fn saved_setting_wins_over_default() {
        let service = GuildSettingsService::new(MapStore::default(), false);
        service.set_level_system(42, true).await.unwrap();

        assert!(service.level_system_enabled(42).await);
        assert!(!service.level_system_enabled(43).await);
    }

    #[tokio::test]
    async fn read_errors_fall_back_to_default() {
        let service = GuildSettingsService::new(UnreadableStore, true);
        assert!(service.level_system_enabled(42).await);
        assert!(service.set_level_system(42, false).await.is_err());
    }

    #[tokio::test]
    async fn zero_guild_is_rejected() {
        let service = GuildSettingsService::new(MapStore::default(), false);
        assert!(matches!(
            service.set_level_system(0, true).await,
            Err(SettingsError::InvalidId)
        ));
    }
}
