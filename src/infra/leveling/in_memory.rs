// This file provides an IN-MEMORY implementation of LevelStore.
//
// Handy for tests and for running the bot without a database file. It follows
// the same contract as the SQLite store: deltas are applied under the entry
// lock, so concurrent messages from one member never lose an increment.

use crate::core::leveling::{LevelDelta, LevelRecord, LevelStore, LevelingError};
use async_trait::async_trait;
use dashmap::DashMap;

/// A composite key for looking up a record.
/// We need both guild_id AND user_id since users can be in multiple guilds.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct GuildUserKey {
    guild_id: u64,
    user_id: u64,
}

#[allow(dead_code)]
/// In-memory implementation of LevelStore.
///
/// **DashMap:**
/// A concurrent HashMap that's safe to use across multiple async tasks.
/// `entry()` locks the shard for the duration of the update.
pub struct InMemoryLevelStore {
    data: DashMap<GuildUserKey, LevelRecord>,
}

#[allow(dead_code)]
impl InMemoryLevelStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }
}

impl Default for InMemoryLevelStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LevelStore for InMemoryLevelStore {
    async fn apply_delta(
        &self,
        guild_id: u64,
        user_id: u64,
        delta: &LevelDelta,
    ) -> Result<LevelRecord, LevelingError> {
        let key = GuildUserKey { guild_id, user_id };

        let record = self
            .data
            .entry(key)
            .and_modify(|record| {
                record.xp = record.xp.saturating_add(delta.xp);
                record.message_count = record.message_count.saturating_add(delta.messages);
                record.display_name = delta.display_name.clone();
            })
            .or_insert_with(|| LevelRecord {
                guild_id,
                user_id,
                display_name: delta.display_name.clone(),
                xp: delta.xp,
                message_count: delta.messages,
            });

        Ok(record.value().clone())
    }

    async fn find_record(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<LevelRecord>, LevelingError> {
        let key = GuildUserKey { guild_id, user_id };
        Ok(self.data.get(&key).map(|entry| entry.value().clone()))
    }

    async fn set_record(
        &self,
        guild_id: u64,
        user_id: u64,
        xp: u64,
        message_count: u64,
        display_name: Option<&str>,
    ) -> Result<(), LevelingError> {
        let key = GuildUserKey { guild_id, user_id };

        self.data
            .entry(key)
            .and_modify(|record| {
                record.xp = xp;
                record.message_count = message_count;
                if let Some(name) = display_name {
                    record.display_name = name.to_string();
                }
            })
            .or_insert_with(|| LevelRecord {
                guild_id,
                user_id,
                display_name: display_name.unwrap_or_default().to_string(),
                xp,
                message_count,
            });

        Ok(())
    }

    async fn get_leaderboard(
        &self,
        guild_id: u64,
        limit: usize,
    ) -> Result<Vec<LevelRecord>, LevelingError> {
        if limit == 0 {
            return Err(LevelingError::StorageError(
                "Leaderboard limit must be at least 1".to_string(),
            ));
        }

        let mut records: Vec<LevelRecord> = self
            .data
            .iter()
            .filter(|entry| entry.key().guild_id == guild_id)
            .map(|entry| entry.value().clone())
            .collect();

        // Highest XP first; ties keep a stable order by user ID.
        records.sort_by(|a, b| b.xp.cmp(&a.xp).then(a.user_id.cmp(&b.user_id)));
        records.truncate(limit);

        Ok(records)
    }

    async fn count_records(&self, guild_id: u64) -> Result<u64, LevelingError> {
        Ok(self
            .data
            .iter()
            .filter(|entry| entry.key().guild_id == guild_id)
            .count() as u64)
    }
}
