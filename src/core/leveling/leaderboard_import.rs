// One-off import of an external leaderboard (Mee6) into our level records.
//
// The importer only knows the `LeaderboardSource` port; the HTTP client lives in
// infra. Every entry overwrites the member's totals instead of adding to them.

use super::leveling_service::{LevelStore, LevelingError};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Pause between two writes so a large guild doesn't hammer the database.
pub const DEFAULT_IMPORT_DELAY: Duration = Duration::from_millis(25);

/// One row of an external leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedPlayer {
    pub user_id: u64,
    pub display_name: Option<String>,
    pub xp: u64,
    pub message_count: u64,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Leaderboard request failed: {0}")]
    Http(String),

    #[error("Leaderboard API answered with status {0}")]
    Status(u16),

    #[error("Could not decode leaderboard: {0}")]
    Decode(String),

    #[error(transparent)]
    Storage(#[from] LevelingError),
}

/// Where leaderboard snapshots come from.
#[async_trait]
pub trait LeaderboardSource: Send + Sync {
    /// Every ranked player of the guild. An empty list means the source has no data.
    async fn fetch_leaderboard(&self, guild_id: u64) -> Result<Vec<ImportedPlayer>, ImportError>;
}

/// What an import run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Players returned by the source.
    pub fetched: usize,
    pub written: usize,
    pub failed: usize,
    /// Records stored for the guild once the import finished.
    pub total_records: u64,
}

pub struct LeaderboardImporter<'a, S: LevelStore, L: LeaderboardSource + ?Sized> {
    store: &'a S,
    source: &'a L,
    delay: Duration,
}

impl<'a, S: LevelStore, L: LeaderboardSource + ?Sized> LeaderboardImporter<'a, S, L> {
    pub fn new(store: &'a S, source: &'a L) -> Self {
        Self {
            store,
            source,
            delay: DEFAULT_IMPORT_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fetch the guild's leaderboard and write every entry.
    ///
    /// Only a failed fetch aborts. A failed write is logged, counted and skipped.
    pub async fn run(&self, guild_id: u64) -> Result<ImportSummary, ImportError> {
        if guild_id == 0 {
            return Err(LevelingError::InvalidId.into());
        }

        let players = self.source.fetch_leaderboard(guild_id).await?;
        let mut summary = ImportSummary {
            fetched: players.len(),
            ..ImportSummary::default()
        };

        if players.is_empty() {
            tracing::info!(guild_id, "Leaderboard source has no data for guild");
            summary.total_records = self.store.count_records(guild_id).await?;
            return Ok(summary);
        }

        tracing::info!(guild_id, players = players.len(), "Importing leaderboard");

        for player in &players {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match self
                .store
                .set_record(
                    guild_id,
                    player.user_id,
                    player.xp,
                    player.message_count,
                    player.display_name.as_deref(),
                )
                .await
            {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        guild_id,
                        user_id = player.user_id,
                        "Failed to import leaderboard entry: {e}"
                    );
                }
            }
        }

        summary.total_records = self.store.count_records(guild_id).await?;
        tracing::info!(
            guild_id,
            written = summary.written,
            failed = summary.failed,
            total = summary.total_records,
            "Leaderboard import finished"
        );

        Ok(summary)
    }
}
