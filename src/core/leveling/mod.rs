// Leveling module - XP curve, cooldowns, the XP ledger and leaderboard imports.

pub mod leaderboard_import;
pub mod level_curve;
mod leveling_service;
pub mod xp_cooldown;

pub use leaderboard_import::{
    ImportError, ImportSummary, ImportedPlayer, LeaderboardImporter, LeaderboardSource,
};
pub use leveling_service::{
    ActivityEvent, ActivityOutcome, CooldownPolicy, LevelDelta, LevelRecord, LevelStore,
    LevelingError, LevelingService, Notifier, NotifyError,
};
pub use xp_cooldown::XpCooldown;
