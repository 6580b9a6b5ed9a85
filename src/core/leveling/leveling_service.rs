// This is the leveling module - it contains ALL the business logic for the leveling system.
// Notice how this module has NO Discord-specific code (no serenity, no poise imports).
// It works with primitive types (u64, String) so the message handler, the import
// command and the tests all drive it the same way.

use super::level_curve::level_of;
use super::xp_cooldown::XpCooldown;
use async_trait::async_trait;
use rand::Rng;
use std::ops::RangeInclusive;
use std::time::Instant;
use thiserror::Error;

/// Every XP grant is a whole number picked uniformly from this range.
pub const XP_GRANT_RANGE: RangeInclusive<u64> = 15..=25;

// ============================================================================
// DOMAIN MODELS
// ============================================================================

/// A member's leveling progress in one guild.
///
/// Users can be in multiple Discord servers (guilds), and we track their
/// progress separately in each one.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelRecord {
    pub guild_id: u64,
    pub user_id: u64,
    /// Last name we saw for this member. Overwritten on every update.
    pub display_name: String,
    pub xp: u64,
    pub message_count: u64,
}

impl LevelRecord {
    pub fn level(&self) -> u32 {
        level_of(self.xp)
    }
}

/// A single atomic change to a [`LevelRecord`].
///
/// Both counters are increments; the name is set unconditionally. Stores must
/// apply the whole delta as one operation and create the record when missing,
/// using the increments as starting values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelDelta {
    pub xp: u64,
    pub messages: u64,
    pub display_name: String,
}

impl LevelDelta {
    /// Count a message without granting any XP.
    pub fn message_only(display_name: impl Into<String>) -> Self {
        Self {
            xp: 0,
            messages: 1,
            display_name: display_name.into(),
        }
    }

    /// Count a message and grant `xp` for it.
    pub fn with_xp(xp: u64, display_name: impl Into<String>) -> Self {
        Self {
            xp,
            messages: 1,
            display_name: display_name.into(),
        }
    }
}

/// One qualifying message from a member.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub guild_id: u64,
    pub user_id: u64,
    /// Where the level-up message goes.
    pub channel_id: u64,
    pub display_name: String,
    /// Whether the guild has the level system switched on.
    pub leveling_enabled: bool,
    pub at: Instant,
}

/// Returned when a grant pushed a member over a level boundary worth announcing.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUpEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub channel_id: u64,
    pub display_name: String,
    pub old_level: u32,
    pub new_level: u32,
    pub total_xp: u64,
}

/// What [`LevelingService::process_activity`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// Only the message counter went up.
    Counted,
    /// XP was granted without reaching an announced level.
    Granted { amount: u64, total_xp: u64 },
    /// XP was granted and the member reached a new level (announced).
    LeveledUp(LevelUpEvent),
    /// The store rejected the write. Already logged.
    StoreFailed,
    /// The event carried a zero guild or user ID and was dropped.
    Ignored,
}

/// When the cooldown window starts relative to the database write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CooldownPolicy {
    /// Start the window as soon as we decide to grant, even if the write fails.
    OnDecision,
    /// Only keep the window if the write went through.
    #[default]
    OnConfirmedWrite,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LevelingError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid user or guild ID")]
    InvalidId,
}

/// A level-up message couldn't be delivered.
#[derive(Debug, Error)]
#[error("Failed to deliver notification: {0}")]
pub struct NotifyError(pub String);

// ============================================================================
// PORTS
// ============================================================================
// The core defines WHAT it needs, but not HOW it's implemented.
// The infra layer provides the storage; the Discord layer provides the notifier.

/// Persistence for level records.
#[async_trait]
pub trait LevelStore: Send + Sync {
    /// Apply `delta` atomically and return the record as it is afterwards.
    /// Increments must happen inside the store, never read-modify-write.
    async fn apply_delta(
        &self,
        guild_id: u64,
        user_id: u64,
        delta: &LevelDelta,
    ) -> Result<LevelRecord, LevelingError>;

    async fn find_record(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<LevelRecord>, LevelingError>;

    /// Overwrite both counters, creating the record if needed. Used by imports.
    /// A `None` name keeps whatever name is already stored.
    async fn set_record(
        &self,
        guild_id: u64,
        user_id: u64,
        xp: u64,
        message_count: u64,
        display_name: Option<&str>,
    ) -> Result<(), LevelingError>;

    /// Records of a guild ordered by XP, highest first.
    async fn get_leaderboard(
        &self,
        guild_id: u64,
        limit: usize,
    ) -> Result<Vec<LevelRecord>, LevelingError>;

    async fn count_records(&self, guild_id: u64) -> Result<u64, LevelingError>;
}

/// Sends a text message to a channel. Fire-and-forget from the core's view.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel_id: u64, text: &str) -> Result<(), NotifyError>;
}

/// Text posted when someone levels up.
pub fn level_up_message(display_name: &str, level: u32) -> String {
    format!("GG **{display_name}**, you just reached level **{level}**! 🎉")
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// The main service for leveling operations.
///
/// Generic over the store so tests can swap in an in-memory or failing one.
/// The cooldown map is owned here; nothing else touches it.
pub struct LevelingService<S: LevelStore> {
    store: S,
    cooldown: XpCooldown,
    policy: CooldownPolicy,
}

impl<S: LevelStore> LevelingService<S> {
    pub fn new(store: S) -> Self {
        Self::with_cooldown(store, XpCooldown::default(), CooldownPolicy::default())
    }

    pub fn with_cooldown(store: S, cooldown: XpCooldown, policy: CooldownPolicy) -> Self {
        Self {
            store,
            cooldown,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cooldown(&self) -> &XpCooldown {
        &self.cooldown
    }

    fn validate_ids(user_id: u64, guild_id: u64) -> Result<(), LevelingError> {
        if user_id == 0 || guild_id == 0 {
            Err(LevelingError::InvalidId)
        } else {
            Ok(())
        }
    }

    /// Pick how much XP a grant is worth.
    pub fn roll_xp(&self) -> u64 {
        rand::thread_rng().gen_range(XP_GRANT_RANGE)
    }

    /// Handle one message: count it, maybe grant XP, maybe announce a level-up.
    ///
    /// Never fails. Storage and delivery problems are logged and the event is
    /// dropped, so the next message is processed normally.
    pub async fn process_activity<N>(&self, event: &ActivityEvent, notifier: &N) -> ActivityOutcome
    where
        N: Notifier + ?Sized,
    {
        if let Err(e) = Self::validate_ids(event.user_id, event.guild_id) {
            tracing::warn!(
                user_id = event.user_id,
                guild_id = event.guild_id,
                "Skipping activity: {e}"
            );
            return ActivityOutcome::Ignored;
        }

        let claim = if event.leveling_enabled {
            self.cooldown
                .try_claim(event.guild_id, event.user_id, event.at)
        } else {
            None
        };

        let Some(claim) = claim else {
            let delta = LevelDelta::message_only(event.display_name.as_str());
            return match self
                .store
                .apply_delta(event.guild_id, event.user_id, &delta)
                .await
            {
                Ok(_) => ActivityOutcome::Counted,
                Err(e) => {
                    tracing::error!(
                        guild_id = event.guild_id,
                        user_id = event.user_id,
                        "Failed to count message: {e}"
                    );
                    ActivityOutcome::StoreFailed
                }
            };
        };

        let amount = self.roll_xp();
        let delta = LevelDelta::with_xp(amount, event.display_name.as_str());
        let record = match self
            .store
            .apply_delta(event.guild_id, event.user_id, &delta)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    guild_id = event.guild_id,
                    user_id = event.user_id,
                    amount,
                    "Failed to grant XP: {e}"
                );
                if self.policy == CooldownPolicy::OnConfirmedWrite {
                    self.cooldown.release(claim);
                }
                return ActivityOutcome::StoreFailed;
            }
        };

        let old_level = level_of(record.xp.saturating_sub(amount));
        let new_level = level_of(record.xp);

        // Level 1 only takes a message or two, so it isn't worth a ping.
        if new_level <= 1 || new_level <= old_level {
            return ActivityOutcome::Granted {
                amount,
                total_xp: record.xp,
            };
        }

        let text = level_up_message(&event.display_name, new_level);
        if let Err(e) = notifier.notify(event.channel_id, &text).await {
            tracing::warn!(
                channel_id = event.channel_id,
                user_id = event.user_id,
                "Level-up message not delivered: {e}"
            );
        }

        ActivityOutcome::LeveledUp(LevelUpEvent {
            guild_id: event.guild_id,
            user_id: event.user_id,
            channel_id: event.channel_id,
            display_name: event.display_name.clone(),
            old_level,
            new_level,
            total_xp: record.xp,
        })
    }

    /// A member's record, if they ever sent a message here.
    pub async fn get_record(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<LevelRecord>, LevelingError> {
        Self::validate_ids(user_id, guild_id)?;
        self.store.find_record(guild_id, user_id).await
    }

    /// 1-based leaderboard position, looking at up to `scan_limit` records.
    pub async fn get_rank(
        &self,
        guild_id: u64,
        user_id: u64,
        scan_limit: usize,
    ) -> Result<Option<usize>, LevelingError> {
        Self::validate_ids(user_id, guild_id)?;
        let board = self.store.get_leaderboard(guild_id, scan_limit).await?;
        Ok(board
            .iter()
            .position(|record| record.user_id == user_id)
            .map(|index| index + 1))
    }

    pub async fn get_leaderboard(
        &self,
        guild_id: u64,
        limit: usize,
    ) -> Result<Vec<LevelRecord>, LevelingError> {
        if guild_id == 0 {
            return Err(LevelingError::InvalidId);
        }
        self.store.get_leaderboard(guild_id, limit).await
    }

    /// Forget cooldowns that already ran out. Returns how many were dropped.
    pub fn sweep_cooldowns(&self, now: Instant) -> usize {
        self.cooldown.sweep_expired(now)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::leveling::InMemoryLevelStore;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every notification instead of sending it.
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(u64, String)>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(u64, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, channel_id: u64, text: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push((channel_id, text.to_string()));
            Ok(())
        }
    }

    struct BrokenNotifier;

    #[async_trait]
    impl Notifier for BrokenNotifier {
        async fn notify(&self, _: u64, _: &str) -> Result<(), NotifyError> {
            Err(NotifyError("missing permissions".to_string()))
        }
    }

    /// A store whose writes always fail.
    struct FailingStore;

    #[async_trait]
    impl LevelStore for FailingStore {
        async fn apply_delta(
            &self,
            _: u64,
            _: u64,
            _: &LevelDelta,
        ) -> Result<LevelRecord, LevelingError> {
            Err(LevelingError::StorageError("disk full".to_string()))
        }

        async fn find_record(&self, _: u64, _: u64) -> Result<Option<LevelRecord>, LevelingError> {
            Ok(None)
        }

        async fn set_record(
            &self,
            _: u64,
            _: u64,
            _: u64,
            _: u64,
            _: Option<&str>,
        ) -> Result<(), LevelingError> {
            Err(LevelingError::StorageError("disk full".to_string()))
        }

        async fn get_leaderboard(&self, _: u64, _: usize) -> Result<Vec<LevelRecord>, LevelingError> {
            Ok(Vec::new())
        }

        async fn count_records(&self, _: u64) -> Result<u64, LevelingError> {
            Ok(0)
        }
    }

    const GUILD: u64 = 100;
    const USER: u64 = 7;
    const CHANNEL: u64 = 55;

    fn event(enabled: bool, at: Instant) -> ActivityEvent {
        ActivityEvent {
            guild_id: GUILD,
            user_id: USER,
            channel_id: CHANNEL,
            display_name: "ferris#0001".to_string(),
            leveling_enabled: enabled,
            at,
        }
    }

    fn make_service() -> LevelingService<InMemoryLevelStore> {
        LevelingService::new(InMemoryLevelStore::new())
    }

    async fn record(service: &LevelingService<InMemoryLevelStore>) -> LevelRecord {
        service.get_record(GUILD, USER).await.unwrap().unwrap()
    }

    #[test]
    fn rolled_xp_stays_in_range() {
        let service = make_service();
        for _ in 0..10_000 {
            let amount = service.roll_xp();
            assert!(XP_GRANT_RANGE.contains(&amount), "rolled {amount}");
        }
    }

    #[tokio::test]
    async fn disabled_level_system_only_counts_messages() {
        let service = make_service();
        let notifier = RecordingNotifier::default();
        let start = Instant::now();

        for i in 0..5 {
            let at = start + Duration::from_secs(60 * i);
            let outcome = service.process_activity(&event(false, at), &notifier).await;
            assert_eq!(outcome, ActivityOutcome::Counted);
        }

        let record = record(&service).await;
        assert_eq!(record.message_count, 5);
        assert_eq!(record.xp, 0);
        assert!(service.cooldown().is_empty());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn second_message_inside_cooldown_only_counts() {
        let service = make_service();
        let notifier = RecordingNotifier::default();
        let start = Instant::now();

        let first = service
            .process_activity(&event(true, start), &notifier)
            .await;
        let ActivityOutcome::Granted { amount, total_xp } = first else {
            panic!("expected a grant, got {first:?}");
        };
        assert_eq!(amount, total_xp);

        let second = service
            .process_activity(&event(true, start + Duration::from_millis(29_000)), &notifier)
            .await;
        assert_eq!(second, ActivityOutcome::Counted);

        let record = record(&service).await;
        assert_eq!(record.xp, amount);
        assert_eq!(record.message_count, 2);
    }

    #[tokio::test]
    async fn messages_outside_cooldown_both_grant() {
        let service = make_service();
        let notifier = RecordingNotifier::default();
        let start = Instant::now();

        service
            .process_activity(&event(true, start), &notifier)
            .await;
        service
            .process_activity(&event(true, start + Duration::from_secs(31)), &notifier)
            .await;

        let record = record(&service).await;
        assert_eq!(record.message_count, 2);
        assert!((30..=50).contains(&record.xp), "xp was {}", record.xp);
    }

    #[tokio::test]
    async fn display_name_is_refreshed() {
        let service = make_service();
        let notifier = RecordingNotifier::default();
        let start = Instant::now();

        service
            .process_activity(&event(true, start), &notifier)
            .await;
        let mut renamed = event(true, start + Duration::from_secs(1));
        renamed.display_name = "crab#0002".to_string();
        service.process_activity(&renamed, &notifier).await;

        assert_eq!(record(&service).await.display_name, "crab#0002");
    }

    #[tokio::test]
    async fn crossing_into_level_two_is_announced_once() {
        let service = make_service();
        let notifier = RecordingNotifier::default();
        // 93 XP is level 1; any grant from 15 to 25 lands on level 2.
        service
            .store()
            .set_record(GUILD, USER, 93, 10, Some("ferris#0001"))
            .await
            .unwrap();

        let start = Instant::now();
        let outcome = service
            .process_activity(&event(true, start), &notifier)
            .await;

        let ActivityOutcome::LeveledUp(level_up) = outcome else {
            panic!("expected a level-up, got {outcome:?}");
        };
        assert_eq!(level_up.old_level, 1);
        assert_eq!(level_up.new_level, 2);
        assert_eq!(level_up.channel_id, CHANNEL);

        // More XP on the same level doesn't announce again.
        service
            .process_activity(&event(true, start + Duration::from_secs(31)), &notifier)
            .await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, CHANNEL);
        assert!(sent[0].1.contains("ferris#0001"));
        assert!(sent[0].1.contains('2'));
    }

    #[tokio::test]
    async fn reaching_level_one_is_never_announced() {
        let service = make_service();
        let notifier = RecordingNotifier::default();
        // 6 XP is level 0; any grant lands on level 1.
        service
            .store()
            .set_record(GUILD, USER, 6, 1, None)
            .await
            .unwrap();

        let outcome = service
            .process_activity(&event(true, Instant::now()), &notifier)
            .await;

        assert!(matches!(outcome, ActivityOutcome::Granted { .. }));
        assert_eq!(record(&service).await.level(), 1);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_notification_is_swallowed() {
        let service = make_service();
        service
            .store()
            .set_record(GUILD, USER, 93, 10, None)
            .await
            .unwrap();

        let outcome = service
            .process_activity(&event(true, Instant::now()), &BrokenNotifier)
            .await;

        assert!(matches!(outcome, ActivityOutcome::LeveledUp(_)));
    }

    #[tokio::test]
    async fn failed_write_releases_cooldown_by_default() {
        let service = LevelingService::new(FailingStore);
        let notifier = RecordingNotifier::default();
        let now = Instant::now();

        let outcome = service.process_activity(&event(true, now), &notifier).await;

        assert_eq!(outcome, ActivityOutcome::StoreFailed);
        assert!(service.cooldown().should_grant_xp(GUILD, USER, now));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_write_keeps_cooldown_when_started_on_decision() {
        let service = LevelingService::with_cooldown(
            FailingStore,
            XpCooldown::default(),
            CooldownPolicy::OnDecision,
        );
        let notifier = RecordingNotifier::default();
        let now = Instant::now();

        let outcome = service.process_activity(&event(true, now), &notifier).await;

        assert_eq!(outcome, ActivityOutcome::StoreFailed);
        assert!(!service.cooldown().should_grant_xp(GUILD, USER, now));
    }

    #[tokio::test]
    async fn zero_ids_are_rejected() {
        let service = make_service();
        let mut bad = event(true, Instant::now());
        bad.user_id = 0;

        let outcome = service
            .process_activity(&bad, &RecordingNotifier::default())
            .await;

        assert_eq!(outcome, ActivityOutcome::Ignored);
        assert!(matches!(
            service.get_record(GUILD, 0).await,
            Err(LevelingError::InvalidId)
        ));
    }

    #[tokio::test]
    async fn rank_follows_xp_order() {
        let service = make_service();
        service.store().set_record(GUILD, 1, 500, 1, None).await.unwrap();
        service.store().set_record(GUILD, 2, 900, 1, None).await.unwrap();
        service.store().set_record(GUILD, 3, 100, 1, None).await.unwrap();

        assert_eq!(service.get_rank(GUILD, 2, 100).await.unwrap(), Some(1));
        assert_eq!(service.get_rank(GUILD, 3, 100).await.unwrap(), Some(3));
        assert_eq!(service.get_rank(GUILD, 4, 100).await.unwrap(), None);
    }

    #[test]
    fn leveling_error_messages_are_descriptive() {
        let storage_error = LevelingError::StorageError("db down".into());
        assert!(storage_error.to_string().contains("db down"));

        let invalid_id = LevelingError::InvalidId;
        assert_eq!(invalid_id.to_string(), "Invalid user or guild ID");
    }
}
