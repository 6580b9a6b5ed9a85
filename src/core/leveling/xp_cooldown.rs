// XP cooldown tracking.
//
// Remembers when each member last received XP in each guild so they can only
// earn XP once per window. Lives in process memory; a restart simply starts
// fresh windows for everyone.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// How long a member has to wait between two XP grants.
pub const XP_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct CooldownKey {
    guild_id: u64,
    user_id: u64,
}

/// A successful cooldown claim. Hand it back to [`XpCooldown::release`] to
/// undo the claim.
#[derive(Debug, Clone, Copy)]
pub struct CooldownClaim {
    key: CooldownKey,
    claimed_at: Instant,
    previous: Option<Instant>,
}

/// Concurrent map of the last XP grant per (guild, user).
pub struct XpCooldown {
    window: Duration,
    last_grants: DashMap<CooldownKey, Instant>,
}

impl XpCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_grants: DashMap::new(),
        }
    }

    #[allow(dead_code)]
    pub fn window(&self) -> Duration {
        self.window
    }

    fn window_elapsed(&self, last_grant: Instant, now: Instant) -> bool {
        // Timestamps from the future (clock handed in out of order) count as active.
        match now.checked_duration_since(last_grant) {
            Some(elapsed) => elapsed >= self.window,
            None => false,
        }
    }

    #[allow(dead_code)]
    /// `false` while the member is still inside their cooldown window.
    pub fn should_grant_xp(&self, guild_id: u64, user_id: u64, now: Instant) -> bool {
        let key = CooldownKey { guild_id, user_id };
        match self.last_grants.get(&key) {
            Some(last_grant) => self.window_elapsed(*last_grant, now),
            None => true,
        }
    }

    #[allow(dead_code)]
    /// Overwrite the last grant time, whatever was there before.
    pub fn record_grant(&self, guild_id: u64, user_id: u64, now: Instant) {
        self.last_grants
            .insert(CooldownKey { guild_id, user_id }, now);
    }

    /// Check the window and record a grant in one step.
    ///
    /// The entry's shard stays locked between the check and the write, so two
    /// events for the same member can't both get through.
    pub fn try_claim(&self, guild_id: u64, user_id: u64, now: Instant) -> Option<CooldownClaim> {
        let key = CooldownKey { guild_id, user_id };
        let previous = match self.last_grants.entry(key) {
            Entry::Occupied(mut entry) => {
                if !self.window_elapsed(*entry.get(), now) {
                    return None;
                }
                Some(entry.insert(now))
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                None
            }
        };

        Some(CooldownClaim {
            key,
            claimed_at: now,
            previous,
        })
    }

    /// Undo a claim, restoring whatever grant time was stored before it.
    ///
    /// Does nothing if a newer grant has replaced the claim in the meantime.
    pub fn release(&self, claim: CooldownClaim) {
        if let Entry::Occupied(mut entry) = self.last_grants.entry(claim.key) {
            if *entry.get() != claim.claimed_at {
                return;
            }
            match claim.previous {
                Some(previous) => {
                    entry.insert(previous);
                }
                None => {
                    entry.remove();
                }
            }
        }
    }

    /// Drop every entry whose window is already over and return how many went.
    ///
    /// An expired entry grants XP exactly like a missing one, so this never
    /// changes a decision.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let before = self.last_grants.len();
        self.last_grants
            .retain(|_, last_grant| !self.window_elapsed(*last_grant, now));
        before.saturating_sub(self.last_grants.len())
    }

    pub fn len(&self) -> usize {
        self.last_grants.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.last_grants.is_empty()
    }
}

impl Default for XpCooldown {
    fn default() -> Self {
        Self::new(XP_COOLDOWN)
    }
}
