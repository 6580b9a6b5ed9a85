// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "leveling/leveling_store.rs"]
pub mod leveling;

#[path = "guild_settings/mod.rs"]
pub mod guild_settings;

#[path = "mee6/mod.rs"]
pub mod mee6;
