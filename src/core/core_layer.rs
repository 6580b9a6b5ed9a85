// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "leveling/mod.rs"]
pub mod leveling;

#[path = "guild_settings/guild_settings_service.rs"]
pub mod guild_settings;
