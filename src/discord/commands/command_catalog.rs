// Discord commands module.
// Each feature gets its own command file.

pub mod leveling;

pub mod settings;
