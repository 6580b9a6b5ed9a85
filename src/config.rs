// Runtime configuration, read from the environment (and `.env` if present).

use crate::core::leveling::CooldownPolicy;
use crate::infra::mee6::MEE6_API_URL;
use anyhow::{bail, Context};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    /// Folder for the SQLite files.
    pub data_dir: PathBuf,
    /// Whether guilds that never ran `/levelsystem` earn XP.
    pub level_system_default: bool,
    pub cooldown_policy: CooldownPolicy,
    /// How often expired XP cooldowns are dropped from memory.
    pub cooldown_sweep_interval: Duration,
    pub import_delay: Duration,
    pub mee6_api_url: String,
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .context(
                "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
            )?;

        let data_dir = lookup("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));

        let level_system_default = match lookup("LEVEL_SYSTEM_DEFAULT") {
            Some(value) => value
                .parse::<bool>()
                .with_context(|| format!("LEVEL_SYSTEM_DEFAULT must be true or false, got {value:?}"))?,
            None => false,
        };

        let cooldown_policy = match lookup("XP_COOLDOWN_POLICY").as_deref() {
            None => CooldownPolicy::default(),
            Some("decision") => CooldownPolicy::OnDecision,
            Some("confirmed") => CooldownPolicy::OnConfirmedWrite,
            Some(other) => bail!("XP_COOLDOWN_POLICY must be `decision` or `confirmed`, got {other:?}"),
        };

        let cooldown_sweep_interval = Duration::from_secs(parse_or(&lookup, "COOLDOWN_SWEEP_SECS", 300)?);
        if cooldown_sweep_interval.is_zero() {
            bail!("COOLDOWN_SWEEP_SECS must be at least 1");
        }
        let import_delay = Duration::from_millis(parse_or(&lookup, "LEVEL_IMPORT_DELAY_MS", 25)?);

        let mee6_api_url = lookup("MEE6_API_URL").unwrap_or_else(|| MEE6_API_URL.to_string());

        Ok(Self {
            discord_token,
            data_dir,
            level_system_default,
            cooldown_policy,
            cooldown_sweep_interval,
            import_delay,
            mee6_api_url,
        })
    }

    pub fn levels_db_path(&self) -> PathBuf {
        self.data_dir.join("levels.db")
    }

    pub fn settings_db_path(&self) -> PathBuf {
        self.data_dir.join("settings.db")
    }
}

fn parse_or<F>(lookup: &F, key: &str, default: u64) -> anyhow::Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number, got {value:?}")),
        None => Ok(default),
    }
}
