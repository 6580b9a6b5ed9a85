// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases, APIs)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
mod config;
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::config::BotConfig;
use crate::core::guild_settings::GuildSettingsService;
use crate::core::leveling::{ActivityEvent, ActivityOutcome, LevelingService, XpCooldown};
use crate::discord::leveling_announcements::ChannelAnnouncer;
use crate::discord::{Data, Error};
use crate::infra::guild_settings::SqliteGuildSettingsStore;
use crate::infra::leveling::SqliteLevelStore;
use crate::infra::mee6::Mee6Client;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Instant;

/// Event handler for non-command Discord events.
/// Every guild message counts towards the leveling system.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        // Ignore bot messages (including our own)
        if new_message.author.bot {
            return Ok(());
        }

        // Only guild messages count (not DMs)
        let Some(guild_id) = new_message.guild_id else {
            return Ok(());
        };
        let guild_id = guild_id.get();

        let activity = ActivityEvent {
            guild_id,
            user_id: new_message.author.id.get(),
            channel_id: new_message.channel_id.get(),
            display_name: new_message.author.tag(),
            leveling_enabled: data.settings.level_system_enabled(guild_id).await,
            at: Instant::now(),
        };

        let announcer = ChannelAnnouncer::new(ctx.http.clone());
        if let ActivityOutcome::LeveledUp(level_up) =
            data.leveling.process_activity(&activity, &announcer).await
        {
            tracing::info!(
                user_id = level_up.user_id,
                guild_id = level_up.guild_id,
                old_level = level_up.old_level,
                new_level = level_up.new_level,
                total_xp = level_up.total_xp,
                "User leveled up"
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = BotConfig::from_env()?;

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.data_dir.display()
        )
    })?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let level_store = SqliteLevelStore::new(&config.levels_db_path().to_string_lossy())
        .await
        .context("Failed to initialize SQLite level store")?;
    let leveling_service = Arc::new(LevelingService::with_cooldown(
        level_store,
        XpCooldown::default(),
        config.cooldown_policy,
    ));

    let settings_store = SqliteGuildSettingsStore::new(&config.settings_db_path().to_string_lossy())
        .await
        .context("Failed to initialize SQLite settings store")?;
    let settings_service = Arc::new(GuildSettingsService::new(
        settings_store,
        config.level_system_default,
    ));

    let mee6_client = Arc::new(
        Mee6Client::new(config.mee6_api_url.clone()).context("Failed to create Mee6 client")?,
    );

    let data = Data {
        leveling: Arc::clone(&leveling_service),
        settings: Arc::clone(&settings_service),
        leaderboard_source: Arc::clone(&mee6_client),
        import_delay: config.import_delay,
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required for prefix commands and the import confirmation
        | serenity::GatewayIntents::GUILDS;

    let sweep_interval = config.cooldown_sweep_interval;
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::commands::leveling::level(),
                discord::commands::leveling::ranks(),
                discord::commands::leveling::level_import(),
                discord::commands::settings::level_system(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some("*".into()),
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(discord::error_handler::on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!(user = %ready.user.name, "Bot is starting up");

                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                // Background sweep so the cooldown map only holds members who are
                // still inside their window.
                let leveling = Arc::clone(&data.leveling);
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(sweep_interval);
                    loop {
                        ticker.tick().await;
                        let removed = leveling.sweep_cooldowns(Instant::now());
                        tracing::debug!(
                            removed,
                            remaining = leveling.cooldown().len(),
                            "Swept XP cooldowns"
                        );
                    }
                });

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
