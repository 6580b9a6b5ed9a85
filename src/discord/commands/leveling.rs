// Discord commands for the leveling system.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call core service
// 3. Format the response based on the result
//
// This layer is THIN - no business logic, just translation.

use crate::core::guild_settings::GuildSettingsService;
use crate::core::leveling::level_curve::xp_for_level;
use crate::core::leveling::{ImportSummary, LeaderboardImporter, LevelRecord, LevelingService};
use crate::infra::guild_settings::SqliteGuildSettingsStore;
use crate::infra::leveling::SqliteLevelStore;
use crate::infra::mee6::Mee6Client;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

/// How many members the rank lookup scans before giving up.
const RANK_SCAN_LIMIT: usize = 10_000;

const RANKS_PER_PAGE: usize = 10;

/// How long `/levelimport` waits for the confirmation reply.
const IMPORT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(15);

/// Show your current level and XP.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn level(
    ctx: Context<'_>,
    #[description = "User to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let target_user = user.as_ref().unwrap_or_else(|| ctx.author());
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    if target_user.bot {
        ctx.say("Bots don't collect XP! 🤖").await?;
        return Ok(());
    }

    let user_id = target_user.id.get();
    let leveling = &ctx.data().leveling;
    let Some(record) = leveling.get_record(guild_id, user_id).await? else {
        ctx.say(format!(
            "{} hasn't sent any messages here yet.",
            target_user.name
        ))
        .await?;
        return Ok(());
    };
    let rank = leveling.get_rank(guild_id, user_id, RANK_SCAN_LIMIT).await?;

    let level = record.level();
    let level_start = xp_for_level(level);
    let next_threshold = xp_for_level(level + 1);
    let level_span = next_threshold.saturating_sub(level_start).max(1);
    let xp_progress = record.xp.saturating_sub(level_start).min(level_span);
    let xp_needed = next_threshold.saturating_sub(record.xp);

    let level_system_on = ctx.data().settings.level_system_enabled(guild_id).await;

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("Level of {}", target_user.name))
        .color(0x00ff00)
        .thumbnail(target_user.face())
        .field("Level", format!("**{}**", level), true)
        .field("Total XP", format!("**{}**", record.xp), true)
        .field(
            "Rank",
            rank.map(|r| format!("#{}", r))
                .unwrap_or_else(|| "Unranked".to_string()),
            true,
        )
        .field(
            "Progress",
            format!(
                "{}/{} XP\n{}",
                xp_progress,
                level_span,
                build_progress_bar(xp_progress as f64 / level_span as f64, 15)
            ),
            false,
        )
        .field("XP to next level", xp_needed.to_string(), true)
        .field("Messages", record.message_count.to_string(), true);

    if !level_system_on {
        embed = embed.footer(serenity::CreateEmbedFooter::new(
            "The level system is turned off in this server, messages only count.",
        ));
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the server leaderboard.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn ranks(
    ctx: Context<'_>,
    #[description = "Page number (default: 1)"]
    #[min = 1]
    page: Option<usize>,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let records = ctx
        .data()
        .leveling
        .get_leaderboard(guild_id, RANK_SCAN_LIMIT)
        .await?;

    if records.is_empty() {
        ctx.say("No one has earned XP yet! Start chatting to get on the leaderboard! 💬")
            .await?;
        return Ok(());
    }

    let total_pages = records.len().div_ceil(RANKS_PER_PAGE);
    let current_page = page.unwrap_or(1).clamp(1, total_pages);
    let offset = (current_page - 1) * RANKS_PER_PAGE;

    let author_id = ctx.author().id.get();
    let mut description = match records.iter().position(|r| r.user_id == author_id) {
        Some(index) => format!("Your rank: **#{}**\n\n", index + 1),
        None => "You are not ranked yet.\n\n".to_string(),
    };

    for (index, record) in records.iter().enumerate().skip(offset).take(RANKS_PER_PAGE) {
        description.push_str(&format_rank_line(index + 1, record, record.user_id == author_id));
        description.push('\n');
    }

    let embed = serenity::CreateEmbed::new()
        .title("🏆 Leaderboard")
        .description(description)
        .color(0xDAA520)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Page {}/{} • {} members ranked",
            current_page,
            total_pages,
            records.len()
        )));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Import this server's Mee6 levels. Overwrites existing XP!
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "levelimport",
    required_permissions = "ADMINISTRATOR"
)]
pub async fn level_import(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    ctx.say(
        "This will overwrite the XP and message count of everyone Mee6 knows about. \
         Reply with `y` within 15 seconds to continue.",
    )
    .await?;

    let reply = ctx
        .channel_id()
        .await_reply(ctx.serenity_context())
        .author_id(ctx.author().id)
        .timeout(IMPORT_CONFIRM_TIMEOUT)
        .await;

    let confirmed = reply
        .map(|msg| msg.content.trim().eq_ignore_ascii_case("y"))
        .unwrap_or(false);
    if !confirmed {
        ctx.say("Import aborted.").await?;
        return Ok(());
    }

    ctx.say("Fetching the Mee6 leaderboard...").await?;

    let data = ctx.data();
    let summary = LeaderboardImporter::new(data.leveling.store(), data.leaderboard_source.as_ref())
        .with_delay(data.import_delay)
        .run(guild_id)
        .await?;

    ctx.say(import_result_message(&summary)).await?;
    Ok(())
}

fn import_result_message(summary: &ImportSummary) -> String {
    if summary.fetched == 0 {
        return "Mee6 has no level data for this server.".to_string();
    }

    let mut text = format!(
        "Imported {} of {} members. {} members are now on the leaderboard, check `/ranks`.",
        summary.written, summary.fetched, summary.total_records
    );
    if summary.failed > 0 {
        text.push_str(&format!(
            "\n⚠️ {} entries could not be saved, see the bot log.",
            summary.failed
        ));
    }
    text
}

fn format_rank_line(rank: usize, record: &LevelRecord, is_me: bool) -> String {
    let medal = match rank {
        1 => "🥇",
        2 => "🥈",
        3 => "🥉",
        _ => "▫️",
    };

    let name = if record.display_name.is_empty() {
        format!("<@{}>", record.user_id)
    } else {
        record.display_name.clone()
    };
    let name = if is_me {
        format!("**{}** (You)", name)
    } else {
        name
    };

    format!(
        "{} `#{}` {} • Level {} • {} XP • {} messages",
        medal,
        rank,
        name,
        record.level(),
        record.xp,
        record.message_count
    )
}

fn build_progress_bar(progress: f64, length: usize) -> String {
    let clamped = progress.clamp(0.0, 1.0);
    let mut filled = (clamped * length as f64).round() as usize;
    if clamped > 0.0 && filled == 0 {
        filled = 1;
    }
    filled = filled.min(length);
    let bar = "▰".repeat(filled) + &"▱".repeat(length - filled);
    format!("{} ({}%)", bar, (clamped * 100.0).round() as u32)
}

/// Type alias for our bot's context.
/// This is what every command receives as its first parameter.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands.
/// This is where we store our services and configuration.
pub struct Data {
    pub leveling: Arc<LevelingService<SqliteLevelStore>>,
    pub settings: Arc<GuildSettingsService<SqliteGuildSettingsStore>>,
    pub leaderboard_source: Arc<Mee6Client>,
    /// Pause between two writes of a leaderboard import.
    pub import_delay: Duration,
}
