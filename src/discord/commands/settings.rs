// Guild configuration commands.

use super::leveling::{Context, Error};

/// Turn XP gain on or off for this server. Messages are counted either way.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "levelsystem",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn level_system(
    ctx: Context<'_>,
    #[description = "Whether members earn XP for chatting"] enabled: bool,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    ctx.data()
        .settings
        .set_level_system(guild_id, enabled)
        .await?;

    let reply = if enabled {
        "✅ The level system is now **on**. Chat away!"
    } else {
        "⏸️ The level system is now **off**. Messages still count, but no XP is handed out."
    };
    ctx.say(reply).await?;
    Ok(())
}
