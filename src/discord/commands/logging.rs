use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Manage the member activity log.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    subcommands("status", "channel", "enable", "disable")
)]
pub async fn logging(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the current logging configuration.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let settings = ctx.data().settings.get_settings(guild_id).await;

    let status = if settings.logging_enabled && settings.logging_channel_id.is_some() {
        "Enabled"
    } else {
        "Disabled"
    };
    let channel_mention = settings
        .logging_channel_id
        .map(|id| format!("<#{}>", id))
        .unwrap_or_else(|| "Not set".to_string());

    let embed = serenity::CreateEmbed::default()
        .title("Activity Logging")
        .color(serenity::Color::BLURPLE)
        .field("Status", status, false)
        .field("Log Channel", channel_mention, false)
        .field("Tracked Events", "• Member Join/Leave", false);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Select the text channel used for logging.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Channel to log to"] channel: serenity::Channel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let channel_id = channel.id().get();

    ctx.data()
        .settings
        .set_logging(guild_id, None, Some(channel_id))
        .await?;
    ctx.say(format!("✅ Logging channel set to <#{}>.", channel_id))
        .await?;
    Ok(())
}

/// Enable activity logging.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn enable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    let settings = ctx
        .data()
        .settings
        .set_logging(guild_id, Some(true), None)
        .await?;
    if settings.logging_channel_id.is_some() {
        ctx.say("✅ Activity logging enabled.").await?;
    } else {
        ctx.say("✅ Activity logging enabled. Pick a channel with `/logging channel #channel`.")
            .await?;
    }
    Ok(())
}

/// Disable activity logging.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    ctx.data()
        .settings
        .set_logging(guild_id, Some(false), None)
        .await?;
    ctx.say("🛑 Activity logging disabled.").await?;
    Ok(())
}
