// Ticket system settings. Opening and closing tickets is handled elsewhere;
// these commands only maintain the guild's toggle and channel.

use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Configure the ticket system.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    subcommands("status", "channel", "enable", "disable")
)]
pub async fn tickets(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the ticket system configuration.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let settings = ctx.data().settings.get_settings(guild_id).await;

    let channel = settings
        .ticket_channel_id
        .map(|id| format!("<#{}>", id))
        .unwrap_or_else(|| "not set".to_string());
    let state = if settings.ticket_enabled { "enabled" } else { "disabled" };

    ctx.say(format!("Tickets are **{}**, channel: {}.", state, channel))
        .await?;
    Ok(())
}

/// Choose the channel tickets are opened from.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Ticket channel"] channel: serenity::Channel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let channel_id = channel.id().get();

    ctx.data()
        .settings
        .set_ticket_system(guild_id, None, Some(channel_id))
        .await?;
    ctx.say(format!("✅ Ticket channel set to <#{}>.", channel_id))
        .await?;
    Ok(())
}

/// Turn the ticket system on.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn enable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    ctx.data()
        .settings
        .set_ticket_system(guild_id, Some(true), None)
        .await?;
    ctx.say("✅ Ticket system enabled.").await?;
    Ok(())
}

/// Turn the ticket system off.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    ctx.data()
        .settings
        .set_ticket_system(guild_id, Some(false), None)
        .await?;
    ctx.say("🛑 Ticket system disabled.").await?;
    Ok(())
}
