use crate::core::settings::WelcomeUpdate;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Configure the welcome message for new members.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    subcommands("enable", "disable", "channel", "message")
)]
pub async fn welcome(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Turn welcome messages on.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn enable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let update = WelcomeUpdate {
        enabled: Some(true),
        ..Default::default()
    };

    let settings = ctx.data().settings.set_welcome(guild_id, update).await?;
    if settings.welcome_channel_id.is_some() {
        ctx.say("✅ Welcome messages enabled.").await?;
    } else {
        ctx.say("✅ Welcome messages enabled. Pick a channel with `/welcome channel #channel`.")
            .await?;
    }
    Ok(())
}

/// Turn welcome messages off.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let update = WelcomeUpdate {
        enabled: Some(false),
        ..Default::default()
    };

    ctx.data().settings.set_welcome(guild_id, update).await?;
    ctx.say("🛑 Welcome messages disabled.").await?;
    Ok(())
}

/// Choose the channel welcome messages are posted in.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Channel for welcome messages"] channel: serenity::Channel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let channel_id = channel.id().get();
    let update = WelcomeUpdate {
        channel_id: Some(channel_id),
        ..Default::default()
    };

    ctx.data().settings.set_welcome(guild_id, update).await?;
    ctx.say(format!("✅ Welcome messages will be posted in <#{}>.", channel_id))
        .await?;
    Ok(())
}

/// Set the welcome text. `{member}` and `{server}` are filled in.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn message(
    ctx: Context<'_>,
    #[description = "Welcome text, e.g. \"Welcome {member} to {server}!\""] template: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let update = WelcomeUpdate {
        template: Some(template),
        ..Default::default()
    };

    let settings = ctx.data().settings.set_welcome(guild_id, update).await?;
    let preview = settings.render_welcome(&ctx.author().to_string(), "this server");
    ctx.say(format!("✅ Welcome message saved. Preview:\n{}", preview))
        .await?;
    Ok(())
}
