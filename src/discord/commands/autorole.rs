use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Manage the role every new member receives.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    subcommands("set", "clear", "show")
)]
pub async fn autorole(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Give this role to everyone who joins.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Role for new members"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    ctx.data()
        .settings
        .set_autorole(guild_id, Some(role.id.get()))
        .await?;
    ctx.say(format!("✅ New members will receive <@&{}>.", role.id.get()))
        .await?;
    Ok(())
}

/// Stop giving a role on join.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn clear(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    ctx.data().settings.set_autorole(guild_id, None).await?;
    ctx.say("🛑 Autorole removed.").await?;
    Ok(())
}

/// Show the current autorole.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn show(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let settings = ctx.data().settings.get_settings(guild_id).await;

    match settings.autorole_id {
        Some(role_id) => ctx.say(format!("New members receive <@&{}>.", role_id)).await?,
        None => ctx.say("No autorole is configured.").await?,
    };
    Ok(())
}
