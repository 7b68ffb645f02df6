use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Manage roles rewarded for reaching a level.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    subcommands("set", "remove", "list")
)]
pub async fn levelrole(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Reward a role when members reach a level.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Level that unlocks the role"]
    #[min = 1]
    level: u32,
    #[description = "Role to give"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    ctx.data()
        .settings
        .set_level_role_reward(guild_id, level, Some(role.id.get()))
        .await?;
    ctx.say(format!(
        "✅ Members reaching level {} will receive <@&{}>.",
        level,
        role.id.get()
    ))
    .await?;
    Ok(())
}

/// Remove the reward for a level.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Level whose reward to remove"] level: u32,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    ctx.data()
        .settings
        .set_level_role_reward(guild_id, level, None)
        .await?;
    ctx.say(format!("🛑 No role is rewarded at level {} anymore.", level))
        .await?;
    Ok(())
}

/// List every level reward.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let settings = ctx.data().settings.get_settings(guild_id).await;

    if settings.level_roles.is_empty() {
        ctx.say("No level rewards configured. Add one with `/levelrole set`.")
            .await?;
        return Ok(());
    }

    let description = settings
        .level_roles
        .iter()
        .map(|(level, role_id)| format!("Level **{}** → <@&{}>", level, role_id))
        .collect::<Vec<_>>()
        .join("\n");

    let embed = serenity::CreateEmbed::new()
        .title("Level Rewards")
        .description(description)
        .color(serenity::Colour::BLURPLE);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
