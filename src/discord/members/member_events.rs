use crate::discord::Data;
use anyhow::Result;
use poise::serenity_prelude::{self as serenity, Context, Mentionable};

/// Give the configured autorole and post the welcome message.
/// Each half runs independently; a failed role grant still gets a welcome.
pub async fn handle_member_join(
    ctx: &Context,
    data: &Data,
    member: &serenity::Member,
) -> Result<()> {
    if member.user.bot {
        return Ok(());
    }

    let guild_id = member.guild_id.get();
    let user_id = member.user.id.get();
    let settings = data.settings.get_settings(guild_id).await;

    if let Some(channel_id) = settings.active_log_channel() {
        let embed = serenity::CreateEmbed::new()
            .title("Member Joined")
            .description(format!("{} joined the server", member.mention()))
            .color(serenity::Colour::DARK_GREEN)
            .field("Account created", format!("<t:{}:R>", member.user.created_at().unix_timestamp()), true)
            .footer(serenity::CreateEmbedFooter::new(format!("User ID: {}", user_id)))
            .timestamp(serenity::Timestamp::now());
        send_log(ctx, channel_id, embed).await;
    }

    if let Some(role_id) = settings.autorole_id {
        match ctx
            .http
            .add_member_role(
                member.guild_id,
                member.user.id,
                serenity::RoleId::new(role_id),
                Some("Autorole"),
            )
            .await
        {
            Ok(()) => tracing::info!(guild_id, user_id, role_id, "Assigned autorole"),
            Err(err) => {
                tracing::warn!(guild_id, user_id, role_id, "Failed to assign autorole: {err}")
            }
        }
    }

    if !settings.welcome_enabled {
        return Ok(());
    }
    let Some(channel_id) = settings.welcome_channel_id else {
        tracing::debug!(guild_id, "Welcome enabled without a channel, skipping");
        return Ok(());
    };

    let server_name = ctx
        .cache
        .guild(member.guild_id)
        .map(|guild| guild.name.clone())
        .unwrap_or_else(|| "the server".to_string());
    let content = settings.render_welcome(&member.mention().to_string(), &server_name);

    serenity::ChannelId::new(channel_id)
        .send_message(&ctx.http, serenity::CreateMessage::new().content(content))
        .await?;
    Ok(())
}

/// Log a departure to the activity log, when the guild has one.
pub async fn handle_member_remove(
    ctx: &Context,
    data: &Data,
    guild_id: serenity::GuildId,
    user: &serenity::User,
) -> Result<()> {
    if user.bot {
        return Ok(());
    }

    let settings = data.settings.get_settings(guild_id.get()).await;
    let Some(channel_id) = settings.active_log_channel() else {
        return Ok(());
    };

    let embed = serenity::CreateEmbed::new()
        .title("Member Left")
        .description(format!("{} left the server", user.mention()))
        .color(serenity::Colour::RED)
        .footer(serenity::CreateEmbedFooter::new(format!("User ID: {}", user.id)))
        .timestamp(serenity::Timestamp::now());
    send_log(ctx, channel_id, embed).await;
    Ok(())
}

async fn send_log(ctx: &Context, channel_id: u64, embed: serenity::CreateEmbed) {
    if let Err(err) = serenity::ChannelId::new(channel_id)
        .send_message(&ctx.http, serenity::CreateMessage::new().embed(embed))
        .await
    {
        tracing::warn!(channel_id, "Failed to send log: {err}");
    }
}
