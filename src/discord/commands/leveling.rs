// Discord commands for the leveling system.
//
// Same shape as every command file: pull primitive ids out of the Discord
// types, call the core service, render whatever comes back.

use crate::core::leveling::{
    xp_for_level, LeaderboardService, LevelingError, LevelingService, Metric,
};
use crate::core::settings::GuildSettingsService;
use crate::discord::leveling_announcements::{announce_level_up, build_progress_bar};
use crate::infra::StoreBackend;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

/// Type alias for our bot's context.
/// This is what every command receives as its first parameter.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands and event handlers.
pub struct Data {
    pub leveling: Arc<LevelingService<StoreBackend>>,
    pub leaderboard: Arc<LeaderboardService<StoreBackend>>,
    pub settings: Arc<GuildSettingsService<StoreBackend>>,
}

const LEADERBOARD_SIZE: usize = 10;

/// Show your current level and XP.
#[poise::command(slash_command, guild_only)]
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
        ctx.say("Bots don't earn XP! 🤖").await?;
        return Ok(());
    }

    let user_id = target_user.id.get();
    let progress = ctx.data().leveling.get_progress(guild_id, user_id).await?;
    let rank = ctx
        .data()
        .leaderboard
        .rank_of(guild_id, user_id, Metric::Xp)
        .await;

    let previous_threshold = xp_for_level(progress.level());
    let next_threshold = progress.next_level_xp();
    let xp_progress = progress.xp().saturating_sub(previous_threshold);
    let level_span = next_threshold.saturating_sub(previous_threshold);
    let progress_pct = if level_span > 0 {
        xp_progress as f64 / level_span as f64
    } else {
        0.0
    };

    let embed = serenity::CreateEmbed::new()
        .title(format!("Level of {}", target_user.name))
        .color(0x00ff00)
        .thumbnail(target_user.face())
        .field("Level", format!("**{}**", progress.level()), true)
        .field("Total XP", format!("**{}**", progress.xp()), true)
        .field(
            "Rank",
            rank.map(|r| format!("#{r}"))
                .unwrap_or_else(|| "Unranked".to_string()),
            true,
        )
        .field(
            "Progress",
            format!(
                "{}/{} XP\n{}",
                xp_progress,
                level_span,
                build_progress_bar(progress_pct, 15)
            ),
            false,
        )
        .field(
            "XP to next level",
            next_threshold.saturating_sub(progress.xp()).to_string(),
            true,
        )
        .field("Messages", progress.messages().to_string(), true)
        .field(
            "Last XP",
            progress
                .last_award()
                .map(|at| format!("<t:{}:R>", at.timestamp()))
                .unwrap_or_else(|| "Never".to_string()),
            true,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    Ok(())
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum LeaderboardMetric {
    Level,
    #[name = "XP"]
    Xp,
    Messages,
}

impl From<LeaderboardMetric> for Metric {
    fn from(value: LeaderboardMetric) -> Self {
        match value {
            LeaderboardMetric::Level => Metric::Level,
            LeaderboardMetric::Xp => Metric::Xp,
            LeaderboardMetric::Messages => Metric::Messages,
        }
    }
}

/// Show the server's top members.
#[poise::command(slash_command, guild_only)]
pub async fn leaderboard(
    ctx: Context<'_>,
    #[description = "What to rank by (default: Level)"] metric: Option<LeaderboardMetric>,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();
    let metric: Metric = metric.unwrap_or(LeaderboardMetric::Level).into();

    let entries = ctx
        .data()
        .leaderboard
        .top_n(guild_id, LEADERBOARD_SIZE, metric)
        .await;

    if entries.is_empty() {
        ctx.say("No one has earned XP yet! Start chatting to get on the leaderboard! 💬")
            .await?;
        return Ok(());
    }

    let author_id = ctx.author().id.get();
    let mut description = String::new();
    match ctx
        .data()
        .leaderboard
        .rank_of(guild_id, author_id, metric)
        .await
    {
        Some(rank) => description.push_str(&format!("Your rank: **#{}**\n\n", rank)),
        None => description.push_str("You are not ranked yet.\n\n"),
    }

    for (index, entry) in entries.iter().enumerate() {
        let rank = index + 1;
        let medal = match rank {
            1 => "🥇",
            2 => "🥈",
            3 => "🥉",
            _ => "  ",
        };

        let user_name = resolve_display_name_cached(&ctx, guild_id, entry.user_id);
        let name_display = if entry.user_id == author_id {
            format!("**{}** (You)", user_name)
        } else {
            user_name
        };

        description.push_str(&format!(
            "{} **#{}** {}\nLevel {} | {} XP | {} messages\n\n",
            medal,
            rank,
            name_display,
            entry.progress.level(),
            entry.progress.xp(),
            entry.progress.messages()
        ));
    }

    let embed = serenity::CreateEmbed::new()
        .title(format!("📊 Leaderboard by {}", metric.label()))
        .description(description)
        .color(0xffd700);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    Ok(())
}

/// Manually award XP to a user (admin only).
///
/// **Command syntax:** `/give_xp @user 100`
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn give_xp(
    ctx: Context<'_>,
    #[description = "User to give XP to"] user: serenity::User,
    #[description = "Amount of XP to give"] amount: i64,
) -> Result<(), Error> {
    if user.bot {
        ctx.say("You can't give XP to bots!").await?;
        return Ok(());
    }

    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let gain = match ctx
        .data()
        .leveling
        .grant_xp(guild_id, user.id.get(), amount)
        .await
    {
        Ok(gain) => gain,
        Err(LevelingError::NegativeDelta(_)) => {
            ctx.say("❌ The amount can't be negative.").await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    ctx.say(format!(
        "✅ Gave {} XP to {} ({} XP total).",
        gain.amount, user.name, gain.total_xp
    ))
    .await?;

    if let Some(level_up) = gain.level_up() {
        if let Err(err) =
            announce_level_up(ctx.serenity_context(), ctx.channel_id(), ctx.data(), &level_up).await
        {
            tracing::warn!("Failed to announce level-up: {err}");
        }
    }

    Ok(())
}

/// Configure the leveling system.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    subcommands("enable", "disable", "channel", "reset")
)]
pub async fn leveling(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Start awarding XP for messages.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn enable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    ctx.data()
        .settings
        .set_leveling_enabled(guild_id, true)
        .await?;
    ctx.say("✅ Leveling enabled.").await?;
    Ok(())
}

/// Stop awarding XP for messages. Existing progress is kept.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    ctx.data()
        .settings
        .set_leveling_enabled(guild_id, false)
        .await?;
    ctx.say("🛑 Leveling disabled.").await?;
    Ok(())
}

/// Choose where level-up announcements go.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Announcement channel (leave empty to announce where the message was sent)"]
    channel: Option<serenity::Channel>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let channel_id = channel.map(|c| c.id().get());

    ctx.data()
        .settings
        .set_level_notification_channel(guild_id, channel_id)
        .await?;

    match channel_id {
        Some(id) => ctx.say(format!("✅ Level-ups will be announced in <#{}>.", id)).await?,
        None => {
            ctx.say("✅ Level-ups will be announced where the message was sent.")
                .await?
        }
    };
    Ok(())
}

/// Wipe XP for one member, or for the whole server after a confirmation.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn reset(
    ctx: Context<'_>,
    #[description = "Member to reset (leave empty to reset everyone)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();

    match user {
        Some(user) => {
            ctx.data()
                .leveling
                .reset_user(guild_id, user.id.get())
                .await?;
            ctx.say(format!("♻️ Reset XP for {}.", user.name)).await?;
        }
        None => {
            if confirm_guild_reset(ctx).await? {
                ctx.data().leveling.reset_guild(guild_id).await?;
                ctx.say("♻️ Reset XP for everyone in this server.").await?;
            }
        }
    }
    Ok(())
}

const RESET_CONFIRM_ID: &str = "leveling_reset_confirm";
const RESET_CANCEL_ID: &str = "leveling_reset_cancel";

/// Ask the invoking admin to confirm a server-wide reset. Anything other than
/// a press of the confirm button within 30 seconds counts as a no.
async fn confirm_guild_reset(ctx: Context<'_>) -> Result<bool, Error> {
    let reply = ctx
        .send(
            poise::CreateReply::default()
                .content(
                    "⚠️ This wipes level data for the **entire server** and cannot be undone. Continue?",
                )
                .components(vec![serenity::CreateActionRow::Buttons(vec![
                    serenity::CreateButton::new(RESET_CONFIRM_ID)
                        .label("Reset everyone")
                        .style(serenity::ButtonStyle::Danger),
                    serenity::CreateButton::new(RESET_CANCEL_ID)
                        .label("Cancel")
                        .style(serenity::ButtonStyle::Secondary),
                ])]),
        )
        .await?;

    let interaction = reply
        .message()
        .await?
        .await_component_interaction(ctx.serenity_context())
        .author_id(ctx.author().id)
        .timeout(Duration::from_secs(30))
        .await;

    let (confirmed, outcome) =
        reset_decision(interaction.as_ref().map(|press| press.data.custom_id.as_str()));

    match interaction {
        Some(press) => {
            press
                .create_response(
                    ctx.serenity_context(),
                    serenity::CreateInteractionResponse::UpdateMessage(
                        serenity::CreateInteractionResponseMessage::new()
                            .content(outcome)
                            .components(vec![]),
                    ),
                )
                .await?;
        }
        None => {
            reply
                .edit(
                    ctx,
                    poise::CreateReply::default()
                        .content(outcome)
                        .components(vec![]),
                )
                .await?;
        }
    }

    Ok(confirmed)
}

/// Whether a button press (or its absence) confirms the reset, and what to tell the admin.
fn reset_decision(pressed: Option<&str>) -> (bool, &'static str) {
    match pressed {
        Some(RESET_CONFIRM_ID) => (true, "Resetting…"),
        Some(_) => (false, "Reset cancelled."),
        None => (false, "No answer, reset cancelled."),
    }
}

/// Cache-only display name lookup; falls back to a mention.
fn resolve_display_name_cached(ctx: &Context<'_>, guild_id: u64, user_id: u64) -> String {
    let guild_id_s = serenity::GuildId::from(guild_id);
    let user_id_s = serenity::UserId::from(user_id);

    if let Some(guild) = ctx.serenity_context().cache.guild(guild_id_s) {
        if let Some(member) = guild.members.get(&user_id_s) {
            return member.display_name().to_string();
        }
    }

    if let Some(user) = ctx.serenity_context().cache.user(user_id_s) {
        return user.name.clone();
    }

    format!("<@{}>", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_confirm_button_allows_a_server_reset() {
        assert!(reset_decision(Some(RESET_CONFIRM_ID)).0);
        assert!(!reset_decision(Some(RESET_CANCEL_ID)).0);
        assert!(!reset_decision(Some("something_else")).0);
        assert_eq!(reset_decision(None), (false, "No answer, reset cancelled."));
    }
}
