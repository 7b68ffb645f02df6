use crate::core::leveling::{xp_for_level, LevelUpEvent};
use crate::core::settings::GuildRecord;
use crate::discord::Data;
use poise::serenity_prelude::{self as serenity, builder::CreateMessage};
use rand::seq::SliceRandom;

/// Announce a level-up and hand out the reward roles it unlocked.
///
/// The embed goes to the guild's level channel when one is configured,
/// otherwise to `fallback_channel` (where the triggering message was sent).
pub async fn announce_level_up(
    ctx: &serenity::Context,
    fallback_channel: serenity::ChannelId,
    data: &Data,
    level_up: &LevelUpEvent,
) -> Result<(), serenity::Error> {
    let settings = data.settings.get_settings(level_up.guild_id).await;

    let rewards = assign_reward_roles(&ctx.http, &settings, level_up).await;

    let channel_id = settings
        .level_channel_id
        .map(serenity::ChannelId::new)
        .unwrap_or(fallback_channel);

    channel_id
        .send_message(ctx, CreateMessage::new().embed(level_up_embed(level_up, &rewards)))
        .await
        .map(|_| ())
}

/// Give the member every reward role between the old and the new level.
/// A role that cannot be assigned is logged and skipped.
pub async fn assign_reward_roles(
    http: &serenity::Http,
    settings: &GuildRecord,
    level_up: &LevelUpEvent,
) -> Vec<u64> {
    let mut assigned = Vec::new();
    for (level, role_id) in settings.rewards_between(level_up.old_level, level_up.new_level) {
        match http
            .add_member_role(
                serenity::GuildId::new(level_up.guild_id),
                serenity::UserId::new(level_up.user_id),
                serenity::RoleId::new(role_id),
                Some("Level reward"),
            )
            .await
        {
            Ok(()) => {
                tracing::info!(
                    guild_id = level_up.guild_id,
                    user_id = level_up.user_id,
                    level,
                    role_id,
                    "Assigned level reward role"
                );
                assigned.push(role_id);
            }
            Err(err) => tracing::warn!(
                guild_id = level_up.guild_id,
                user_id = level_up.user_id,
                role_id,
                "Failed to assign level reward role: {err}"
            ),
        }
    }
    assigned
}

fn level_up_embed(level_up: &LevelUpEvent, rewards: &[u64]) -> serenity::CreateEmbed {
    let previous_threshold = xp_for_level(level_up.new_level);
    let next_threshold = xp_for_level(level_up.new_level.saturating_add(1));
    let level_span = next_threshold.saturating_sub(previous_threshold).max(1);
    let xp_in_level = level_up
        .total_xp
        .saturating_sub(previous_threshold)
        .min(level_span);
    let progress = xp_in_level as f64 / level_span as f64;

    let mut embed = serenity::CreateEmbed::new()
        .title("Level Up!")
        .description(format!(
            "<@{}> reached level {}!",
            level_up.user_id, level_up.new_level
        ))
        .color(level_color(level_up.new_level))
        .field("Total XP", level_up.total_xp.to_string(), true)
        .field(
            "Progress",
            format!(
                "{}/{} XP\n{}",
                xp_in_level,
                level_span,
                build_progress_bar(progress, 18)
            ),
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(random_flavor_line()));

    if let Some(line) = reward_line(rewards) {
        embed = embed.field("Rewards unlocked", line, false);
    }
    embed
}

/// Role mentions for the rewards that were actually handed out.
fn reward_line(rewards: &[u64]) -> Option<String> {
    if rewards.is_empty() {
        return None;
    }
    Some(
        rewards
            .iter()
            .map(|role_id| format!("<@&{}>", role_id))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn level_color(level: u32) -> serenity::Colour {
    if level >= 50 {
        serenity::Colour::DARK_PURPLE
    } else if level >= 25 {
        serenity::Colour::ORANGE
    } else if level >= 10 {
        serenity::Colour::GOLD
    } else if level >= 5 {
        serenity::Colour::BLURPLE
    } else {
        serenity::Colour::LIGHT_GREY
    }
}

pub fn build_progress_bar(progress: f64, length: usize) -> String {
    let clamped = progress.clamp(0.0, 1.0);
    let mut filled = (clamped * length as f64).round() as usize;
    if clamped > 0.0 && filled == 0 {
        filled = 1;
    }
    filled = filled.min(length);
    let bar = "▰".repeat(filled) + &"▱".repeat(length - filled);
    format!("{} ({}%)", bar, (clamped * 100.0).round() as u32)
}

fn random_flavor_line() -> &'static str {
    const FLAVOR_LINES: [&str; 4] = [
        "Keep chatting!",
        "Another level down.",
        "The server noticed.",
        "On to the next one.",
    ];

    FLAVOR_LINES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FLAVOR_LINES[0])
}
