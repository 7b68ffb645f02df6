// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Storage backends implementing the core's `KeyValueStore`
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Open the store and build the services around it
// 3. Set up the Discord framework
// 4. Route gateway events to the handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

use crate::config::BotConfig;
use crate::core::leveling::{Award, LeaderboardService, LevelingService};
use crate::core::settings::GuildSettingsService;
use crate::discord::leveling_announcements::announce_level_up;
use crate::discord::members::{handle_member_join, handle_member_remove};
use crate::discord::{Data, Error};
use crate::infra::StoreBackend;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            // Ignore bot messages (including our own)
            if new_message.author.bot {
                return Ok(());
            }

            // Only guild messages earn XP
            let Some(guild_id) = new_message.guild_id else {
                return Ok(());
            };
            let guild_id = guild_id.get();
            let user_id = new_message.author.id.get();

            if !data.settings.get_settings(guild_id).await.leveling_enabled {
                return Ok(());
            }

            match data.leveling.process_message(guild_id, user_id).await {
                Ok(Award::Granted(gain)) => {
                    if let Some(level_up) = gain.level_up() {
                        tracing::info!(
                            user_id = level_up.user_id,
                            guild_id = level_up.guild_id,
                            old_level = level_up.old_level,
                            new_level = level_up.new_level,
                            total_xp = level_up.total_xp,
                            "User leveled up"
                        );

                        if let Err(err) =
                            announce_level_up(ctx, new_message.channel_id, data, &level_up).await
                        {
                            tracing::warn!("Failed to send level-up embed: {err}");
                        }
                    }
                }
                Ok(Award::OnCooldown(_)) => {
                    // User is on cooldown - silently ignore
                }
                Err(e) => {
                    // Log it but keep the bot running
                    tracing::error!(guild_id, user_id, "Error processing XP for message: {e}");
                }
            }
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = handle_member_join(ctx, data, new_member).await {
                tracing::error!("Error handling member join: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            if let Err(e) = handle_member_remove(ctx, data, *guild_id, user).await {
                tracing::error!("Error handling member leave: {}", e);
            }
        }
        _ => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("community_bot=info")),
        )
        .init();

    // Reads `.env` (if it exists) before looking at the environment
    let config = BotConfig::from_env()?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // One store for the whole process, shared by every service.

    let store = Arc::new(StoreBackend::open(&config.store).await?);

    let data = Data {
        leveling: Arc::new(LevelingService::new(Arc::clone(&store), config.progression)),
        leaderboard: Arc::new(LeaderboardService::new(Arc::clone(&store))),
        settings: Arc::new(GuildSettingsService::new(Arc::clone(&store))),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: discord::commands::all(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!(user = %ready.user.name, "Bot connected");

                // Register slash commands globally (can take up to an hour to propagate)
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.token, intents)
        .framework(framework)
        .await?;

    client.start().await?;
    Ok(())
}
