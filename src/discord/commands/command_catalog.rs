// Discord commands module.
// Each feature gets its own command file.

use crate::discord::{Data, Error};

pub mod leveling;

pub mod autorole;

pub mod welcome;

pub mod levelrole;

pub mod logging;

pub mod tickets;

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        leveling::level(),
        leveling::leaderboard(),
        leveling::give_xp(),
        leveling::leveling(),
        autorole::autorole(),
        welcome::welcome(),
        levelrole::levelrole(),
        logging::logging(),
        tickets::tickets(),
    ]
}
