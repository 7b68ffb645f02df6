// Discord layer - commands and event handlers.
// Translates gateway events and slash commands into core calls; no rules live here.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "leveling/leveling_announcements.rs"]
pub mod leveling_announcements;

#[path = "members/member_events.rs"]
pub mod members;

// Re-export command types for convenience
pub use commands::leveling::{Context, Data, Error};
