// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "formatting/mod.rs"]
pub mod formatting;

#[path = "tags/mod.rs"]
pub mod tags;

#[path = "custom_commands/mod.rs"]
pub mod custom_commands;

#[path = "leveling/mod.rs"]
pub mod leveling;

#[path = "timers/mod.rs"]
pub mod timers;

#[path = "reminders/mod.rs"]
pub mod reminders;

#[path = "giveaways/mod.rs"]
pub mod giveaways;

#[path = "settings/mod.rs"]
pub mod settings;

#[path = "invites/mod.rs"]
pub mod invites;
