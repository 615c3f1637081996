// Discord layer - commands and event handlers.

#[path = "data.rs"]
pub mod data;

pub mod errors;
pub mod flags;
pub mod pagination;
pub mod prompt;

#[path = "tags/tag_bridge.rs"]
pub mod tags;

#[path = "events/custom_command_dispatch.rs"]
pub mod custom_command_dispatch;

#[path = "leveling/leveling_announcements.rs"]
pub mod leveling_announcements;

#[path = "invites/invite_tracking.rs"]
pub mod invite_tracking;

#[path = "timers/dispatcher.rs"]
pub mod timer_dispatcher;

#[path = "commands/command_catalog.rs"]
pub mod commands;

pub use data::{Context, Data, Error};
