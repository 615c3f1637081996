// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "database.rs"]
pub mod database;

#[path = "leveling/sqlite_store.rs"]
pub mod leveling;

#[path = "custom_commands/sqlite_store.rs"]
pub mod custom_commands;

#[path = "timers/sqlite_store.rs"]
pub mod timers;

#[path = "giveaways/sqlite_store.rs"]
pub mod giveaways;

#[path = "settings/sqlite_store.rs"]
pub mod settings;

#[path = "invites/sqlite_store.rs"]
pub mod invites;

#[path = "eval/http_evaluator.rs"]
pub mod eval;
