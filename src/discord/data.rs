// Shared state handed to every command and event handler.

use crate::core::custom_commands::CustomCommandService;
use crate::core::giveaways::GiveawayService;
use crate::core::invites::InviteService;
use crate::core::leveling::LevelingService;
use crate::core::reminders::ReminderService;
use crate::core::settings::SettingsService;
use crate::core::tags::{PythonTagRunner, TagRegistry};
use crate::infra::custom_commands::SqliteCustomCommandStore;
use crate::infra::eval::HttpCodeEvaluator;
use crate::infra::giveaways::SqliteGiveawayStore;
use crate::infra::invites::SqliteInviteStore;
use crate::infra::leveling::SqliteLevelingStore;
use crate::infra::settings::SqliteSettingsStore;
use crate::infra::timers::SqliteTimerStore;
use std::sync::Arc;

/// Type alias for our bot's context.
/// This is what every command receives as its first parameter.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub mod colors {
    pub const PRIMARY: u32 = 0x6bcbe8;
    pub const ERROR: u32 = 0xff576a;
}

/// Every field is shared, so clones are cheap.
#[derive(Clone)]
pub struct Data {
    pub settings: Arc<SettingsService<SqliteSettingsStore>>,
    pub custom_commands: Arc<CustomCommandService<SqliteCustomCommandStore>>,
    pub leveling: Arc<LevelingService<SqliteLevelingStore>>,
    pub reminders: Arc<ReminderService<SqliteTimerStore>>,
    pub giveaways: Arc<GiveawayService<SqliteGiveawayStore, SqliteTimerStore>>,
    pub invites: Arc<InviteService<SqliteInviteStore>>,
    pub tags: Arc<TagRegistry>,
    pub python: Arc<PythonTagRunner<HttpCodeEvaluator>>,
}

/// Guild ID of a guild-only command.
pub fn guild_id(ctx: &Context<'_>) -> Result<u64, Error> {
    Ok(ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get())
}
