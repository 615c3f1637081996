// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite, the code evaluator)
// - `discord/` = Discord-specific adapters (commands, events, timers)
//
// This file loads configuration, wires the services together and hands
// them to the poise framework.

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
use crate::core::custom_commands::CustomCommandService;
use crate::core::giveaways::GiveawayService;
use crate::core::invites::InviteService;
use crate::core::leveling::LevelingService;
use crate::core::reminders::ReminderService;
use crate::core::settings::{strip_prefix, SettingsService};
use crate::core::tags::{PythonTagRunner, TagRegistry};
use crate::core::timers::TimerManager;
use crate::discord::timer_dispatcher::TimerDispatcher;
use crate::discord::commands::giveaways;
use crate::discord::{
    commands, custom_command_dispatch, errors, invite_tracking, leveling_announcements,
};
use crate::discord::{Data, Error};
use crate::infra::custom_commands::SqliteCustomCommandStore;
use crate::infra::database::Database;
use crate::infra::eval::HttpCodeEvaluator;
use crate::infra::giveaways::SqliteGiveawayStore;
use crate::infra::invites::SqliteInviteStore;
use crate::infra::leveling::SqliteLevelingStore;
use crate::infra::settings::SqliteSettingsStore;
use crate::infra::timers::SqliteTimerStore;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if new_message.author.bot {
                return Ok(());
            }

            if let Err(e) =
                custom_command_dispatch::handle_message(ctx, framework, data, new_message).await
            {
                tracing::warn!(
                    message_id = new_message.id.get(),
                    "Custom command failed: {}",
                    e
                );
                let _ = new_message.reply(ctx, e.to_string()).await;
            }

            if let Err(e) = leveling_announcements::handle_message(ctx, data, new_message).await {
                tracing::error!("Failed to process leveling for message: {}", e);
            }
        }
        serenity::FullEvent::GuildCreate { guild, .. } => {
            invite_tracking::snapshot(ctx, data, guild.id).await;
        }
        serenity::FullEvent::InviteCreate { data: invite } => {
            invite_tracking::handle_invite_create(data, invite);
        }
        serenity::FullEvent::InviteDelete { data: invite } => {
            invite_tracking::handle_invite_delete(data, invite);
        }
        serenity::FullEvent::ChannelDelete { channel, .. } => {
            invite_tracking::handle_channel_delete(data, channel);
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = invite_tracking::handle_member_join(ctx, data, new_member).await {
                tracing::warn!(
                    guild_id = new_member.guild_id.get(),
                    "Failed to post invite tracking message: {}",
                    e
                );
            }
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            if let Err(e) = data
                .leveling
                .handle_member_leave(guild_id.get(), user.id.get())
                .await
            {
                tracing::error!("Failed to clean up leveling for departed member: {}", e);
            }
        }
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => {
            if let Err(e) = giveaways::handle_component(ctx, data, component).await {
                tracing::warn!(
                    custom_id = %component.data.custom_id,
                    "Giveaway button failed: {}",
                    e
                );
            }
        }
        serenity::FullEvent::Ready { data_about_bot } => {
            tracing::info!("Logged in as {}", data_about_bot.user.name);
        }
        _ => {}
    }
    Ok(())
}

/// Guild prefixes for poise's own commands. Mentions are handled by poise.
fn strip_guild_prefix<'a>(
    _ctx: &'a serenity::Context,
    message: &'a serenity::Message,
    data: &'a Data,
) -> poise::BoxFuture<'a, Result<Option<(&'a str, &'a str)>, Error>> {
    Box::pin(async move {
        let prefixes = data
            .settings
            .resolve_prefixes(message.guild_id.map(|g| g.get()))
            .await?;
        Ok(strip_prefix(&message.content, &prefixes))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = BotConfig::from_env()?;

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data directory {}", config.data_dir.display()))?;

    let database = Database::connect(&config.database_url)
        .await
        .context("Failed to open the database")?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let command_list = commands::all();
    let reserved = commands::reserved_names(&command_list);

    let (timer_manager, expired_timers) = TimerManager::new(SqliteTimerStore::new(database.pool()));
    let timers = Arc::new(timer_manager);

    let giveaways = Arc::new(GiveawayService::new(
        SqliteGiveawayStore::new(database.pool()),
        Arc::clone(&timers),
    ));
    let active = giveaways.load().await.context("Failed to load giveaways")?;
    tracing::info!(count = active.len(), "Loaded active giveaways");

    let invites = Arc::new(InviteService::new(SqliteInviteStore::new(database.pool())));
    let tracked = invites.load().await.context("Failed to load invite tracking")?;
    tracing::info!(count = tracked.len(), "Loaded invite tracking channels");

    let evaluator = HttpCodeEvaluator::new(config.eval_endpoint.clone())
        .context("Failed to create the code evaluator client")?;

    let data = Data {
        settings: Arc::new(SettingsService::new(
            SqliteSettingsStore::new(database.pool()),
            config.default_prefix.clone(),
        )),
        custom_commands: Arc::new(
            CustomCommandService::new(SqliteCustomCommandStore::new(database.pool()))
                .with_reserved_names(&reserved),
        ),
        leveling: Arc::new(LevelingService::new(SqliteLevelingStore::new(database.pool()))),
        reminders: Arc::new(ReminderService::new(Arc::clone(&timers))),
        giveaways,
        invites,
        tags: Arc::new(TagRegistry::with_defaults()),
        python: Arc::new(PythonTagRunner::new(evaluator)),
    };

    tokio::spawn(Arc::clone(&timers).run());

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_INVITES;

    let owners = config
        .owner_id
        .map(serenity::UserId::new)
        .into_iter()
        .collect();
    let test_guild = config.test_guild.map(serenity::GuildId::new);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: command_list,
            prefix_options: poise::PrefixFrameworkOptions {
                stripped_dynamic_prefix: Some(strip_guild_prefix),
                mention_as_prefix: true,
                case_insensitive_commands: true,
                ..Default::default()
            },
            owners,
            on_error: |error| Box::pin(errors::on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    tracing::debug!(
                        command = %ctx.command().qualified_name,
                        user = ctx.author().id.get(),
                        "Running command"
                    );
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                match test_guild {
                    // Guild registration shows up instantly, global can take up to an hour.
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id)
                            .await?
                    }
                    None => poise::builtins::register_globally(ctx, &framework.options().commands).await?,
                }
                tracing::info!("Commands registered");

                tokio::spawn(TimerDispatcher::new(ctx.http.clone(), data.clone()).run(expired_timers));

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
