// Giveaway commands plus the handler for the buttons on giveaway messages.

use crate::core::formatting::{cutoff, parse_interval, pluralize};
use crate::core::giveaways::{check_host_permission, ends_at, validate_options, GiveawayOptions};
use crate::discord::custom_command_dispatch::invoker_for;
use crate::discord::data::{colors, guild_id};
use crate::discord::flags::{parse_flags, FlagSpec};
use crate::discord::{Context, Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;

pub const ENTER_BUTTON_ID: &str = "giveaway:enter";
const LEAVE_BUTTON_PREFIX: &str = "giveaway:leave:";

const CREATE_FLAGS: &[FlagSpec] = &[
    FlagSpec::value("winners", 'w'),
    FlagSpec::value("message", 'm'),
    FlagSpec::value("level", 'l'),
    FlagSpec::value("roles", 'r'),
];

/// Commands for creating, handling, and managing giveaways.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("g", "gw", "gaw", "giveaways"),
    subcommands("role", "create", "end")
)]
pub async fn giveaway(ctx: Context<'_>) -> Result<(), Error> {
    let prefix = ctx.prefix();
    ctx.say(format!(
        "`{prefix}giveaway create <duration> <prize> [--winners N] [--message text] [--level N] [--roles @role...]`\n\
         `{prefix}giveaway end` (reply to the giveaway message)\n\
         `{prefix}giveaway role <role>`"
    ))
    .await?;
    Ok(())
}

/// Set the role that, besides Manage Server, lets members create giveaways.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("setrole", "giveawayrole")
)]
pub async fn role(
    ctx: Context<'_>,
    #[description = "Role allowed to create giveaways"] role: serenity::Role,
) -> Result<(), Error> {
    ctx.data()
        .settings
        .set_giveaway_role(guild_id(&ctx)?, Some(role.id.get()))
        .await?;

    ctx.send(
        poise::CreateReply::default()
            .content(format!(
                "Giveaway role set to <@&{}>. Users with this role will be able to create giveaways.",
                role.id
            ))
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// `<@&id>` or a bare ID.
fn parse_role(token: &str) -> Option<u64> {
    let id = token
        .strip_prefix("<@&")
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(token);
    id.parse().ok().filter(|id| *id != 0)
}

/// Turn `<duration> <prize> [flags]` into giveaway options.
pub fn parse_create_args(text: &str) -> Result<GiveawayOptions, Error> {
    let flags = parse_flags(text, CREATE_FLAGS)?;

    let (duration, prize) = flags
        .positional
        .split_once(char::is_whitespace)
        .ok_or("Please provide a duration and a prize, e.g. `1d Discord Nitro`.")?;
    let interval = parse_interval(duration)
        .filter(|found| found.start == 0 && found.end == duration.len())
        .ok_or_else(|| format!("'{duration}' is not a valid duration. Try something such as `1h30m`."))?;

    let winners = match flags.value("winners") {
        Some(w) => w.parse().map_err(|_| "The number of winners must be a whole number.")?,
        None => 1,
    };
    let level = match flags.value("level") {
        Some(l) => l.parse().map_err(|_| "The level requirement must be a whole number.")?,
        None => 0,
    };

    let mut roles = Vec::new();
    for token in flags.value("roles").unwrap_or_default().split_whitespace() {
        let id = parse_role(token).ok_or_else(|| format!("'{token}' is not a role."))?;
        if !roles.contains(&id) {
            roles.push(id);
        }
    }

    Ok(GiveawayOptions {
        duration: interval.duration,
        prize: prize.trim().to_string(),
        winners,
        message: flags.value("message").map(str::to_string),
        level,
        roles,
    })
}

fn giveaway_embed(options: &GiveawayOptions, host_id: u64, ends: i64) -> serenity::CreateEmbed {
    let mut description = format!("\u{23f3} Giveaway ends <t:{ends}:R>");
    if let Some(message) = &options.message {
        description.push_str(&format!("\n\u{1f4e3} *{message}*"));
    }

    let mut embed = serenity::CreateEmbed::new()
        .author(serenity::CreateEmbedAuthor::new(&options.prize))
        .color(colors::PRIMARY)
        .timestamp(serenity::Timestamp::now())
        .description(description)
        .footer(serenity::CreateEmbedFooter::new(pluralize(&format!(
            "{} winner(s)",
            options.winners
        ))))
        .field("Hosted by", format!("<@{host_id}>"), true);

    if options.level > 0 {
        embed = embed.field("Level requirement", options.level.to_string(), true);
    }
    if !options.roles.is_empty() {
        let roles: Vec<String> = options.roles.iter().map(|id| format!("- <@&{id}>")).collect();
        embed = embed.field(
            "You must have one of these roles:",
            cutoff(&roles.join("\n"), 1024, true),
            false,
        );
    }
    embed
}

fn enter_button() -> serenity::CreateActionRow {
    serenity::CreateActionRow::Buttons(vec![serenity::CreateButton::new(ENTER_BUTTON_ID)
        .label("Enter Giveaway")
        .style(serenity::ButtonStyle::Primary)
        .emoji('\u{1f389}')])
}

/// Start a giveaway.
///
/// Examples: `giveaway create 1d Discord Nitro`,
/// `giveaway create 30s Flash giveaway --winners 2 --level 5`.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("c", "new", "start", "s", "+")
)]
pub async fn create(
    ctx: Context<'_>,
    #[description = "<duration> <prize> [--winners N] [--message text] [--level N] [--roles @role...]"]
    #[rest]
    details: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let data = ctx.data();

    let member = ctx.author_member().await.ok_or("Could not load your member data")?;
    let invoker = invoker_for(
        ctx.serenity_context(),
        serenity::GuildId::new(guild_id),
        ctx.channel_id(),
        &member,
    );
    let giveaway_role = data.settings.guild(guild_id).await?.giveaway_role_id;
    let manage_guild = invoker.is_administrator
        || serenity::Permissions::from_bits_truncate(invoker.permissions).manage_guild();
    check_host_permission(manage_guild, &invoker.role_ids, giveaway_role)?;

    let options = parse_create_args(&details)?;
    validate_options(&options)?;

    let ends = ends_at(Utc::now(), options.duration);
    let embed = giveaway_embed(&options, ctx.author().id.get(), ends.timestamp());

    let mut message = ctx
        .channel_id()
        .send_message(
            ctx,
            serenity::CreateMessage::new()
                .content("\u{1f389}\u{1f389} **GIVEAWAY** \u{1f389}\u{1f389}")
                .embed(embed),
        )
        .await?;

    let giveaway = data
        .giveaways
        .create(guild_id, message.channel_id.get(), message.id.get(), &options, ends)
        .await?;
    tracing::debug!(id = giveaway.id(), "Giveaway message sent");

    message
        .edit(ctx, serenity::EditMessage::new().components(vec![enter_button()]))
        .await?;

    match ctx {
        poise::Context::Prefix(prefix) => {
            if let Err(e) = prefix.msg.delete(ctx).await {
                tracing::debug!("Could not delete giveaway command message: {}", e);
            }
        }
        poise::Context::Application(_) => {
            ctx.send(
                poise::CreateReply::default()
                    .content("Giveaway started!")
                    .ephemeral(true),
            )
            .await?;
        }
    }
    Ok(())
}

/// End a giveaway early. Reply to the giveaway message, or give its ID.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("stop", "cancel", "delete", "remove", "-", "e")
)]
pub async fn end(
    ctx: Context<'_>,
    #[description = "ID of the giveaway message"] message_id: Option<serenity::MessageId>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let referenced = match ctx {
        poise::Context::Prefix(prefix) => prefix
            .msg
            .message_reference
            .as_ref()
            .and_then(|r| r.message_id),
        poise::Context::Application(_) => None,
    };
    let Some(message_id) = message_id.or(referenced) else {
        ctx.say("You must reply to the giveaway message to end it.").await?;
        return Ok(());
    };

    let data = ctx.data();
    let member = ctx.author_member().await.ok_or("Could not load your member data")?;
    let invoker = invoker_for(
        ctx.serenity_context(),
        serenity::GuildId::new(guild_id),
        ctx.channel_id(),
        &member,
    );
    let giveaway_role = data.settings.guild(guild_id).await?.giveaway_role_id;
    let manage_guild = invoker.is_administrator
        || serenity::Permissions::from_bits_truncate(invoker.permissions).manage_guild();
    check_host_permission(manage_guild, &invoker.role_ids, giveaway_role)?;

    data.giveaways
        .end_early(ctx.channel_id().get(), message_id.get())
        .await?;

    match ctx {
        poise::Context::Prefix(prefix) => {
            prefix.msg.react(ctx, '\u{1f44d}').await?;
        }
        poise::Context::Application(_) => {
            ctx.send(
                poise::CreateReply::default()
                    .content("Ending the giveaway.")
                    .ephemeral(true),
            )
            .await?;
        }
    }
    Ok(())
}

// ============================================================================
// BUTTONS
// ============================================================================

fn ephemeral(content: impl Into<String>) -> serenity::CreateInteractionResponse {
    serenity::CreateInteractionResponse::Message(
        serenity::CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
}

/// Handle a press on a giveaway button. Returns `false` for other buttons.
pub async fn handle_component(
    ctx: &serenity::Context,
    data: &Data,
    interaction: &serenity::ComponentInteraction,
) -> Result<bool, Error> {
    let custom_id = interaction.data.custom_id.as_str();
    if custom_id == ENTER_BUTTON_ID {
        enter(ctx, data, interaction).await?;
        return Ok(true);
    }
    if let Some(id) = custom_id.strip_prefix(LEAVE_BUTTON_PREFIX) {
        let id = id.parse::<i64>().map_err(|_| "Malformed giveaway button")?;
        leave(ctx, data, interaction, id).await?;
        return Ok(true);
    }
    Ok(false)
}

async fn enter(
    ctx: &serenity::Context,
    data: &Data,
    interaction: &serenity::ComponentInteraction,
) -> Result<(), Error> {
    let Some(giveaway) = data
        .giveaways
        .lookup(interaction.channel_id.get(), interaction.message.id.get())
    else {
        interaction
            .create_response(ctx, ephemeral("This giveaway has already ended."))
            .await?;
        return Ok(());
    };

    let user_id = interaction.user.id.get();
    let roles: Vec<u64> = interaction
        .member
        .as_ref()
        .map(|m| m.roles.iter().map(|r| r.get()).collect())
        .unwrap_or_default();
    let level = if giveaway.level_requirement > 0 {
        data.leveling.record(giveaway.guild_id, user_id).await?.level
    } else {
        0
    };

    let response = match data.giveaways.enter(&giveaway, user_id, level, &roles).await {
        Ok(entrants) => serenity::CreateInteractionResponse::Message(
            serenity::CreateInteractionResponseMessage::new()
                .content(format!(
                    "Entered the giveaway for **{}**! Entrants: **{}**",
                    giveaway.prize,
                    crate::core::formatting::format_thousands(entrants as f64)
                ))
                .components(vec![serenity::CreateActionRow::Buttons(vec![
                    serenity::CreateButton::new(format!("{LEAVE_BUTTON_PREFIX}{}", giveaway.id()))
                        .label("Leave Giveaway")
                        .style(serenity::ButtonStyle::Danger),
                ])])
                .ephemeral(true),
        ),
        Err(e @ crate::core::giveaways::GiveawayError::StorageError(_)) => return Err(e.into()),
        Err(e) => ephemeral(e.to_string()),
    };

    interaction.create_response(ctx, response).await?;
    Ok(())
}

async fn leave(
    ctx: &serenity::Context,
    data: &Data,
    interaction: &serenity::ComponentInteraction,
    giveaway_id: i64,
) -> Result<(), Error> {
    let content = match data.giveaways.get(giveaway_id) {
        Some(giveaway) => {
            data.giveaways.leave(&giveaway, interaction.user.id.get()).await?;
            format!("You left the giveaway for **{}**.", giveaway.prize)
        }
        None => "This giveaway has already ended.".to_string(),
    };

    interaction
        .create_response(
            ctx,
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .content(content)
                    .components(Vec::new()),
            ),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn create_args_split_duration_prize_and_flags() {
        let options =
            parse_create_args("1h30m Discord Nitro --winners 2 --level 5 --roles <@&10> 11 <@&10>")
                .unwrap();
        assert_eq!(options.duration, Duration::from_secs(5400));
        assert_eq!(options.prize, "Discord Nitro");
        assert_eq!(options.winners, 2);
        assert_eq!(options.level, 5);
        assert_eq!(options.roles, vec![10, 11]);
        assert_eq!(options.message, None);
    }

    #[test]
    fn defaults_are_one_winner_and_no_requirements() {
        let options = parse_create_args("30s Flash giveaway -m Thanks\nfor being here").unwrap();
        assert_eq!(options.winners, 1);
        assert_eq!(options.level, 0);
        assert!(options.roles.is_empty());
        assert_eq!(options.message.as_deref(), Some("Thanks\nfor being here"));
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(parse_create_args("1d").is_err());
        assert!(parse_create_args("soon Nitro").is_err());
        assert!(parse_create_args("1d Nitro --winners two").is_err());
        assert!(parse_create_args("1d Nitro --roles everyone").is_err());
    }

    #[test]
    fn role_tokens_accept_mentions_and_ids() {
        assert_eq!(parse_role("<@&42>"), Some(42));
        assert_eq!(parse_role("42"), Some(42));
        assert_eq!(parse_role("<@42>"), None);
        assert_eq!(parse_role("0"), None);
    }
}
