// Custom command management. Running custom commands lives in
// `custom_command_dispatch`.

use crate::core::custom_commands::{CustomCommand, NewCustomCommand, ToggleMode, Toggles};
use crate::core::formatting::{cutoff, escape_markdown, pluralize, strip_codeblock};
use crate::discord::custom_command_dispatch::invoker_for;
use crate::discord::data::{colors, guild_id};
use crate::discord::flags::{parse_flags, FlagSpec};
use crate::discord::pagination::{FieldPaginator, PageField};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

const CREATE_FLAGS: &[FlagSpec] = &[
    FlagSpec::value("permissions", 'p'),
    FlagSpec::value("whitelist", 'w'),
    FlagSpec::value("blacklist", 'b'),
    FlagSpec::switch("python", 'y'),
];

/// Interface around the custom command system.
///
/// Without a subcommand this lists the server's custom commands.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "custom-commands",
    aliases("custom-command", "cc", "ccmd", "ccmds"),
    subcommands("list", "create", "delete", "edit", "info", "raw")
)]
pub async fn custom_commands(ctx: Context<'_>) -> Result<(), Error> {
    show_list(ctx).await
}

/// List the custom commands of this server.
#[poise::command(slash_command, prefix_command, guild_only, aliases("all", "ls"))]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    show_list(ctx).await
}

async fn show_list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let (guild_name, guild_icon) = ctx
        .guild()
        .map(|g| (g.name.clone(), g.icon_url()))
        .unwrap_or_default();

    let mut author = serenity::CreateEmbedAuthor::new(format!("Custom Commands for {guild_name}"));
    if let Some(icon) = guild_icon {
        author = author.icon_url(icon);
    }
    let embed = serenity::CreateEmbed::new()
        .author(author)
        .color(colors::PRIMARY)
        .timestamp(serenity::Timestamp::now());

    let commands = ctx.data().custom_commands.list(guild_id).await?;
    if commands.is_empty() {
        let embed = embed.description(format!(
            "No custom commands have been set up yet.\nUse `{}custom-commands create` to make a custom command.",
            ctx.prefix()
        ));
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        return Ok(());
    }

    let embed = embed.footer(serenity::CreateEmbedFooter::new(pluralize(&format!(
        "{} command(s)",
        commands.len()
    ))));
    let fields = commands.iter().map(list_field).collect();

    FieldPaginator::new(embed, fields).per_page(6).send(ctx, None).await
}

fn list_field(command: &CustomCommand) -> PageField {
    let name = format!(
        "**{}** (Created <t:{}:R>)",
        escape_markdown(&command.name),
        command.created_at.timestamp()
    );
    let value = if command.is_python {
        "*Python-based Response*".to_string()
    } else {
        format!("Response: {}", cutoff(&command.response, 50, false))
    };
    PageField::new(name, value)
}

/// Create a custom command in one message.
///
/// Flags: `--permissions <perms...>`, `--whitelist <users/roles/channels...>`,
/// `--blacklist <users/roles/channels...>` and `--python`.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("add", "quick", "+")
)]
pub async fn create(
    ctx: Context<'_>,
    #[description = "Name of the command"] name: String,
    #[description = "Response, followed by any flags"]
    #[rest]
    response: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let flags = parse_flags(&response, CREATE_FLAGS)?;

    let whitelist = flags.value("whitelist");
    let blacklist = flags.value("blacklist");
    if whitelist.is_some() && blacklist.is_some() {
        ctx.say("Cannot use both `--whitelist` and `--blacklist`").await?;
        return Ok(());
    }

    let is_python = flags.is_set("python");
    let response = if is_python {
        strip_codeblock(&flags.positional)
    } else {
        flags.positional.clone()
    };
    if response.is_empty() {
        ctx.say("Please provide a response for the custom command.").await?;
        return Ok(());
    }

    let name = ctx.data().custom_commands.validate_name(&name)?;

    let required_permissions = match flags.value("permissions") {
        Some(list) => authorized_permissions(ctx, guild_id, list).await?,
        None => serenity::Permissions::empty(),
    };

    let toggles = match (whitelist, blacklist) {
        (Some(list), _) => Some(resolve_toggles(ctx, guild_id, list, ToggleMode::Whitelist)?),
        (_, Some(list)) => Some(resolve_toggles(ctx, guild_id, list, ToggleMode::Blacklist)?),
        _ => None,
    };

    let command = ctx
        .data()
        .custom_commands
        .add(
            guild_id,
            NewCustomCommand {
                name,
                response,
                is_python,
                required_permissions: required_permissions.bits(),
                toggles,
            },
        )
        .await?;

    ctx.say(format!("Successfully created custom command `{}`.", command.name))
        .await?;
    Ok(())
}

/// Digits are raw permission bits; names are case-insensitive and may use
/// spaces, e.g. `manage messages` or `Manage Server`.
pub fn parse_permission(argument: &str) -> Option<serenity::Permissions> {
    let argument = argument.trim();
    if !argument.is_empty() && argument.bytes().all(|b| b.is_ascii_digit()) {
        return argument
            .parse::<u64>()
            .ok()
            .map(serenity::Permissions::from_bits_truncate);
    }

    let name = argument
        .to_lowercase()
        .replace(' ', "_")
        .replace("server", "guild")
        .to_uppercase();
    serenity::Permissions::from_name(&name)
}

/// Parse a permission list, refusing permissions the author lacks.
async fn authorized_permissions(
    ctx: Context<'_>,
    guild_id: u64,
    list: &str,
) -> Result<serenity::Permissions, Error> {
    let member = ctx.author_member().await.ok_or("Could not load your member data")?;
    let invoker = invoker_for(
        ctx.serenity_context(),
        serenity::GuildId::new(guild_id),
        ctx.channel_id(),
        &member,
    );
    let authorized = serenity::Permissions::from_bits_truncate(invoker.permissions);

    let mut permissions = serenity::Permissions::empty();
    for argument in list.split_whitespace() {
        let permission = parse_permission(argument)
            .ok_or_else(|| format!("invalid permission: '{argument}'"))?;
        if !invoker.is_administrator && !authorized.contains(permission) {
            return Err(
                format!("you do not have the '{argument}' permission so you cannot use it.").into(),
            );
        }
        permissions |= permission;
    }
    Ok(permissions)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entity {
    User(u64),
    Role(u64),
    Channel(u64),
}

/// Mentions are unambiguous. A bare ID is a role or channel if the guild has
/// one with that ID, otherwise a user.
fn parse_entity(
    token: &str,
    is_role: impl Fn(u64) -> bool,
    is_channel: impl Fn(u64) -> bool,
) -> Option<Entity> {
    let inner = token.strip_prefix('<').and_then(|t| t.strip_suffix('>'));
    if let Some(inner) = inner {
        if let Some(id) = inner.strip_prefix("@&") {
            return id.parse().ok().map(Entity::Role);
        }
        if let Some(id) = inner.strip_prefix('#') {
            return id.parse().ok().map(Entity::Channel);
        }
        if let Some(id) = inner.strip_prefix('@') {
            let id = id.strip_prefix('!').unwrap_or(id);
            return id.parse().ok().map(Entity::User);
        }
        return None;
    }

    let id: u64 = token.parse().ok()?;
    Some(if is_role(id) {
        Entity::Role(id)
    } else if is_channel(id) {
        Entity::Channel(id)
    } else {
        Entity::User(id)
    })
}

fn resolve_toggles(
    ctx: Context<'_>,
    guild_id: u64,
    list: &str,
    mode: ToggleMode,
) -> Result<Toggles, Error> {
    let guild = ctx
        .serenity_context()
        .cache
        .guild(serenity::GuildId::new(guild_id))
        .ok_or("This server is not cached yet, try again in a moment.")?;

    let mut toggles = Toggles {
        mode,
        users: Vec::new(),
        roles: Vec::new(),
        channels: Vec::new(),
    };
    for token in list.split_whitespace() {
        let entity = parse_entity(
            token,
            |id| guild.roles.contains_key(&serenity::RoleId::new(id)),
            |id| guild.channels.contains_key(&serenity::ChannelId::new(id)),
        )
        .ok_or_else(|| format!("Could not find a member, role or channel from '{token}'."))?;

        match entity {
            Entity::User(id) => toggles.users.push(id),
            Entity::Role(id) => toggles.roles.push(id),
            Entity::Channel(id) => toggles.channels.push(id),
        }
    }
    Ok(toggles)
}

/// Delete one or more custom commands, separated by space.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("remove", "rm", "del", "-")
)]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Names of the commands to delete"]
    #[rest]
    names: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let names: Vec<String> = names
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(|n| n.to_lowercase())
        .collect();

    if names.is_empty() {
        ctx.say("Please provide custom commands to delete.").await?;
        return Ok(());
    }

    let count = ctx.data().custom_commands.delete_many(guild_id, &names).await?;
    ctx.say(delete_summary(count, &names)).await?;
    Ok(())
}

fn delete_summary(count: u64, names: &[String]) -> String {
    let requested = names.len() as u64;
    match count {
        0 => "No custom commands were deleted. Make sure the commands were made in this server."
            .to_string(),
        c if c < requested => format!(
            "Successfully deleted {c} out of the {requested} specified custom commands."
        ),
        1 => format!("Successfully deleted the custom command '{}'.", names[0]),
        c => format!("Successfully deleted {c} custom commands."),
    }
}

/// Edit a custom command's response.
///
/// To switch between a tag and a Python response, delete the command and create it again.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("edit-response", "modify", "change", "update", "e", "~")
)]
pub async fn edit(
    ctx: Context<'_>,
    #[description = "Name of the command"] name: String,
    #[description = "The new response"]
    #[rest]
    response: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let custom_commands = &ctx.data().custom_commands;
    let command = custom_commands.fetch(guild_id, &name).await?;

    let response = if command.is_python {
        strip_codeblock(&response)
    } else {
        response
    };
    custom_commands
        .edit_response(guild_id, &command.name, &response)
        .await?;

    ctx.say(format!("Successfully modified custom command '{}'.", command.name))
        .await?;
    Ok(())
}

/// View information about a custom command.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    aliases("i", "view", "v", "information", "details")
)]
pub async fn info(
    ctx: Context<'_>,
    #[description = "Name of the command"] name: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let command = ctx.data().custom_commands.fetch(guild_id, &name).await?;

    let member = ctx.author_member().await.ok_or("Could not load your member data")?;
    let invoker = invoker_for(
        ctx.serenity_context(),
        serenity::GuildId::new(guild_id),
        ctx.channel_id(),
        &member,
    );
    let able = if command.can_run(&invoker) { "" } else { "un" };
    let created = command.created_at.timestamp();

    let mut embed = serenity::CreateEmbed::new()
        .title(&command.name)
        .color(colors::PRIMARY)
        .timestamp(serenity::Timestamp::now())
        .description(format!("You are {able}able to run this command."))
        .field("Created", format!("<t:{created}:f> (<t:{created}:R>)"), true);

    let permissions = serenity::Permissions::from_bits_truncate(command.required_permissions);
    if !permissions.is_empty() {
        embed = embed.field(
            "Required Permissions",
            permissions.get_permission_names().join(", "),
            false,
        );
    }

    let kind = match command.toggle_mode() {
        ToggleMode::Whitelist => "Whitelisted",
        ToggleMode::Blacklist => "Blacklisted",
    };
    let toggled = [
        ("Users", mention_list(&command.toggled_users, "<@", ">")),
        ("Roles", mention_list(&command.toggled_roles, "<@&", ">")),
        ("Channels", mention_list(&command.toggled_channels, "<#", ">")),
    ];
    for (what, mentions) in toggled {
        if let Some(mentions) = mentions {
            embed = embed.field(format!("{kind} {what}"), mentions, false);
        }
    }

    let response = if command.is_python {
        format!(
            "*Python-based response*\nSee `{}cc raw {}` for the source code of this command.",
            ctx.prefix(),
            command.name
        )
    } else {
        cutoff(&command.response, 1000, false)
    };
    embed = embed.field("Response", response, false);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn mention_list(ids: &[u64], open: &str, close: &str) -> Option<String> {
    (!ids.is_empty()).then(|| {
        ids.iter()
            .map(|id| format!("{open}{id}{close}"))
            .collect::<Vec<_>>()
            .join(", ")
    })
}

/// View the raw response of a custom command.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    aliases("source", "s", "src", "response")
)]
pub async fn raw(
    ctx: Context<'_>,
    #[description = "Name of the command"] name: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let command = ctx.data().custom_commands.fetch(guild_id, &name).await?;

    ctx.send(
        poise::CreateReply::default()
            .content(raw_source(&command))
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

fn raw_source(command: &CustomCommand) -> String {
    if command.is_python {
        // Leave room for the fences so the block stays closed.
        let body = cutoff(&command.response, 2000 - 10, true);
        format!("```py\n{body}```")
    } else {
        cutoff(&escape_markdown(&command.response), 2000, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn command(response: &str, is_python: bool) -> CustomCommand {
        CustomCommand {
            name: "greet".into(),
            guild_id: 1,
            response: response.into(),
            is_python,
            required_permissions: 0,
            toggled_users: Vec::new(),
            toggled_roles: Vec::new(),
            toggled_channels: Vec::new(),
            is_whitelist_toggle: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn permission_names_are_forgiving() {
        assert_eq!(
            parse_permission("Manage Server"),
            Some(serenity::Permissions::MANAGE_GUILD)
        );
        assert_eq!(
            parse_permission("ban_members"),
            Some(serenity::Permissions::BAN_MEMBERS)
        );
        assert_eq!(parse_permission("8"), Some(serenity::Permissions::ADMINISTRATOR));
        assert_eq!(parse_permission("fly"), None);
    }

    #[test]
    fn entities_resolve_by_mention_and_cached_ids() {
        let roles = |id| id == 5;
        let channels = |id| id == 6;
        assert_eq!(parse_entity("<@&9>", roles, channels), Some(Entity::Role(9)));
        assert_eq!(parse_entity("<#9>", roles, channels), Some(Entity::Channel(9)));
        assert_eq!(parse_entity("<@!9>", roles, channels), Some(Entity::User(9)));
        assert_eq!(parse_entity("5", roles, channels), Some(Entity::Role(5)));
        assert_eq!(parse_entity("6", roles, channels), Some(Entity::Channel(6)));
        assert_eq!(parse_entity("7", roles, channels), Some(Entity::User(7)));
        assert_eq!(parse_entity("general", roles, channels), None);
    }

    #[test]
    fn delete_summaries_match_the_outcome() {
        let one = vec!["a".to_string()];
        let three = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert!(delete_summary(0, &three).starts_with("No custom commands were deleted"));
        assert_eq!(
            delete_summary(2, &three),
            "Successfully deleted 2 out of the 3 specified custom commands."
        );
        assert_eq!(delete_summary(1, &one), "Successfully deleted the custom command 'a'.");
        assert_eq!(delete_summary(3, &three), "Successfully deleted 3 custom commands.");
    }

    #[test]
    fn list_fields_hide_python_sources() {
        assert_eq!(list_field(&command("print(1)", true)).value, "*Python-based Response*");
        let long = "x".repeat(80);
        let field = list_field(&command(&long, false));
        assert_eq!(field.value, format!("Response: {}...", "x".repeat(50)));
    }

    #[test]
    fn raw_sources_fit_in_a_message() {
        assert_eq!(raw_source(&command("print(1)", true)), "```py\nprint(1)```");
        assert_eq!(raw_source(&command("**hi**", false)), "\\*\\*hi\\*\\*");
        assert!(raw_source(&command(&"y".repeat(5000), true)).chars().count() <= 2000);
    }
}
