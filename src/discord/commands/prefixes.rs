use crate::core::custom_commands::split_arguments;
use crate::core::formatting::pluralize;
use crate::discord::data::{colors, guild_id};
use crate::discord::prompt::confirm;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Quoted runs stay together so prefixes may contain spaces.
fn parse_prefixes(text: Option<String>) -> Vec<String> {
    text.as_deref().map(split_arguments).unwrap_or_default()
}

fn quoted(prefix: &str) -> String {
    format!("'{prefix}'")
}

/// View your server's prefixes.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("pf", "prefixes", "pref"),
    subcommands("add", "remove", "clear", "overwrite")
)]
pub async fn prefix(ctx: Context<'_>) -> Result<(), Error> {
    let prefixes = ctx.data().settings.guild(guild_id(&ctx)?).await?.prefixes;
    if prefixes.is_empty() {
        ctx.say(format!(
            "No prefixes set for this server. Add one with `{}prefix add <prefix>`.\n*I will always respond to mentions.*",
            ctx.prefix()
        ))
        .await?;
        return Ok(());
    }

    let (guild_name, icon) = ctx
        .guild()
        .map(|g| (g.name.clone(), g.icon_url()))
        .unwrap_or_default();

    let mut author = serenity::CreateEmbedAuthor::new(format!("Prefixes for {guild_name}"));
    if let Some(icon) = icon {
        author = author.icon_url(icon);
    }

    let embed = serenity::CreateEmbed::new()
        .author(author)
        .color(colors::PRIMARY)
        .timestamp(serenity::Timestamp::now())
        .description(prefixes.join("\n"))
        .footer(serenity::CreateEmbedFooter::new(pluralize(&format!(
            "{} prefix(es)",
            prefixes.len()
        ))));

    ctx.send(
        poise::CreateReply::default()
            .content("*I will always respond to mentions.*")
            .embed(embed)
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// Add prefixes to your server.
///
/// Separate several with spaces and quote ones containing a space,
/// e.g. `prefix add ! ? "lambda "`.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("create", "+", "append", "new", "update")
)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Prefixes to add, separated by spaces"]
    #[rest]
    prefixes: Option<String>,
) -> Result<(), Error> {
    let prefixes = parse_prefixes(prefixes);
    ctx.data()
        .settings
        .add_prefixes(guild_id(&ctx)?, &prefixes)
        .await?;

    let message = match prefixes.as_slice() {
        [only] => format!("Added {} as a prefix.", quoted(only)),
        _ => format!("Added {} prefixes.", prefixes.len()),
    };
    ctx.say(message).await?;
    Ok(())
}

/// Remove prefixes from your server.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("delete", "-", "del", "rm")
)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Prefixes to remove, separated by spaces"]
    #[rest]
    prefixes: Option<String>,
) -> Result<(), Error> {
    let prefixes = parse_prefixes(prefixes);
    let removed = ctx
        .data()
        .settings
        .remove_prefixes(guild_id(&ctx)?, &prefixes)
        .await?;

    let message = match (removed, prefixes.as_slice()) {
        (0, _) => "No prefixes were removed. (None of your prefixes were valid)".to_string(),
        (_, [only]) => format!("Removed prefix {}.", quoted(only)),
        _ => format!("Removed {removed} prefixes."),
    };
    ctx.say(message).await?;
    Ok(())
}

/// Clear all of your server's prefixes.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("wipe")
)]
pub async fn clear(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let settings = &ctx.data().settings;
    if settings.guild(guild_id).await?.prefixes.is_empty() {
        ctx.say("No prefixes to clear.").await?;
        return Ok(());
    }

    let bot_id = ctx.framework().bot_id;
    let question = format!(
        "Are you sure you want to clear all of your prefixes?\n\
         If so, you *must* prefix all commands with my mention (<@{bot_id}>) in order to use commands."
    );
    if !confirm(ctx, question).await?.accepted() {
        ctx.say("Cancelled.").await?;
        return Ok(());
    }

    let before = settings.clear_prefixes(guild_id).await?;
    ctx.say(pluralize(&format!("Removed {before} prefix(es)."))).await?;
    Ok(())
}

/// Replace your server's prefixes with the given ones.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("set", "override")
)]
pub async fn overwrite(
    ctx: Context<'_>,
    #[description = "Prefixes to set, separated by spaces"]
    #[rest]
    prefixes: Option<String>,
) -> Result<(), Error> {
    let prefixes = parse_prefixes(prefixes);
    ctx.data()
        .settings
        .overwrite_prefixes(guild_id(&ctx)?, &prefixes)
        .await?;

    let message = match prefixes.as_slice() {
        [only] => format!("Set {} as the only prefix.", quoted(only)),
        _ => format!("Set {} prefixes.", prefixes.len()),
    };
    ctx.say(message).await?;
    Ok(())
}
