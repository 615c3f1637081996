// Runs custom commands invoked with one of the guild's prefixes.

use crate::core::custom_commands::{prepare_invocation, CustomCommand, Invoker};
use crate::core::settings::strip_prefix;
use crate::core::tags::{
    render, Environment, LevelSnapshot, PythonTagContext, PythonTagOutcome, TagUser,
};
use crate::discord::tags::{
    python_channel, python_guild, resolve_member_id, send_tag_message, tag_user_from_member,
    CacheDirectory,
};
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Split `content` into `(name, argument text)` if it starts with a prefix.
pub fn split_invocation<'a>(content: &'a str, prefixes: &[String]) -> Option<(&'a str, &'a str)> {
    let (_, rest) = strip_prefix(content, prefixes)?;
    let rest = rest.trim_start();
    let (name, args) = match rest.find(char::is_whitespace) {
        Some(at) => (&rest[..at], rest[at..].trim_start()),
        None => (rest, ""),
    };
    (!name.is_empty()).then_some((name, args))
}

fn is_builtin(framework: poise::FrameworkContext<'_, Data, Error>, name: &str) -> bool {
    framework.options().commands.iter().any(|command| {
        command.name.eq_ignore_ascii_case(name)
            || command.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    })
}

/// Prefixes for a guild message, mentions included.
async fn message_prefixes(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: serenity::GuildId,
) -> Result<Vec<String>, Error> {
    let bot_id = ctx.cache.current_user().id;
    let mut prefixes = vec![format!("<@{bot_id}>"), format!("<@!{bot_id}>")];
    prefixes.extend(data.settings.resolve_prefixes(Some(guild_id.get())).await?);
    Ok(prefixes)
}

/// Look for a custom command in `message` and run it.
///
/// Returns whether a custom command was found.
pub async fn handle_message(
    ctx: &serenity::Context,
    framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
    message: &serenity::Message,
) -> Result<bool, Error> {
    let Some(guild_id) = message.guild_id else {
        return Ok(false);
    };
    if message.author.bot {
        return Ok(false);
    }

    let prefixes = message_prefixes(ctx, data, guild_id).await?;
    let Some((name, args)) = split_invocation(&message.content, &prefixes) else {
        return Ok(false);
    };
    if is_builtin(framework, name) {
        return Ok(false);
    }

    let Some(command) = data.custom_commands.get(guild_id.get(), name).await? else {
        return Ok(false);
    };

    tracing::debug!(guild_id = guild_id.get(), name = %command.name, "Running custom command");
    run_custom_command(ctx, data, message, guild_id, &command, args).await?;
    Ok(true)
}

fn member_permissions(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    channel_id: serenity::ChannelId,
    member: &serenity::Member,
) -> serenity::Permissions {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return serenity::Permissions::empty();
    };

    let channel = guild.channels.get(&channel_id).or_else(|| {
        guild
            .threads
            .iter()
            .find(|t| t.id == channel_id)
            .and_then(|t| t.parent_id)
            .and_then(|parent| guild.channels.get(&parent))
    });

    match channel {
        Some(channel) => guild.user_permissions_in(channel, member),
        None if guild.owner_id == member.user.id => serenity::Permissions::all(),
        None => serenity::Permissions::empty(),
    }
}

pub fn invoker_for(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    channel_id: serenity::ChannelId,
    member: &serenity::Member,
) -> Invoker {
    let permissions = member_permissions(ctx, guild_id, channel_id, member);
    Invoker {
        user_id: member.user.id.get(),
        channel_id: channel_id.get(),
        role_ids: member.roles.iter().map(|r| r.get()).collect(),
        permissions: permissions.bits(),
        is_administrator: permissions.administrator(),
    }
}

/// Who runs a tag, where, and with what input.
pub struct TagInvocation<'a> {
    pub message: &'a serenity::Message,
    pub guild_id: Option<serenity::GuildId>,
    pub author: TagUser,
    pub target: Option<TagUser>,
    pub args: Vec<String>,
}

/// Render `content` as tag formatting and reply with the result.
pub async fn execute_tags(
    ctx: &serenity::Context,
    data: &Data,
    invocation: TagInvocation<'_>,
    content: &str,
) -> Result<(), Error> {
    let message = invocation.message;
    let mut env = Environment::new(invocation.author)
        .with_target(invocation.target)
        .with_args(invocation.args);

    if let Some(guild_id) = invocation.guild_id {
        let level = data
            .leveling
            .record(guild_id.get(), message.author.id.get())
            .await
            .ok()
            .map(|record| LevelSnapshot {
                level: record.level,
                xp: record.xp,
            });
        env = env
            .with_level(level)
            .with_members(Arc::new(CacheDirectory::new(ctx.cache.clone(), guild_id)));
    }

    let rendered = render(content, env, &data.tags, false);
    send_tag_message(ctx, message.channel_id, Some(message), rendered.into()).await?;
    Ok(())
}

/// Run `code` as a Python tag and send each response it produces.
pub async fn execute_python_tag(
    ctx: &serenity::Context,
    data: &Data,
    invocation: TagInvocation<'_>,
    code: &str,
) -> Result<(), Error> {
    let message = invocation.message;
    let target = invocation.target.unwrap_or_else(|| invocation.author.clone());
    let context = PythonTagContext::new(
        &invocation.author,
        &target,
        python_channel(&ctx.cache, invocation.guild_id, message.channel_id),
        invocation.args,
    )
    .with_guild(invocation.guild_id.and_then(|id| python_guild(&ctx.cache, id)));

    let _typing = message.channel_id.start_typing(&ctx.http);
    match data.python.run(&context, code).await {
        Ok(PythonTagOutcome::Responses(responses)) => {
            for response in responses {
                send_tag_message(ctx, message.channel_id, Some(message), response.into()).await?;
            }
        }
        Ok(PythonTagOutcome::Failure(reason)) => {
            message.reply(ctx, reason).await?;
        }
        Err(e) => {
            tracing::warn!(message_id = message.id.get(), "Python tag failed: {}", e);
            message.reply(ctx, e.to_string()).await?;
        }
    }
    Ok(())
}

/// A cached member of `guild_id`, as a tag user.
pub fn cached_tag_member(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    user_id: u64,
) -> Option<TagUser> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .members
        .get(&serenity::UserId::new(user_id))
        .map(tag_user_from_member)
}

pub async fn run_custom_command(
    ctx: &serenity::Context,
    data: &Data,
    message: &serenity::Message,
    guild_id: serenity::GuildId,
    command: &CustomCommand,
    args: &str,
) -> Result<(), Error> {
    let member = message.member(ctx).await?;
    if !command.can_run(&invoker_for(ctx, guild_id, message.channel_id, &member)) {
        tracing::debug!(name = %command.name, user_id = member.user.id.get(), "Custom command blocked");
        return Ok(());
    }

    let invocation = prepare_invocation(args, |arg| resolve_member_id(&ctx.cache, guild_id, arg));
    let tag_invocation = TagInvocation {
        message,
        guild_id: Some(guild_id),
        author: tag_user_from_member(&member),
        target: invocation
            .target
            .and_then(|id| cached_tag_member(ctx, guild_id, id)),
        args: invocation.args,
    };

    if command.is_python {
        execute_python_tag(ctx, data, tag_invocation, &command.response).await
    } else {
        execute_tags(ctx, data, tag_invocation, &command.response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        vec!["<@1>".into(), "lambda ".into(), ">".into()]
    }

    #[test]
    fn invocations_split_into_name_and_arguments() {
        assert_eq!(split_invocation(">hug @wumpus now", &prefixes()), Some(("hug", "@wumpus now")));
        assert_eq!(split_invocation("lambda ping", &prefixes()), Some(("ping", "")));
        assert_eq!(split_invocation("<@1>   greet  x", &prefixes()), Some(("greet", "x")));
    }

    #[test]
    fn messages_without_a_prefix_or_name_are_ignored() {
        assert_eq!(split_invocation("hello", &prefixes()), None);
        assert_eq!(split_invocation(">", &prefixes()), None);
        assert_eq!(split_invocation(">   ", &prefixes()), None);
    }
}
