// Turns framework errors into replies the user can act on.

use crate::core::formatting::{cutoff, humanize_list, AnsiColor, AnsiStringBuilder, AnsiStyle};
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

const MAX_REPLY: usize = 2000;

async fn reply(ctx: poise::Context<'_, Data, Error>, content: String) {
    let reply = poise::CreateReply::default()
        .content(cutoff(&content, MAX_REPLY, true))
        .ephemeral(true)
        .allowed_mentions(serenity::CreateAllowedMentions::new());
    if let Err(e) = ctx.send(reply).await {
        tracing::warn!("Failed to send error reply: {}", e);
    }
}

/// An ```ansi block showing the invocation with the rejected argument
/// underlined in red.
pub fn bad_argument_block(invocation: &str, input: &str, reason: &str) -> String {
    let mut builder = AnsiStringBuilder::new();
    builder
        .append(invocation, AnsiStyle::color(AnsiColor::Cyan))
        .append_raw(" ")
        .append(input, AnsiStyle::bold().with_color(AnsiColor::Red));
    builder.append_raw("\n");
    builder
        .append_raw(&" ".repeat(invocation.chars().count() + 1))
        .color(AnsiColor::Red, &"^".repeat(input.chars().count().max(1)))
        .clear_formatting();
    builder.append_raw("\n").append(reason, AnsiStyle::color(AnsiColor::Red));

    format!("```ansi\n{}\n```", builder.build())
}

/// Readable names of permission flags, e.g. "Manage Guild".
pub fn permission_names(permissions: serenity::Permissions) -> Vec<String> {
    permissions
        .get_permission_names()
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            tracing::error!("Failed to start bot: {}", error);
        }
        poise::FrameworkError::UnknownCommand { .. } => {}
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::warn!(
                command = %ctx.command().qualified_name,
                user = ctx.author().id.get(),
                "Command failed: {}",
                error
            );
            reply(ctx, error.to_string()).await;
        }
        poise::FrameworkError::ArgumentParse { error, input, ctx, .. } => {
            let invocation = format!("{}{}", ctx.prefix(), ctx.command().qualified_name);
            let message = match input {
                Some(input) => format!(
                    "Could not understand one of your arguments.\n{}",
                    bad_argument_block(&invocation, &input, &error.to_string())
                ),
                None => format!("{error}\nUsage: `{invocation}`"),
            };
            reply(ctx, message).await;
        }
        poise::FrameworkError::MissingUserPermissions {
            missing_permissions: Some(missing),
            ctx,
            ..
        } => {
            let names = permission_names(missing);
            reply(
                ctx,
                format!(
                    "You are missing the following permissions required to run this command: {}",
                    humanize_list(&names)
                ),
            )
            .await;
        }
        poise::FrameworkError::MissingBotPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            let names = permission_names(missing_permissions);
            reply(
                ctx,
                format!(
                    "I am missing the following permissions required to run this command: {}",
                    humanize_list(&names)
                ),
            )
            .await;
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}
