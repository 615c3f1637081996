use crate::core::formatting::{humanize_duration, parse_interval, pluralize};
use crate::core::reminders::{parse_reminder, success_message, NewReminder, Reminder};
use crate::discord::data::colors;
use crate::discord::flags::{parse_flags, FlagSpec};
use crate::discord::pagination::{FieldPaginator, PageField};
use crate::discord::prompt::confirm;
use crate::discord::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;

const REMIND_FLAGS: &[FlagSpec] = &[FlagSpec::value("repeat", 'r'), FlagSpec::switch("dm", 'd')];

/// Set a reminder for something in the future.
///
/// Examples: `remind me to go for a walk in 15 minutes`, `remind 2d birthday`.
/// Flags: `--repeat <interval>` repeats the reminder, `--dm` sends it to your DMs.
#[poise::command(
    prefix_command,
    slash_command,
    aliases("rm", "remindme", "remember", "setreminder", "reminder"),
    subcommands("create", "list", "repeat", "delete", "clear")
)]
pub async fn remind(
    ctx: Context<'_>,
    #[description = "What to remind you of, and when"]
    #[rest]
    reminder: Option<String>,
) -> Result<(), Error> {
    match reminder {
        Some(reminder) => create_reminder(ctx, &reminder).await,
        None => show_list(ctx).await,
    }
}

/// Set a reminder for something in the future.
#[poise::command(prefix_command, slash_command, aliases("set", "add", "new"))]
pub async fn create(
    ctx: Context<'_>,
    #[description = "What to remind you of, and when. Add --repeat <interval> or --dm"]
    #[rest]
    reminder: String,
) -> Result<(), Error> {
    create_reminder(ctx, &reminder).await
}

/// Where "Jump to Message" should lead.
fn jump_url(ctx: Context<'_>) -> String {
    if let poise::Context::Prefix(prefix) = ctx {
        return prefix.msg.link();
    }
    let guild = ctx
        .guild_id()
        .map_or_else(|| "@me".to_string(), |id| id.to_string());
    format!("https://discord.com/channels/{guild}/{}", ctx.channel_id())
}

async fn create_reminder(ctx: Context<'_>, text: &str) -> Result<(), Error> {
    let flags = parse_flags(text, REMIND_FLAGS)?;
    let now = Utc::now();
    let parsed = parse_reminder(&flags.positional, now)?;

    let repeat = match flags.value("repeat") {
        Some(value) => Some(
            parse_interval(value)
                .ok_or("Could not understand the repeat interval. Try something such as \"2 hours\".")?
                .duration,
        ),
        None => None,
    };

    let direct_message = flags.is_set("dm");
    let destination = if direct_message {
        ctx.author().create_dm_channel(ctx).await?.id
    } else {
        ctx.channel_id()
    };

    let reminder = ctx
        .data()
        .reminders
        .create(
            NewReminder {
                when: parsed.when,
                message: parsed.message,
                author_id: ctx.author().id.get(),
                destination_id: destination.get(),
                jump_url: jump_url(ctx),
                repeat,
                created_at: now,
            },
            now,
        )
        .await?;

    ctx.send(
        poise::CreateReply::default()
            .content(success_message(&reminder, direct_message))
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// View all of your pending reminders.
#[poise::command(prefix_command, slash_command, aliases("ls", "all"))]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    show_list(ctx).await
}

/// View all of your pending reminders.
#[poise::command(prefix_command, slash_command)]
pub async fn reminders(ctx: Context<'_>) -> Result<(), Error> {
    show_list(ctx).await
}

async fn show_list(ctx: Context<'_>) -> Result<(), Error> {
    let author = ctx.author();
    let reminders = ctx.data().reminders.list(author.id.get()).await?;
    if reminders.is_empty() {
        ctx.say("You have no pending reminders.").await?;
        return Ok(());
    }

    let embed = serenity::CreateEmbed::new()
        .author(
            serenity::CreateEmbedAuthor::new(format!("{}'s Reminders", author.name))
                .icon_url(author.face()),
        )
        .color(colors::PRIMARY)
        .timestamp(serenity::Timestamp::now())
        .description(format!(
            "Run `{0}reminder delete <id>` to cancel a reminder.\nYou can also run `{0}reminders clear` to clear all reminders.",
            ctx.prefix()
        ))
        .footer(serenity::CreateEmbedFooter::new(pluralize(&format!(
            "{} reminder(s) listed.",
            reminders.len()
        ))));

    let fields = reminders.iter().map(reminder_field).collect();
    FieldPaginator::new(embed, fields).send(ctx, None).await
}

fn reminder_field(reminder: &Reminder) -> PageField {
    let expires = reminder.expires_at.timestamp();
    let metadata = &reminder.metadata;

    let mut value = format!("{} [[Jump!]]({})", metadata.message, metadata.jump_url);
    if let Some(repeat) = metadata.repeat {
        value.push_str(&format!(
            "\n*Repeating every {}*",
            humanize_duration(repeat as f64, 3)
        ));
    }

    PageField::new(
        format!("<t:{expires}> (<t:{expires}:R>) - ID: {}", reminder.id),
        value,
    )
}

/// Repeat one of your reminders at an interval, e.g. `2 hours`.
#[poise::command(prefix_command, slash_command, aliases("rp", "loop"))]
pub async fn repeat(
    ctx: Context<'_>,
    #[description = "ID of the reminder"] id: i64,
    #[description = "How often to repeat it, e.g. \"2 hours\""]
    #[rest]
    interval: String,
) -> Result<(), Error> {
    let interval = parse_interval(&interval)
        .ok_or("Could not understand that interval. Try something such as \"2 hours\".")?
        .duration
        .as_secs();

    let reminder = ctx
        .data()
        .reminders
        .set_repeat(id, ctx.author().id.get(), interval)
        .await?;

    ctx.say(format!(
        "Now repeating reminder with ID {} every {}.",
        reminder.id,
        humanize_duration(interval as f64, 3)
    ))
    .await?;
    Ok(())
}

/// Cancel and delete one of your reminders.
#[poise::command(
    prefix_command,
    slash_command,
    aliases("-", "remove", "cancel", "forget")
)]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "ID of the reminder"] id: i64,
) -> Result<(), Error> {
    let author_id = ctx.author().id.get();
    let reminders = &ctx.data().reminders;
    let reminder = reminders.get_owned(id, author_id).await?;

    let question = format!(
        "Are you sure you want to cancel the reminder with ID {} ({})",
        reminder.id, reminder.metadata.message
    );
    if !confirm(ctx, question).await?.accepted() {
        ctx.say("Alright.").await?;
        return Ok(());
    }

    let deleted = reminders.delete(id, author_id).await?;
    ctx.say(format!(
        "Deleted reminder with ID {}: {}",
        deleted.id, deleted.metadata.message
    ))
    .await?;
    Ok(())
}

/// Cancel all of your pending reminders.
#[poise::command(
    prefix_command,
    slash_command,
    aliases("wipe", "deleteall", "removeall", "reset")
)]
pub async fn clear(ctx: Context<'_>) -> Result<(), Error> {
    let author_id = ctx.author().id.get();
    let reminders = &ctx.data().reminders;

    if reminders.list(author_id).await?.is_empty() {
        ctx.say("You have no reminders to cancel.").await?;
        return Ok(());
    }

    let question =
        "Are you sure you want to cancel all of your reminders? You will not be able to recover them.";
    if !confirm(ctx, question).await?.accepted() {
        ctx.say("Alright.").await?;
        return Ok(());
    }

    let amount = reminders.clear(author_id).await?;
    if amount == 0 {
        ctx.say("You have no reminders to cancel.").await?;
        return Ok(());
    }

    ctx.say(pluralize(&format!(
        "Successfully cleared all of your reminders. (Deleted {amount} reminder(s))"
    )))
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reminders::ReminderMetadata;
    use chrono::TimeZone;

    fn reminder(repeat: Option<u64>) -> Reminder {
        Reminder {
            id: 12,
            expires_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            metadata: ReminderMetadata {
                message: "feed the cat".into(),
                author_id: 1,
                destination_id: 2,
                jump_url: "https://discord.com/channels/3/2/4".into(),
                repeat,
                original_creation: 1_699_999_000,
            },
        }
    }

    #[test]
    fn list_fields_show_time_id_and_jump_link() {
        let field = reminder_field(&reminder(None));
        assert_eq!(
            field.name,
            "<t:1700000000> (<t:1700000000:R>) - ID: 12"
        );
        assert_eq!(
            field.value,
            "feed the cat [[Jump!]](https://discord.com/channels/3/2/4)"
        );
    }

    #[test]
    fn repeating_reminders_say_so() {
        let field = reminder_field(&reminder(Some(7200)));
        assert!(field.value.ends_with("\n*Repeating every 2 hours*"));
    }
}
