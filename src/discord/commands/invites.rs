use crate::discord::data::guild_id;
use crate::discord::invite_tracking as tracking_events;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Track which invite each new member joined with.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "invite-tracking",
    aliases("invite-channel", "inv-channel", "itr"),
    required_permissions = "MANAGE_GUILD",
    required_bot_permissions = "MANAGE_GUILD",
    subcommands("set_channel", "disable")
)]
pub async fn invite_tracking(ctx: Context<'_>) -> Result<(), Error> {
    let message = match ctx.data().invites.tracking_channel(guild_id(&ctx)?) {
        Some(channel_id) => format!("Invite tracking messages are sent to <#{channel_id}>."),
        None => format!(
            "Invite tracking is disabled. Enable it with `{}invite-tracking set-channel <channel>`.",
            ctx.prefix()
        ),
    };
    ctx.say(message).await?;
    Ok(())
}

/// Set the channel invite tracking messages are sent to.
///
/// This enables invite tracking if it is not already enabled.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "set-channel",
    aliases("set", "sc", "ch", "chan", "setchannel", "channel"),
    required_permissions = "MANAGE_GUILD",
    required_bot_permissions = "MANAGE_GUILD"
)]
pub async fn set_channel(
    ctx: Context<'_>,
    #[description = "Where to send invite tracking messages"] channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    ctx.data().invites.set_channel(guild_id, channel.id.get()).await?;
    tracking_events::snapshot(ctx.serenity_context(), ctx.data(), serenity::GuildId::new(guild_id)).await;

    ctx.say(format!("Invite tracking channel set to <#{}>.", channel.id))
        .await?;
    Ok(())
}

/// Disable invite tracking for this server.
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("off", "stop", "dis", "disable-tracking", "disabletracking"),
    required_permissions = "MANAGE_GUILD"
)]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    let message = if ctx.data().invites.disable(guild_id(&ctx)?).await? {
        "Disabled invite tracking for this server."
    } else {
        "Invite tracking is not enabled."
    };
    ctx.say(message).await?;
    Ok(())
}
