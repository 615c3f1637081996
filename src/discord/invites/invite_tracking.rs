// Gateway events that keep the invite use cache current and announce joins.

use crate::core::invites::{join_message, TrackedInvite};
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

fn from_rich(invite: &serenity::RichInvite) -> TrackedInvite {
    TrackedInvite {
        code: invite.code.clone(),
        uses: invite.uses,
        inviter: invite.inviter.as_ref().map(|u| u.tag()),
        channel_id: Some(invite.channel.id.get()),
    }
}

fn from_created(event: &serenity::InviteCreateEvent) -> TrackedInvite {
    TrackedInvite {
        code: event.code.clone(),
        uses: event.uses,
        inviter: event.inviter.as_ref().map(|u| u.tag()),
        channel_id: Some(event.channel_id.get()),
    }
}

/// Current invites of a guild. Listing needs Manage Guild, so a failure
/// counts as no invites.
async fn fetch_invites(ctx: &serenity::Context, guild_id: serenity::GuildId) -> Vec<TrackedInvite> {
    match guild_id.invites(&ctx.http).await {
        Ok(invites) => invites.iter().map(from_rich).collect(),
        Err(e) => {
            tracing::debug!(guild_id = guild_id.get(), "Could not list invites: {}", e);
            Vec::new()
        }
    }
}

/// Cache the invites of a tracked guild if they are not cached yet.
pub async fn snapshot(ctx: &serenity::Context, data: &Data, guild_id: serenity::GuildId) {
    if data.invites.tracking_channel(guild_id.get()).is_none()
        || data.invites.has_snapshot(guild_id.get())
    {
        return;
    }
    let invites = fetch_invites(ctx, guild_id).await;
    data.invites.replace_invites(guild_id.get(), invites);
}

pub fn handle_invite_create(data: &Data, event: &serenity::InviteCreateEvent) {
    if let Some(guild_id) = event.guild_id {
        data.invites.invite_created(guild_id.get(), from_created(event));
    }
}

pub fn handle_invite_delete(data: &Data, event: &serenity::InviteDeleteEvent) {
    if let Some(guild_id) = event.guild_id {
        data.invites.invite_deleted(guild_id.get(), &event.code);
    }
}

pub fn handle_channel_delete(data: &Data, channel: &serenity::GuildChannel) {
    data.invites
        .channel_deleted(channel.guild_id.get(), channel.id.get());
}

/// Post which invite `member` joined with, if the guild tracks invites.
pub async fn handle_member_join(
    ctx: &serenity::Context,
    data: &Data,
    member: &serenity::Member,
) -> Result<(), Error> {
    let guild_id = member.guild_id;
    let Some(channel_id) = data.invites.tracking_channel(guild_id.get()) else {
        return Ok(());
    };

    let fresh = fetch_invites(ctx, guild_id).await;
    let Some(invite) = data.invites.detect_join(guild_id.get(), fresh) else {
        tracing::debug!(guild_id = guild_id.get(), user_id = member.user.id.get(), "No invite matched a join");
        return Ok(());
    };

    let content = join_message(&member.user.tag(), &invite);
    serenity::ChannelId::new(channel_id)
        .send_message(
            ctx,
            serenity::CreateMessage::new()
                .content(content)
                .allowed_mentions(serenity::CreateAllowedMentions::new()),
        )
        .await?;
    Ok(())
}
