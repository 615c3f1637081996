use crate::core::leveling::{LevelUpChannel, LevelUpEvent, MessageActivity};
use crate::core::tags::{render, Environment, LevelSnapshot};
use crate::discord::tags::{send_tag_message, tag_user_from_member, CacheDirectory, TagMessage};
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Award XP for a guild message and announce a level-up if it caused one.
pub async fn handle_message(
    ctx: &serenity::Context,
    data: &Data,
    message: &serenity::Message,
) -> Result<(), Error> {
    let Some(guild_id) = message.guild_id else {
        return Ok(());
    };
    if message.author.bot {
        return Ok(());
    }

    let role_ids: Vec<u64> = message
        .member
        .as_ref()
        .map(|m| m.roles.iter().map(|r| r.get()).collect())
        .unwrap_or_default();

    let activity = MessageActivity {
        guild_id: guild_id.get(),
        channel_id: message.channel_id.get(),
        user_id: message.author.id.get(),
        role_ids,
    };

    if let Some(level_up) = data.leveling.process_message(&activity).await? {
        announce_level_up(ctx, data, message, &level_up).await?;
    }
    Ok(())
}

/// Grant and revoke level reward roles. Failures are logged, not returned.
pub async fn apply_role_rewards(ctx: &serenity::Context, level_up: &LevelUpEvent) {
    let guild_id = serenity::GuildId::new(level_up.guild_id);
    let user_id = serenity::UserId::new(level_up.user_id);

    for role in &level_up.roles.grant {
        if let Err(e) = ctx
            .http
            .add_member_role(guild_id, user_id, serenity::RoleId::new(*role), Some("Level role reward"))
            .await
        {
            tracing::warn!(guild_id = level_up.guild_id, role, "Failed to grant level role: {}", e);
        }
    }
    for role in &level_up.roles.revoke {
        if let Err(e) = ctx
            .http
            .remove_member_role(guild_id, user_id, serenity::RoleId::new(*role), Some("Level role reward"))
            .await
        {
            tracing::warn!(guild_id = level_up.guild_id, role, "Failed to revoke level role: {}", e);
        }
    }
}

/// Apply level role rewards and post the level-up message where the guild wants it.
pub async fn announce_level_up(
    ctx: &serenity::Context,
    data: &Data,
    message: &serenity::Message,
    level_up: &LevelUpEvent,
) -> Result<(), Error> {
    let guild_id = serenity::GuildId::new(level_up.guild_id);
    apply_role_rewards(ctx, level_up).await;

    let Some(template) = &level_up.template else {
        return Ok(());
    };

    let member = message.member(ctx).await?;
    let env = Environment::new(tag_user_from_member(&member))
        .with_level(Some(LevelSnapshot {
            level: level_up.new_level,
            xp: level_up.xp,
        }))
        .with_members(Arc::new(CacheDirectory::new(ctx.cache.clone(), guild_id)));
    let rendered: TagMessage = render(template, env, &data.tags, true).into();

    match level_up.channel {
        LevelUpChannel::Disabled => {}
        LevelUpChannel::SameChannel => {
            send_tag_message(ctx, message.channel_id, Some(message), rendered).await?;
        }
        LevelUpChannel::DirectMessage => {
            let dm = message.author.create_dm_channel(ctx).await?;
            send_tag_message(ctx, dm.id, None, rendered).await?;
        }
        LevelUpChannel::Channel(channel_id) => {
            send_tag_message(ctx, serenity::ChannelId::new(channel_id), None, rendered).await?;
        }
    }
    Ok(())
}
