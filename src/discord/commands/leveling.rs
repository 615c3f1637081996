// Discord commands for the leveling system.
//
// Same shape as every command file:
// 1. Pull the IDs out of the Discord types
// 2. Call the leveling service
// 3. Format the result

use crate::core::formatting::{format_thousands, pluralize, progress_bar};
use crate::core::leveling::{CooldownSettings, GainRange, LevelUpChannel, LevelingConfig, RankInfo};
use crate::discord::data::{colors, guild_id};
use crate::discord::leveling_announcements::apply_role_rewards;
use crate::discord::pagination::{paginate, PAGINATION_TIMEOUT};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

const LEADERBOARD_PER_PAGE: usize = 10;

async fn ensure_enabled(ctx: Context<'_>, guild_id: u64) -> Result<(), Error> {
    if ctx.data().leveling.config(guild_id).await?.module_enabled {
        return Ok(());
    }
    Err(format!(
        "The leveling module is disabled in this server. Enable it with `{}level-config module true`.",
        ctx.prefix()
    )
    .into())
}

fn member_count(ctx: Context<'_>) -> u64 {
    ctx.guild().map(|g| g.member_count).unwrap_or_default()
}

fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// View your or another member's level, rank and XP.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    aliases("r", "level", "lvl", "lv", "xp", "exp")
)]
pub async fn rank(
    ctx: Context<'_>,
    #[description = "The member to view the level of. Defaults to yourself."] user: Option<serenity::User>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    ensure_enabled(ctx, guild_id).await?;

    let user = user.as_ref().unwrap_or_else(|| ctx.author());
    if user.bot {
        ctx.say("Bots do not have levels.").await?;
        return Ok(());
    }

    let info = ctx.data().leveling.rank_of(guild_id, user.id.get()).await?;
    let embed = rank_embed(user, &info, member_count(ctx));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn rank_embed(user: &serenity::User, info: &RankInfo, member_count: u64) -> serenity::CreateEmbed {
    let ratio = info.ratio();
    serenity::CreateEmbed::new()
        .author(serenity::CreateEmbedAuthor::new(user.tag()).icon_url(user.face()))
        .color(colors::PRIMARY)
        .timestamp(serenity::Timestamp::now())
        .field(
            format!(
                "Level {} ({}/{} XP - {})",
                format_thousands(info.record.level as f64),
                format_thousands(info.record.xp as f64),
                format_thousands(info.max_xp as f64),
                percent(ratio)
            ),
            progress_bar(ratio, 10),
            false,
        )
        .field(
            "Rank",
            format!(
                "**#{}** out of {}",
                format_thousands(info.rank as f64),
                format_thousands(member_count as f64)
            ),
            true,
        )
}

/// View the members with the highest levels in this server.
#[poise::command(slash_command, prefix_command, guild_only, aliases("lb", "top"))]
pub async fn leaderboard(
    ctx: Context<'_>,
    #[description = "Page to start on"] page: Option<usize>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    ensure_enabled(ctx, guild_id).await?;

    let leveling = &ctx.data().leveling;
    let entries = leveling.leaderboard(guild_id).await?;
    let own = leveling.rank_of(guild_id, ctx.author().id.get()).await?;
    let (guild_name, guild_icon) = ctx
        .guild()
        .map(|g| (g.name.clone(), g.icon_url()))
        .unwrap_or_default();

    let content = format!(
        "Here is the XP Leaderboard for **{guild_name}** (you are rank **#{}** out of {} members.)",
        format_thousands(own.rank as f64),
        format_thousands(member_count(ctx) as f64)
    );

    let pages: Vec<String> = if entries.is_empty() {
        vec!["No one has earned any XP yet.".to_string()]
    } else {
        entries
            .chunks(LEADERBOARD_PER_PAGE)
            .enumerate()
            .map(|(page, chunk)| leaderboard_page(chunk, page * LEADERBOARD_PER_PAGE))
            .collect()
    };

    let mut author = serenity::CreateEmbedAuthor::new(format!("Top Members in {guild_name}"));
    if let Some(icon) = guild_icon {
        author = author.icon_url(icon);
    }
    let start = page.unwrap_or(1).saturating_sub(1);

    paginate(ctx, Some(content), pages.len(), start, PAGINATION_TIMEOUT, |index, _| {
        let embed = serenity::CreateEmbed::new()
            .author(author.clone())
            .color(colors::PRIMARY)
            .timestamp(serenity::Timestamp::now())
            .description(&pages[index]);
        (embed, Vec::new())
    })
    .await
}

fn leaderboard_page(entries: &[RankInfo], offset: usize) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(i, info)| {
            format!(
                "{}. <@{}>: Level **{}** *({}/{} XP) [{}]*",
                offset + i + 1,
                info.record.user_id,
                format_thousands(info.record.level as f64),
                format_thousands(info.record.xp as f64),
                format_thousands(info.max_xp as f64),
                percent(info.ratio())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Commands for configuring the leveling module.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "level-config",
    aliases("lc", "level-configuration", "level-configs", "leveling-config"),
    required_permissions = "MANAGE_GUILD",
    subcommands(
        "module", "roles", "role_stack", "message", "channel", "gain", "cooldown", "xp"
    )
)]
pub async fn level_config(ctx: Context<'_>) -> Result<(), Error> {
    let config = ctx.data().leveling.config(guild_id(&ctx)?).await?;
    ctx.send(poise::CreateReply::default().embed(config_embed(&config)))
        .await?;
    Ok(())
}

fn enabled_text(toggle: bool) -> &'static str {
    if toggle {
        "Enabled"
    } else {
        "Disabled"
    }
}

fn channel_text(channel: LevelUpChannel) -> String {
    match channel {
        LevelUpChannel::Disabled => "Disabled".to_string(),
        LevelUpChannel::SameChannel => "Same channel as the message".to_string(),
        LevelUpChannel::DirectMessage => "Direct messages".to_string(),
        LevelUpChannel::Channel(id) => format!("<#{id}>"),
    }
}

fn level_roles_text(config: &LevelingConfig) -> String {
    let mut roles: Vec<(&u64, &i64)> = config.level_roles.iter().collect();
    roles.sort_by_key(|(_, level)| **level);
    roles
        .iter()
        .map(|(role, level)| format!("- Level {}: <@&{role}>", format_thousands(**level as f64)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn config_embed(config: &LevelingConfig) -> serenity::CreateEmbed {
    let gain = config.spec.gain;
    serenity::CreateEmbed::new()
        .title("Leveling Configuration")
        .color(colors::PRIMARY)
        .field("Module", enabled_text(config.module_enabled), true)
        .field("Role Stack", enabled_text(config.role_stack), true)
        .field("Level-up Messages", channel_text(config.level_up_channel), true)
        .field("XP per Message", format!("{}-{}", gain.min, gain.max), true)
        .field(
            "Cooldown",
            pluralize(&format!(
                "{} message(s) per {}s",
                config.cooldown.rate, config.cooldown.per
            )),
            true,
        )
}

/// Turn the leveling module on or off.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("m", "mod", "toggle", "status")
)]
pub async fn module(
    ctx: Context<'_>,
    #[description = "Whether to enable or disable the module."] toggle: Option<bool>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let leveling = &ctx.data().leveling;

    let Some(toggle) = toggle else {
        let config = leveling.config(guild_id).await?;
        ctx.say(format!(
            "The leveling module is currently **{}**.",
            enabled_text(config.module_enabled)
        ))
        .await?;
        return Ok(());
    };

    leveling.set_module_enabled(guild_id, toggle).await?;
    ctx.say(format!("Leveling module now set to **{}**.", enabled_text(toggle)))
        .await?;
    Ok(())
}

/// View level role rewards, or set the level a role is given at.
///
/// Leave out the level to stop rewarding the role.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("role", "r", "reward", "rewards")
)]
pub async fn roles(
    ctx: Context<'_>,
    #[description = "Role to reward"] role: Option<serenity::Role>,
    #[description = "Level the role is given at"] level: Option<i64>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let leveling = &ctx.data().leveling;

    let Some(role) = role else {
        let config = leveling.config(guild_id).await?;
        let mut embed = serenity::CreateEmbed::new()
            .title("Level Role Rewards")
            .color(colors::PRIMARY)
            .field(
                "Role Stack",
                if config.role_stack {
                    "Users can accumulate multiple level roles."
                } else {
                    "Users can only have the highest level role."
                },
                false,
            );
        embed = if config.level_roles.is_empty() {
            embed.description("You have not configured any level role rewards yet.")
        } else {
            embed.field(
                format!("Level Roles ({}/25 slots)", config.level_roles.len()),
                level_roles_text(&config),
                false,
            )
        };
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        return Ok(());
    };

    let config = leveling.config(guild_id).await?;
    if level.is_some() && !config.level_roles.contains_key(&role.id.get()) && config.level_roles.len() >= 25 {
        ctx.say("You can only have up to 25 level roles.").await?;
        return Ok(());
    }

    leveling.set_level_role(guild_id, role.id.get(), level).await?;
    let reply = match level {
        Some(level) => format!("<@&{}> will now be given at level **{level}**.", role.id),
        None => format!("<@&{}> is no longer a level role.", role.id),
    };
    ctx.send(
        poise::CreateReply::default()
            .content(reply)
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

/// Whether members keep lower level roles when they earn a higher one.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "role-stack",
    required_permissions = "MANAGE_GUILD",
    aliases("stack", "rs")
)]
pub async fn role_stack(
    ctx: Context<'_>,
    #[description = "Whether level roles stack"] toggle: bool,
) -> Result<(), Error> {
    ctx.data()
        .leveling
        .set_role_stack(guild_id(&ctx)?, toggle)
        .await?;
    ctx.say(format!("Role stacking now set to **{}**.", enabled_text(toggle)))
        .await?;
    Ok(())
}

/// Set the level-up message. Give a level to set a message for that level only.
///
/// Leave out the message to remove it. Messages use tag formatting, e.g.
/// `{user.mention} reached level {level}!`.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("msg", "level-up-message")
)]
pub async fn message(
    ctx: Context<'_>,
    #[description = "Only use this message for this level"] level: Option<i64>,
    #[description = "The message (tag formatting)"]
    #[rest]
    text: Option<String>,
) -> Result<(), Error> {
    let text = text.filter(|t| !t.trim().is_empty());
    let reply = match (level, &text) {
        (None, Some(_)) => "Updated the level-up message.".to_string(),
        (None, None) => "Removed the level-up message.".to_string(),
        (Some(level), Some(_)) => format!("Updated the level-up message for level **{level}**."),
        (Some(level), None) => format!("Removed the level-up message for level **{level}**."),
    };

    ctx.data()
        .leveling
        .set_level_up_message(guild_id(&ctx)?, level, text)
        .await?;
    ctx.say(reply).await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum LevelUpDestination {
    #[name = "off"]
    Off,
    #[name = "same"]
    Same,
    #[name = "dm"]
    Dm,
    #[name = "channel"]
    Channel,
}

fn resolve_destination(
    destination: LevelUpDestination,
    channel: Option<u64>,
) -> Result<LevelUpChannel, &'static str> {
    Ok(match destination {
        LevelUpDestination::Off => LevelUpChannel::Disabled,
        LevelUpDestination::Same => LevelUpChannel::SameChannel,
        LevelUpDestination::Dm => LevelUpChannel::DirectMessage,
        LevelUpDestination::Channel => {
            LevelUpChannel::Channel(channel.ok_or("Please specify the channel to send level-up messages to.")?)
        }
    })
}

/// Choose where level-up messages are sent.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("ch", "destination")
)]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Where to send level-up messages"] destination: LevelUpDestination,
    #[description = "Channel, when sending to a specific channel"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let target = resolve_destination(destination, channel.map(|c| c.id.get()))?;
    ctx.data()
        .leveling
        .set_level_up_channel(guild_id(&ctx)?, target)
        .await?;
    ctx.say(format!("Level-up messages: **{}**.", channel_text(target)))
        .await?;
    Ok(())
}

/// Set how much XP each message earns.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("xp-gain")
)]
pub async fn gain(
    ctx: Context<'_>,
    #[description = "Minimum XP per message"] min: u32,
    #[description = "Maximum XP per message"] max: u32,
) -> Result<(), Error> {
    ctx.data()
        .leveling
        .set_gain(guild_id(&ctx)?, GainRange { min, max })
        .await?;
    ctx.say(format!("Messages now earn **{min}-{max}** XP.")).await?;
    Ok(())
}

/// Set how many messages can earn XP within a window of seconds.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("cd", "rate-limit")
)]
pub async fn cooldown(
    ctx: Context<'_>,
    #[description = "Messages that earn XP per window"] rate: u32,
    #[description = "Window length in seconds"] per: f64,
) -> Result<(), Error> {
    ctx.data()
        .leveling
        .set_cooldown(guild_id(&ctx)?, CooldownSettings { rate, per })
        .await?;
    ctx.say(pluralize(&format!(
        "Members can now earn XP from {rate} message(s) every **{per}** seconds."
    )))
    .await?;
    Ok(())
}

/// Give or take XP from a member. Use a negative amount to take XP away.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    aliases("give-xp", "add-xp", "set-xp")
)]
pub async fn xp(
    ctx: Context<'_>,
    #[description = "The member to adjust"] member: serenity::Member,
    #[description = "XP to add (up to 1,000,000), negative to remove"] amount: i64,
) -> Result<(), Error> {
    if member.user.bot {
        ctx.say("Bots do not have levels.").await?;
        return Ok(());
    }

    let guild_id = guild_id(&ctx)?;
    let role_ids: Vec<u64> = member.roles.iter().map(|r| r.get()).collect();
    let leveling = &ctx.data().leveling;
    let level_up = leveling
        .adjust_xp(guild_id, member.user.id.get(), amount, &role_ids)
        .await?;

    if let Some(level_up) = &level_up {
        apply_role_rewards(ctx.serenity_context(), level_up).await;
    }

    let record = leveling.record(guild_id, member.user.id.get()).await?;
    let verb = if amount < 0 { "Took" } else { "Gave" };
    ctx.send(
        poise::CreateReply::default()
            .content(format!(
                "{verb} **{}** XP {} {}. They are now level **{}** with **{}** XP.",
                format_thousands(amount.unsigned_abs() as f64),
                if amount < 0 { "from" } else { "to" },
                format!("<@{}>", member.user.id),
                record.level,
                format_thousands(record.xp as f64),
            ))
            .allowed_mentions(serenity::CreateAllowedMentions::new()),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::leveling::LevelingRecord;

    fn info(user_id: u64, level: i64, xp: i64, max_xp: i64, rank: u64) -> RankInfo {
        RankInfo {
            record: LevelingRecord {
                guild_id: 1,
                user_id,
                level,
                xp,
            },
            rank,
            max_xp,
        }
    }

    #[test]
    fn leaderboard_lines_are_numbered_from_the_page_offset() {
        let page = leaderboard_page(&[info(7, 3, 50, 200, 11), info(8, 1, 1500, 2000, 12)], 10);
        let lines: Vec<&str> = page.lines().collect();
        assert_eq!(lines[0], "11. <@7>: Level **3** *(50/200 XP) [25.0%]*");
        assert_eq!(lines[1], "12. <@8>: Level **1** *(1,500/2,000 XP) [75.0%]*");
    }

    #[test]
    fn percentages_keep_one_decimal() {
        assert_eq!(percent(0.123), "12.3%");
        assert_eq!(percent(0.0), "0.0%");
    }

    #[test]
    fn channel_destinations_need_a_channel() {
        assert_eq!(
            resolve_destination(LevelUpDestination::Dm, None),
            Ok(LevelUpChannel::DirectMessage)
        );
        assert_eq!(
            resolve_destination(LevelUpDestination::Channel, Some(42)),
            Ok(LevelUpChannel::Channel(42))
        );
        assert!(resolve_destination(LevelUpDestination::Channel, None).is_err());
    }

    #[test]
    fn level_roles_are_listed_lowest_first() {
        let mut config = LevelingConfig::new(1);
        config.level_roles.insert(5, 20);
        config.level_roles.insert(9, 5);
        assert_eq!(
            level_roles_text(&config),
            "- Level 5: <@&9>\n- Level 20: <@&5>"
        );
    }
}
