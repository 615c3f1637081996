// Glue between serenity models and the tag interpreter.
//
// Everything a tag can read is copied out of the cache up front, and whatever
// a tag renders is turned back into serenity builders here.

use crate::core::formatting::cutoff;
use crate::core::tags::{
    ButtonStyleSpec, EmbedSpec, MemberDirectory, PythonChannel, PythonGuild, PythonResponse,
    RenderedTag, TagButton, TagUser,
};
use crate::core::tags::python::PythonAsset;
use crate::discord::Error;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Buttons on a tag response stop answering after this long.
pub const BUTTON_TIMEOUT: Duration = Duration::from_secs(30);
const BUTTONS_PER_ROW: usize = 5;
const MAX_EMBEDS: usize = 10;
const MAX_CONTENT: usize = 2000;

// ============================================================================
// INPUT
// ============================================================================

fn timestamp_to_chrono(ts: serenity::Timestamp) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts.unix_timestamp(), 0)
}

pub fn tag_user_from_user(user: &serenity::User) -> TagUser {
    TagUser {
        id: user.id.get(),
        name: user.name.clone(),
        discriminator: user
            .discriminator
            .map(|d| format!("{:04}", d.get()))
            .unwrap_or_else(|| "0".to_string()),
        global_name: user.global_name.clone(),
        avatar: user.avatar.map(|hash| hash.to_string()),
        bot: user.bot,
        ..TagUser::default()
    }
}

pub fn tag_user_from_member(member: &serenity::Member) -> TagUser {
    TagUser {
        nick: member.nick.clone(),
        guild_avatar: member.avatar.map(|hash| hash.to_string()),
        guild_id: Some(member.guild_id.get()),
        joined_at: member.joined_at.and_then(timestamp_to_chrono),
        ..tag_user_from_user(&member.user)
    }
}

/// Looks members up in the gateway cache for `{user(<id>)}`.
pub struct CacheDirectory {
    cache: Arc<serenity::Cache>,
    guild_id: serenity::GuildId,
}

impl CacheDirectory {
    pub fn new(cache: Arc<serenity::Cache>, guild_id: serenity::GuildId) -> Self {
        Self { cache, guild_id }
    }
}

impl MemberDirectory for CacheDirectory {
    fn member(&self, user_id: u64) -> Option<TagUser> {
        if user_id == 0 {
            return None;
        }
        let guild = self.cache.guild(self.guild_id)?;
        guild
            .members
            .get(&serenity::UserId::new(user_id))
            .map(tag_user_from_member)
    }
}

/// `<@123>`, `<@!123>` or a bare `123`.
pub fn parse_user_mention(argument: &str) -> Option<u64> {
    let argument = argument.trim();
    let id = match argument.strip_prefix("<@").and_then(|s| s.strip_suffix('>')) {
        Some(inner) => inner.strip_prefix('!').unwrap_or(inner),
        None => argument,
    };
    id.parse::<u64>().ok().filter(|id| *id != 0)
}

/// Resolve an argument to a cached member of `guild_id` by mention, ID or name.
pub fn resolve_member_id(
    cache: &serenity::Cache,
    guild_id: serenity::GuildId,
    argument: &str,
) -> Option<u64> {
    let guild = cache.guild(guild_id)?;

    if let Some(id) = parse_user_mention(argument) {
        let user_id = serenity::UserId::new(id);
        return guild.members.contains_key(&user_id).then_some(id);
    }

    let wanted = argument.trim();
    if wanted.is_empty() {
        return None;
    }
    guild
        .members
        .values()
        .find(|m| {
            m.user.name.eq_ignore_ascii_case(wanted)
                || m.user.tag().eq_ignore_ascii_case(wanted)
                || m.user
                    .global_name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(wanted))
                || m.nick.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(wanted))
        })
        .map(|m| m.user.id.get())
}

pub fn python_guild(cache: &serenity::Cache, guild_id: serenity::GuildId) -> Option<PythonGuild> {
    let guild = cache.guild(guild_id)?;
    Some(PythonGuild {
        id: guild.id.get(),
        name: guild.name.clone(),
        owner_id: guild.owner_id.get(),
        member_count: guild.member_count,
        icon: guild.icon.map(|hash| {
            let hash = hash.to_string();
            PythonAsset {
                animated: hash.starts_with("a_"),
                path: format!("icons/{}/{hash}", guild.id),
            }
        }),
    })
}

pub fn python_channel(
    cache: &serenity::Cache,
    guild_id: Option<serenity::GuildId>,
    channel_id: serenity::ChannelId,
) -> PythonChannel {
    let channel = guild_id
        .and_then(|id| cache.guild(id))
        .and_then(|guild| guild.channels.get(&channel_id).cloned());

    match channel {
        Some(channel) => PythonChannel {
            id: channel.id.get(),
            name: Some(channel.name.clone()),
            topic: channel.topic.clone(),
            nsfw: channel.nsfw,
            slowmode: channel.rate_limit_per_user.map(u16::from).unwrap_or(0),
            position: channel.position,
        },
        None => PythonChannel {
            id: channel_id.get(),
            name: None,
            topic: None,
            nsfw: false,
            slowmode: 0,
            position: 0,
        },
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

/// One message produced by a tag, either rendered or from Python.
#[derive(Debug, Clone, PartialEq)]
pub struct TagMessage {
    pub content: String,
    pub embeds: Vec<EmbedSpec>,
    pub buttons: Vec<TagButton>,
    pub reply: bool,
}

impl TagMessage {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.embeds.is_empty() && self.buttons.is_empty()
    }
}

impl From<RenderedTag> for TagMessage {
    fn from(rendered: RenderedTag) -> Self {
        Self {
            content: rendered.content,
            embeds: rendered.embed.into_iter().collect(),
            buttons: rendered.buttons,
            reply: rendered.should_reply,
        }
    }
}

impl From<PythonResponse> for TagMessage {
    fn from(response: PythonResponse) -> Self {
        Self {
            content: response.content.unwrap_or_default(),
            embeds: response.embeds,
            buttons: response.buttons,
            reply: response.reply,
        }
    }
}

pub fn embed_from_spec(spec: &EmbedSpec) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new();

    if let Some(title) = &spec.title {
        embed = embed.title(title);
    }
    if let Some(description) = &spec.description {
        embed = embed.description(description);
    }
    if let Some(url) = &spec.url {
        embed = embed.url(url);
    }
    if let Some(color) = spec.color {
        embed = embed.color(color);
    }
    if let Some(timestamp) = spec.timestamp {
        if let Ok(ts) = serenity::Timestamp::from_unix_timestamp(timestamp.timestamp()) {
            embed = embed.timestamp(ts);
        }
    }
    if let Some(author) = &spec.author {
        let mut builder = serenity::CreateEmbedAuthor::new(&author.name);
        if let Some(url) = &author.url {
            builder = builder.url(url);
        }
        if let Some(icon) = &author.icon_url {
            builder = builder.icon_url(icon);
        }
        embed = embed.author(builder);
    }
    if let Some(footer) = &spec.footer {
        let mut builder = serenity::CreateEmbedFooter::new(&footer.text);
        if let Some(icon) = &footer.icon_url {
            builder = builder.icon_url(icon);
        }
        embed = embed.footer(builder);
    }
    if let Some(thumbnail) = &spec.thumbnail {
        embed = embed.thumbnail(&thumbnail.url);
    }
    if let Some(image) = &spec.image {
        embed = embed.image(&image.url);
    }
    for field in &spec.fields {
        embed = embed.field(&field.name, &field.value, field.inline);
    }
    embed
}

fn button_style(style: ButtonStyleSpec) -> serenity::ButtonStyle {
    match style {
        ButtonStyleSpec::Primary | ButtonStyleSpec::Link => serenity::ButtonStyle::Primary,
        ButtonStyleSpec::Secondary => serenity::ButtonStyle::Secondary,
        ButtonStyleSpec::Success => serenity::ButtonStyle::Success,
        ButtonStyleSpec::Danger => serenity::ButtonStyle::Danger,
    }
}

fn button_custom_id(nonce: u64, index: usize) -> String {
    format!("tag:{nonce}:{index}")
}

fn button_index(custom_id: &str, nonce: u64) -> Option<usize> {
    let rest = custom_id.strip_prefix("tag:")?;
    let (id, index) = rest.split_once(':')?;
    (id.parse::<u64>().ok()? == nonce)
        .then(|| index.parse().ok())
        .flatten()
}

/// Buttons in rows of five. Link buttons open their URL, everything else
/// gets a custom ID derived from `nonce`.
pub fn button_rows(buttons: &[TagButton], nonce: u64) -> Vec<serenity::CreateActionRow> {
    let built: Vec<serenity::CreateButton> = buttons
        .iter()
        .enumerate()
        .map(|(i, button)| match (&button.url, button.style) {
            (Some(url), _) => serenity::CreateButton::new_link(url).label(&button.label),
            (None, style) => serenity::CreateButton::new(button_custom_id(nonce, i))
                .label(&button.label)
                .style(button_style(style)),
        })
        .collect();

    built
        .chunks(BUTTONS_PER_ROW)
        .map(|row| serenity::CreateActionRow::Buttons(row.to_vec()))
        .collect()
}

/// Tags may ping users, but replies never ping the invoker.
fn tag_allowed_mentions() -> serenity::CreateAllowedMentions {
    serenity::CreateAllowedMentions::new()
        .all_users(true)
        .replied_user(false)
}

/// Send a tag response to `channel_id`, replying to `reply_to` when asked.
pub async fn send_tag_message(
    ctx: &serenity::Context,
    channel_id: serenity::ChannelId,
    reply_to: Option<&serenity::Message>,
    message: TagMessage,
) -> Result<Option<serenity::Message>, Error> {
    if message.is_empty() {
        return Ok(None);
    }

    let nonce = reply_to.map(|m| m.id.get()).unwrap_or_else(|| channel_id.get());
    let mut builder = serenity::CreateMessage::new()
        .allowed_mentions(tag_allowed_mentions())
        .components(button_rows(&message.buttons, nonce));

    let content = cutoff(&message.content, MAX_CONTENT, true);
    if !content.trim().is_empty() {
        builder = builder.content(content);
    }
    for spec in message.embeds.iter().take(MAX_EMBEDS) {
        builder = builder.embed(embed_from_spec(spec));
    }
    if let (true, Some(original)) = (message.reply, reply_to) {
        builder = builder.reference_message(original);
    }

    let sent = channel_id.send_message(ctx, builder).await?;

    let responses: Vec<Option<String>> = message
        .buttons
        .iter()
        .map(|b| b.url.is_none().then(|| b.response.clone().unwrap_or_default()))
        .collect();
    if responses.iter().any(Option::is_some) {
        tokio::spawn(answer_buttons(ctx.clone(), sent.id, nonce, responses));
    }

    Ok(Some(sent))
}

/// Answer clicks on a tag response's buttons until [`BUTTON_TIMEOUT`] runs out.
async fn answer_buttons(
    ctx: serenity::Context,
    message_id: serenity::MessageId,
    nonce: u64,
    responses: Vec<Option<String>>,
) {
    let deadline = Instant::now() + BUTTON_TIMEOUT;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let Some(interaction) = serenity::ComponentInteractionCollector::new(&ctx)
            .message_id(message_id)
            .timeout(remaining)
            .await
        else {
            break;
        };

        let Some(response) = button_index(&interaction.data.custom_id, nonce)
            .and_then(|i| responses.get(i).cloned().flatten())
        else {
            continue;
        };

        let content = if response.trim().is_empty() {
            "\u{200b}".to_string()
        } else {
            cutoff(&response, MAX_CONTENT, true)
        };
        let reply = serenity::CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true);

        if let Err(e) = interaction
            .create_response(&ctx.http, serenity::CreateInteractionResponse::Message(reply))
            .await
        {
            tracing::warn!(message_id = message_id.get(), "Failed to answer tag button: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tags::environment::{EmbedAuthorSpec, EmbedFieldSpec};

    #[test]
    fn replies_do_not_ping_the_invoker() {
        let mentions = serde_json::to_value(tag_allowed_mentions()).unwrap();
        assert_eq!(mentions["replied_user"], serde_json::json!(false));
        assert!(mentions["parse"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("users")));
    }

    #[test]
    fn mentions_and_ids_parse() {
        assert_eq!(parse_user_mention("<@123>"), Some(123));
        assert_eq!(parse_user_mention("<@!456>"), Some(456));
        assert_eq!(parse_user_mention(" 789 "), Some(789));
        assert_eq!(parse_user_mention("<@&123>"), None);
        assert_eq!(parse_user_mention("wumpus"), None);
        assert_eq!(parse_user_mention("0"), None);
    }

    #[test]
    fn button_ids_round_trip_only_for_their_message() {
        let id = button_custom_id(42, 3);
        assert_eq!(button_index(&id, 42), Some(3));
        assert_eq!(button_index(&id, 43), None);
        assert_eq!(button_index("giveaway:enter", 42), None);
    }

    #[test]
    fn buttons_are_split_into_rows_of_five() {
        let buttons: Vec<TagButton> = (0..12)
            .map(|i| TagButton::respond(format!("b{i}"), "hi"))
            .collect();
        assert_eq!(button_rows(&buttons, 1).len(), 3);
        assert!(button_rows(&[], 1).is_empty());
    }

    #[test]
    fn embed_spec_maps_onto_the_builder() {
        let spec = EmbedSpec {
            title: Some("Hello".into()),
            color: Some(0xff0000),
            author: Some(EmbedAuthorSpec {
                name: "wumpus".into(),
                ..Default::default()
            }),
            fields: vec![EmbedFieldSpec {
                name: "a".into(),
                value: "b".into(),
                inline: true,
            }],
            ..Default::default()
        };

        let json = serde_json::to_value(embed_from_spec(&spec)).unwrap();
        assert_eq!(json["title"], "Hello");
        assert_eq!(json["color"], 0xff0000);
        assert_eq!(json["author"]["name"], "wumpus");
        assert_eq!(json["fields"][0]["inline"], true);
    }

    #[test]
    fn rendered_tags_become_single_messages() {
        let rendered = RenderedTag {
            content: "hi".into(),
            embed: Some(EmbedSpec::default()),
            buttons: vec![],
            should_reply: false,
        };
        let message = TagMessage::from(rendered);
        assert_eq!(message.embeds.len(), 1);
        assert!(!message.reply);
        assert!(!message.is_empty());

        let empty = TagMessage::from(PythonResponse {
            content: None,
            embeds: vec![],
            buttons: vec![],
            reply: true,
        });
        assert!(empty.is_empty());
    }
}
