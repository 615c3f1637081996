// The object model a tag program runs against.
//
// Everything here is plain data copied out of Discord before rendering starts,
// so parsing never has to await anything.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;
pub const CDN_BASE: &str = "https://cdn.discordapp.com";
pub const MAX_BUTTONS: usize = 25;

/// Creation time encoded in a Discord snowflake.
pub fn snowflake_time(id: u64) -> DateTime<Utc> {
    let millis = (id >> 22) as i64 + DISCORD_EPOCH_MS;
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

/// The way tags print dates, matching the usual `YYYY-MM-DD HH:MM:SS+00:00` form.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%:z").to_string()
}

// ============================================================================
// ASSETS
// ============================================================================

/// A CDN image such as an avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnAsset {
    /// Path below the CDN root, without extension.
    pub path: String,
    pub animated: bool,
}

impl CdnAsset {
    fn from_hash(path_prefix: String, hash: &str) -> Self {
        Self {
            path: format!("{path_prefix}/{hash}"),
            animated: hash.starts_with("a_"),
        }
    }

    /// Full URL. Static assets default to png, animated ones to gif.
    pub fn url(&self, format: Option<&str>, size: Option<u32>) -> String {
        let format = format.unwrap_or(if self.animated { "gif" } else { "png" });
        let mut url = format!("{CDN_BASE}/{}.{format}", self.path);
        if let Some(size) = size {
            url.push_str(&format!("?size={size}"));
        }
        url
    }
}

// ============================================================================
// USERS
// ============================================================================

/// A snapshot of a guild member (or plain user) that tags can read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TagUser {
    pub id: u64,
    pub name: String,
    /// `"0"` for accounts on the new username system.
    pub discriminator: String,
    pub global_name: Option<String>,
    pub nick: Option<String>,
    pub avatar: Option<String>,
    pub guild_avatar: Option<String>,
    pub guild_id: Option<u64>,
    pub joined_at: Option<DateTime<Utc>>,
    pub bot: bool,
}

impl TagUser {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }

    /// `name` for migrated accounts, `name#1234` otherwise.
    pub fn tag(&self) -> String {
        if self.discriminator.is_empty() || self.discriminator == "0" {
            self.name.clone()
        } else {
            format!("{}#{}", self.name, self.discriminator)
        }
    }

    pub fn display_name(&self) -> &str {
        self.nick
            .as_deref()
            .or(self.global_name.as_deref())
            .unwrap_or(&self.name)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        snowflake_time(self.id)
    }

    fn default_avatar_index(&self) -> u64 {
        if self.discriminator.is_empty() || self.discriminator == "0" {
            (self.id >> 22) % 6
        } else {
            self.discriminator.parse::<u64>().unwrap_or(0) % 5
        }
    }

    /// The global avatar, or Discord's default avatar when none is set.
    pub fn avatar_asset(&self) -> CdnAsset {
        match &self.avatar {
            Some(hash) => CdnAsset::from_hash(format!("avatars/{}", self.id), hash),
            None => CdnAsset {
                path: format!("embed/avatars/{}", self.default_avatar_index()),
                animated: false,
            },
        }
    }

    /// The per-guild avatar when present, otherwise [`avatar_asset`](Self::avatar_asset).
    pub fn display_avatar_asset(&self) -> CdnAsset {
        match (&self.guild_avatar, self.guild_id) {
            (Some(hash), Some(guild_id)) => CdnAsset::from_hash(
                format!("guilds/{guild_id}/users/{}/avatars", self.id),
                hash,
            ),
            _ => self.avatar_asset(),
        }
    }
}

/// Synchronous member lookup used by `{user(<id>)}`.
pub trait MemberDirectory: Send + Sync {
    fn member(&self, user_id: u64) -> Option<TagUser>;
}

/// Leveling numbers for the invoking member, fetched ahead of rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSnapshot {
    pub level: i64,
    pub xp: i64,
}

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedAuthorSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedFooterSpec {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedMediaSpec {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedFieldSpec {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// An embed in Discord's JSON shape, so user supplied JSON maps onto it directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooterSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMediaSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMediaSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedFieldSpec>,
}

/// Button styles as Discord numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ButtonStyleSpec {
    Primary,
    Secondary,
    Success,
    Danger,
    Link,
}

impl TryFrom<u8> for ButtonStyleSpec {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Primary),
            2 => Ok(Self::Secondary),
            3 => Ok(Self::Success),
            4 => Ok(Self::Danger),
            5 => Ok(Self::Link),
            other => Err(format!("unknown button style {other}")),
        }
    }
}

impl From<ButtonStyleSpec> for u8 {
    fn from(style: ButtonStyleSpec) -> Self {
        match style {
            ButtonStyleSpec::Primary => 1,
            ButtonStyleSpec::Secondary => 2,
            ButtonStyleSpec::Success => 3,
            ButtonStyleSpec::Danger => 4,
            ButtonStyleSpec::Link => 5,
        }
    }
}

/// A button attached to a tag response.
///
/// Link buttons carry `url`; every other style answers with `response`
/// ephemerally when clicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagButton {
    pub label: String,
    #[serde(default = "default_button_style")]
    pub style: ButtonStyleSpec,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_button_style() -> ButtonStyleSpec {
    ButtonStyleSpec::Primary
}

impl TagButton {
    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            style: ButtonStyleSpec::Link,
            response: None,
            url: Some(url.into()),
        }
    }

    pub fn respond(label: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            style: ButtonStyleSpec::Primary,
            response: Some(response.into()),
            url: None,
        }
    }
}

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Mutable state threaded through one render.
pub struct Environment {
    pub author: TagUser,
    pub target: TagUser,
    pub args: Vec<String>,
    /// Variables declared with `{set(name):value}`, keyed by lowercase name.
    pub vars: HashMap<String, String>,
    pub level: Option<LevelSnapshot>,
    pub members: Option<Arc<dyn MemberDirectory>>,

    pub embed: Option<EmbedSpec>,
    pub buttons: Vec<TagButton>,
    pub should_reply: bool,
}

impl Environment {
    /// The target defaults to the author.
    pub fn new(author: TagUser) -> Self {
        Self {
            target: author.clone(),
            author,
            args: Vec::new(),
            vars: HashMap::new(),
            level: None,
            members: None,
            embed: None,
            buttons: Vec::new(),
            should_reply: true,
        }
    }

    pub fn with_target(mut self, target: Option<TagUser>) -> Self {
        if let Some(target) = target {
            self.target = target;
        }
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_level(mut self, level: Option<LevelSnapshot>) -> Self {
        self.level = level;
        self
    }

    pub fn with_members(mut self, members: Arc<dyn MemberDirectory>) -> Self {
        self.members = Some(members);
        self
    }

    pub fn embed_mut(&mut self) -> &mut EmbedSpec {
        self.embed.get_or_insert_with(EmbedSpec::default)
    }
}

/// What a finished render produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTag {
    pub content: String,
    pub embed: Option<EmbedSpec>,
    pub buttons: Vec<TagButton>,
    pub should_reply: bool,
}

impl RenderedTag {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.embed.is_none() && self.buttons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> TagUser {
        TagUser {
            id: 175928847299117063,
            name: "wumpus".into(),
            discriminator: "0".into(),
            avatar: Some("a_abc".into()),
            guild_avatar: Some("def".into()),
            guild_id: Some(42),
            ..TagUser::default()
        }
    }

    #[test]
    fn snowflake_decodes_creation_time() {
        let created = snowflake_time(175928847299117063);
        assert_eq!(created.timestamp_millis(), 1_462_015_105_796);
    }

    #[test]
    fn animated_avatar_defaults_to_gif() {
        let url = user().avatar_asset().url(None, Some(256));
        assert_eq!(
            url,
            "https://cdn.discordapp.com/avatars/175928847299117063/a_abc.gif?size=256"
        );
    }

    #[test]
    fn display_avatar_prefers_guild_avatar() {
        let url = user().display_avatar_asset().url(Some("webp"), None);
        assert_eq!(
            url,
            "https://cdn.discordapp.com/guilds/42/users/175928847299117063/avatars/def.webp"
        );
    }

    #[test]
    fn missing_avatar_falls_back_to_default() {
        let mut plain = user();
        plain.avatar = None;
        plain.guild_avatar = None;
        assert!(plain
            .display_avatar_asset()
            .url(None, None)
            .starts_with("https://cdn.discordapp.com/embed/avatars/"));
    }

    #[test]
    fn legacy_tags_include_discriminator() {
        let mut legacy = user();
        legacy.discriminator = "1234".into();
        assert_eq!(legacy.tag(), "wumpus#1234");
        assert_eq!(user().tag(), "wumpus");
    }

    #[test]
    fn button_json_uses_numeric_styles() {
        let button: TagButton =
            serde_json::from_str(r#"{"label":"Go","style":5,"url":"https://x"}"#).unwrap();
        assert_eq!(button.style, ButtonStyleSpec::Link);
        assert_eq!(button.url.as_deref(), Some("https://x"));
    }
}
