// Per-guild settings: command prefixes and the giveaway role.

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub const MAX_PREFIXES: usize = 25;

// ============================================================================
// DOMAIN MODELS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSettings {
    pub guild_id: u64,
    pub prefixes: Vec<String>,
    pub giveaway_role_id: Option<u64>,
}

impl GuildSettings {
    pub fn new(guild_id: u64, default_prefix: &str) -> Self {
        Self {
            guild_id,
            prefixes: vec![default_prefix.to_string()],
            giveaway_role_id: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Please specify prefixes to {0}.")]
    NoPrefixes(&'static str),

    #[error("You cannot have more than 25 prefixes at once.")]
    TooManyPrefixes,

    #[error("You cannot have mentions in your prefixes.")]
    MentionInPrefix,
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_guild(&self, guild_id: u64) -> Result<Option<GuildSettings>, SettingsError>;
    async fn save_guild(&self, settings: &GuildSettings) -> Result<(), SettingsError>;
}

fn mention_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"<@!?\d+>").expect("mention pattern is valid"))
}

fn check_mentions(prefixes: &[String]) -> Result<(), SettingsError> {
    if prefixes.iter().any(|p| mention_regex().is_match(p)) {
        return Err(SettingsError::MentionInPrefix);
    }
    Ok(())
}

/// Split `content` on the first matching prefix. `prefixes` should already
/// be ordered longest first so "!!" wins over "!".
pub fn strip_prefix<'a>(content: &'a str, prefixes: &[String]) -> Option<(&'a str, &'a str)> {
    prefixes
        .iter()
        .filter(|p| !p.is_empty())
        .find_map(|p| {
            content
                .strip_prefix(p.as_str())
                .map(|rest| (&content[..p.len()], rest))
        })
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct SettingsService<S: SettingsStore> {
    store: S,
    cache: DashMap<u64, GuildSettings>,
    default_prefix: String,
}

impl<S: SettingsStore> SettingsService<S> {
    pub fn new(store: S, default_prefix: impl Into<String>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            default_prefix: default_prefix.into(),
        }
    }

    pub fn default_prefix(&self) -> &str {
        &self.default_prefix
    }

    pub async fn guild(&self, guild_id: u64) -> Result<GuildSettings, SettingsError> {
        if let Some(settings) = self.cache.get(&guild_id) {
            return Ok(settings.clone());
        }

        let settings = match self.store.get_guild(guild_id).await? {
            Some(settings) => settings,
            None => {
                let settings = GuildSettings::new(guild_id, &self.default_prefix);
                self.store.save_guild(&settings).await?;
                settings
            }
        };

        self.cache.insert(guild_id, settings.clone());
        Ok(settings)
    }

    async fn update<F>(&self, guild_id: u64, change: F) -> Result<GuildSettings, SettingsError>
    where
        F: FnOnce(&mut GuildSettings),
    {
        let mut settings = self.guild(guild_id).await?;
        change(&mut settings);
        self.store.save_guild(&settings).await?;
        self.cache.insert(guild_id, settings.clone());
        Ok(settings)
    }

    /// Prefixes to try for a message, longest first.
    pub async fn resolve_prefixes(&self, guild_id: Option<u64>) -> Result<Vec<String>, SettingsError> {
        let mut prefixes = match guild_id {
            Some(guild_id) => self.guild(guild_id).await?.prefixes,
            None => vec![self.default_prefix.clone()],
        };
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()));
        Ok(prefixes)
    }

    /// Add prefixes, skipping ones already present.
    pub async fn add_prefixes(&self, guild_id: u64, prefixes: &[String]) -> Result<(), SettingsError> {
        if prefixes.is_empty() {
            return Err(SettingsError::NoPrefixes("add"));
        }

        let current = self.guild(guild_id).await?;
        if current.prefixes.len() + prefixes.len() > MAX_PREFIXES {
            return Err(SettingsError::TooManyPrefixes);
        }
        check_mentions(prefixes)?;

        self.update(guild_id, |s| {
            for prefix in prefixes {
                if !s.prefixes.contains(prefix) {
                    s.prefixes.push(prefix.clone());
                }
            }
        })
        .await?;
        Ok(())
    }

    /// Remove prefixes. Returns how many were removed.
    pub async fn remove_prefixes(&self, guild_id: u64, prefixes: &[String]) -> Result<usize, SettingsError> {
        if prefixes.is_empty() {
            return Err(SettingsError::NoPrefixes("remove"));
        }

        let current = self.guild(guild_id).await?;
        let before = current.prefixes.len();
        let updated = self
            .update(guild_id, |s| s.prefixes.retain(|p| !prefixes.contains(p)))
            .await?;
        Ok(before - updated.prefixes.len())
    }

    /// Remove every prefix. Returns how many there were.
    pub async fn clear_prefixes(&self, guild_id: u64) -> Result<usize, SettingsError> {
        let before = self.guild(guild_id).await?.prefixes.len();
        if before > 0 {
            self.update(guild_id, |s| s.prefixes.clear()).await?;
        }
        Ok(before)
    }

    pub async fn overwrite_prefixes(&self, guild_id: u64, prefixes: &[String]) -> Result<(), SettingsError> {
        if prefixes.is_empty() {
            return Err(SettingsError::NoPrefixes("set"));
        }
        if prefixes.len() > MAX_PREFIXES {
            return Err(SettingsError::TooManyPrefixes);
        }
        check_mentions(prefixes)?;

        let mut deduplicated: Vec<String> = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            if !deduplicated.contains(prefix) {
                deduplicated.push(prefix.clone());
            }
        }

        self.update(guild_id, |s| s.prefixes = deduplicated).await?;
        Ok(())
    }

    pub async fn set_giveaway_role(&self, guild_id: u64, role_id: Option<u64>) -> Result<(), SettingsError> {
        self.update(guild_id, |s| s.giveaway_role_id = role_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        guilds: Mutex<HashMap<u64, GuildSettings>>,
    }

    #[async_trait]
    impl SettingsStore for MemoryStore {
        async fn get_guild(&self, guild_id: u64) -> Result<Option<GuildSettings>, SettingsError> {
            Ok(self.guilds.lock().unwrap().get(&guild_id).cloned())
        }

        async fn save_guild(&self, settings: &GuildSettings) -> Result<(), SettingsError> {
            self.guilds
                .lock()
                .unwrap()
                .insert(settings.guild_id, settings.clone());
            Ok(())
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn service() -> SettingsService<MemoryStore> {
        SettingsService::new(MemoryStore::default(), ">")
    }

    #[tokio::test]
    async fn new_guilds_start_with_the_default_prefix() {
        let service = service();
        assert_eq!(service.guild(1).await.unwrap().prefixes, strings(&[">"]));
        assert_eq!(service.resolve_prefixes(None).await.unwrap(), strings(&[">"]));
    }

    #[tokio::test]
    async fn prefixes_resolve_longest_first() {
        let service = service();
        service
            .add_prefixes(1, &strings(&["!", "lambda ", "!"]))
            .await
            .unwrap();

        let resolved = service.resolve_prefixes(Some(1)).await.unwrap();
        assert_eq!(resolved, strings(&["lambda ", ">", "!"]));
        assert_eq!(strip_prefix("lambda help", &resolved), Some(("lambda ", "help")));
        assert_eq!(strip_prefix("hello", &resolved), None);
    }

    #[tokio::test]
    async fn add_rejects_mentions_and_overflow() {
        let service = service();
        assert!(matches!(
            service.add_prefixes(1, &strings(&["<@!123>"])).await,
            Err(SettingsError::MentionInPrefix)
        ));

        let many: Vec<String> = (0..25).map(|i| format!("p{i}")).collect();
        assert!(matches!(
            service.add_prefixes(1, &many).await,
            Err(SettingsError::TooManyPrefixes)
        ));
        assert!(matches!(
            service.add_prefixes(1, &[]).await,
            Err(SettingsError::NoPrefixes("add"))
        ));
    }

    #[tokio::test]
    async fn remove_clear_and_overwrite() {
        let service = service();
        service.add_prefixes(1, &strings(&["!", "?"])).await.unwrap();

        assert_eq!(service.remove_prefixes(1, &strings(&["!", "nope"])).await.unwrap(), 1);
        assert_eq!(service.remove_prefixes(1, &strings(&["nope"])).await.unwrap(), 0);

        service.overwrite_prefixes(1, &strings(&["$", "$"])).await.unwrap();
        assert_eq!(service.guild(1).await.unwrap().prefixes, strings(&["$"]));

        assert_eq!(service.clear_prefixes(1).await.unwrap(), 1);
        assert_eq!(service.clear_prefixes(1).await.unwrap(), 0);
        assert!(service.resolve_prefixes(Some(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn giveaway_role_persists() {
        let service = service();
        service.set_giveaway_role(1, Some(42)).await.unwrap();
        let stored = service.store.get_guild(1).await.unwrap().unwrap();
        assert_eq!(stored.giveaway_role_id, Some(42));
    }
}
