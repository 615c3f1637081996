// Invite tracking: remember how often each invite was used so a new member
// can be matched to the invite whose use count went up.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// DOMAIN MODELS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedInvite {
    pub code: String,
    pub uses: u64,
    /// Display name of whoever created the invite, if Discord told us.
    pub inviter: Option<String>,
    pub channel_id: Option<u64>,
}

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// The line posted to the tracking channel when `member` joins.
pub fn join_message(member: &str, invite: &TrackedInvite) -> String {
    format!(
        "**{member}** joined using invite **{}** (invite created by {})",
        invite.code,
        invite.inviter.as_deref().unwrap_or("Unknown")
    )
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait InviteStore: Send + Sync {
    /// `(guild_id, channel_id)` for every guild with tracking enabled.
    async fn tracking_channels(&self) -> Result<Vec<(u64, u64)>, InviteError>;

    /// `None` turns tracking off for the guild.
    async fn set_channel(&self, guild_id: u64, channel_id: Option<u64>) -> Result<(), InviteError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct InviteService<S: InviteStore> {
    store: S,
    channels: DashMap<u64, u64>,
    invites: DashMap<u64, HashMap<String, TrackedInvite>>,
}

impl<S: InviteStore> InviteService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            channels: DashMap::new(),
            invites: DashMap::new(),
        }
    }

    /// Load tracking channels from storage. Returns the guilds being tracked.
    pub async fn load(&self) -> Result<Vec<u64>, InviteError> {
        let channels = self.store.tracking_channels().await?;
        for (guild_id, channel_id) in &channels {
            self.channels.insert(*guild_id, *channel_id);
        }
        Ok(channels.into_iter().map(|(guild_id, _)| guild_id).collect())
    }

    pub fn tracking_channel(&self, guild_id: u64) -> Option<u64> {
        self.channels.get(&guild_id).map(|c| *c)
    }

    /// Whether invite uses are cached for the guild yet.
    pub fn has_snapshot(&self, guild_id: u64) -> bool {
        self.invites.get(&guild_id).is_some_and(|i| !i.is_empty())
    }

    /// Send join messages to `channel_id`, enabling tracking if needed.
    pub async fn set_channel(&self, guild_id: u64, channel_id: u64) -> Result<(), InviteError> {
        self.store.set_channel(guild_id, Some(channel_id)).await?;
        self.channels.insert(guild_id, channel_id);
        tracing::info!(guild_id, channel_id, "Invite tracking enabled");
        Ok(())
    }

    /// Turn tracking off. Returns whether it was on.
    pub async fn disable(&self, guild_id: u64) -> Result<bool, InviteError> {
        self.store.set_channel(guild_id, None).await?;
        self.invites.remove(&guild_id);
        Ok(self.channels.remove(&guild_id).is_some())
    }

    /// Replace the cached invites of a guild with a fresh listing.
    pub fn replace_invites(&self, guild_id: u64, invites: Vec<TrackedInvite>) {
        let invites = invites
            .into_iter()
            .map(|invite| (invite.code.clone(), invite))
            .collect();
        self.invites.insert(guild_id, invites);
    }

    pub fn invite_created(&self, guild_id: u64, invite: TrackedInvite) {
        self.invites
            .entry(guild_id)
            .or_default()
            .insert(invite.code.clone(), invite);
    }

    pub fn invite_deleted(&self, guild_id: u64, code: &str) {
        if let Some(mut invites) = self.invites.get_mut(&guild_id) {
            invites.remove(code);
        }
    }

    /// Forget the invites pointing at a deleted channel.
    pub fn channel_deleted(&self, guild_id: u64, channel_id: u64) {
        if let Some(mut invites) = self.invites.get_mut(&guild_id) {
            invites.retain(|_, invite| invite.channel_id != Some(channel_id));
        }
    }

    /// Work out which invite a new member used by comparing `fresh` use
    /// counts with the cached ones. The cache is replaced by `fresh` either way.
    pub fn detect_join(&self, guild_id: u64, mut fresh: Vec<TrackedInvite>) -> Option<TrackedInvite> {
        fresh.sort_by(|a, b| a.code.cmp(&b.code));

        let used = {
            let cached = self.invites.get(&guild_id);
            fresh
                .iter()
                .find(|invite| {
                    let before = cached
                        .as_ref()
                        .and_then(|c| c.get(&invite.code))
                        .map_or(0, |old| old.uses);
                    invite.uses > before
                })
                .cloned()
        };

        self.replace_invites(guild_id, fresh);
        used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryInvites {
        channels: Mutex<BTreeMap<u64, u64>>,
    }

    #[async_trait]
    impl InviteStore for MemoryInvites {
        async fn tracking_channels(&self) -> Result<Vec<(u64, u64)>, InviteError> {
            Ok(self
                .channels
                .lock()
                .unwrap()
                .iter()
                .map(|(g, c)| (*g, *c))
                .collect())
        }

        async fn set_channel(&self, guild_id: u64, channel_id: Option<u64>) -> Result<(), InviteError> {
            let mut channels = self.channels.lock().unwrap();
            match channel_id {
                Some(channel_id) => channels.insert(guild_id, channel_id),
                None => channels.remove(&guild_id),
            };
            Ok(())
        }
    }

    fn invite(code: &str, uses: u64) -> TrackedInvite {
        TrackedInvite {
            code: code.to_string(),
            uses,
            inviter: Some("wumpus".into()),
            channel_id: Some(10),
        }
    }

    #[tokio::test]
    async fn channels_persist_and_reload() {
        let service = InviteService::new(MemoryInvites::default());
        service.set_channel(1, 50).await.unwrap();
        assert_eq!(service.tracking_channel(1), Some(50));

        let reloaded = InviteService::new(MemoryInvites {
            channels: Mutex::new(service.store.channels.lock().unwrap().clone()),
        });
        assert_eq!(reloaded.load().await.unwrap(), vec![1]);
        assert_eq!(reloaded.tracking_channel(1), Some(50));
    }

    #[tokio::test]
    async fn disabling_forgets_the_guild() {
        let service = InviteService::new(MemoryInvites::default());
        service.set_channel(1, 50).await.unwrap();
        service.replace_invites(1, vec![invite("abc", 1)]);

        assert!(service.disable(1).await.unwrap());
        assert_eq!(service.tracking_channel(1), None);
        assert!(!service.has_snapshot(1));
        assert!(!service.disable(1).await.unwrap());
        assert!(service.store.tracking_channels().await.unwrap().is_empty());
    }

    #[test]
    fn the_invite_whose_uses_went_up_is_found() {
        let service = InviteService::new(MemoryInvites::default());
        service.replace_invites(1, vec![invite("aaa", 3), invite("bbb", 7)]);

        let used = service.detect_join(1, vec![invite("bbb", 8), invite("aaa", 3)]);
        assert_eq!(used.map(|i| i.code), Some("bbb".to_string()));

        // The cache now holds the new counts, so nothing changed since.
        assert_eq!(service.detect_join(1, vec![invite("aaa", 3), invite("bbb", 8)]), None);
    }

    #[test]
    fn uncached_invites_count_from_zero() {
        let service = InviteService::new(MemoryInvites::default());
        service.replace_invites(1, vec![invite("aaa", 2)]);
        let used = service.detect_join(1, vec![invite("aaa", 2), invite("new", 1)]);
        assert_eq!(used.map(|i| i.code), Some("new".to_string()));
    }

    #[test]
    fn cache_follows_invite_events() {
        let service = InviteService::new(MemoryInvites::default());
        assert!(!service.has_snapshot(1));

        service.invite_created(1, invite("aaa", 0));
        service.invite_created(1, TrackedInvite {
            channel_id: Some(20),
            ..invite("bbb", 0)
        });
        assert!(service.has_snapshot(1));

        service.channel_deleted(1, 20);
        service.invite_deleted(1, "aaa");
        assert!(!service.has_snapshot(1));
    }

    #[test]
    fn join_messages_name_the_inviter() {
        assert_eq!(
            join_message("newbie", &invite("abc", 1)),
            "**newbie** joined using invite **abc** (invite created by wumpus)"
        );
        let anonymous = TrackedInvite {
            inviter: None,
            ..invite("abc", 1)
        };
        assert!(join_message("newbie", &anonymous).ends_with("(invite created by Unknown)"));
    }
}
