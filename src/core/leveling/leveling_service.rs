// The leveling service: all the XP business logic, no Discord code.
// It works on IDs and numbers so the Discord layer stays a thin adapter.

use super::models::{
    CooldownManager, CooldownSettings, GainRange, LevelUpChannel, LevelUpEvent, LevelingConfig,
    LevelingRecord, MessageActivity, RankInfo,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Instant;
use thiserror::Error;

pub const MAX_LEADERBOARD_SIZE: usize = 100;
/// Largest amount of XP one manual adjustment may add or remove.
pub const MAX_XP_ADJUSTMENT: i64 = 1_000_000;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LevelingError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid user or guild ID")]
    InvalidId,

    #[error("Minimum gain must be between 1 and 500, and at most the maximum gain")]
    InvalidGain,

    #[error("Cooldown rate must be at least 1 and the window must be between 1 second and 1 day")]
    InvalidCooldown,

    #[error("Level must be between 0 and 500")]
    InvalidLevel,

    #[error("You can only add or remove up to 1,000,000 XP at once")]
    InvalidXpAmount,
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait LevelingStore: Send + Sync {
    async fn get_config(&self, guild_id: u64) -> Result<Option<LevelingConfig>, LevelingError>;

    async fn save_config(&self, config: &LevelingConfig) -> Result<(), LevelingError>;

    async fn get_record(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<LevelingRecord>, LevelingError>;

    async fn save_record(&self, record: &LevelingRecord) -> Result<(), LevelingError>;

    async fn delete_record(&self, guild_id: u64, user_id: u64) -> Result<bool, LevelingError>;

    /// Members with any progress, ordered by (level, xp) descending.
    async fn leaderboard(
        &self,
        guild_id: u64,
        limit: usize,
    ) -> Result<Vec<LevelingRecord>, LevelingError>;

    /// How many members are strictly ahead of (level, xp).
    async fn count_ahead(&self, guild_id: u64, level: i64, xp: i64) -> Result<u64, LevelingError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct LevelingService<S: LevelingStore> {
    store: S,
    configs: DashMap<u64, LevelingConfig>,
    cooldowns: CooldownManager,
}

impl<S: LevelingStore> LevelingService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            configs: DashMap::new(),
            cooldowns: CooldownManager::new(),
        }
    }

    fn validate_ids(guild_id: u64, user_id: u64) -> Result<(), LevelingError> {
        if user_id == 0 || guild_id == 0 {
            Err(LevelingError::InvalidId)
        } else {
            Ok(())
        }
    }

    /// The guild's config, created with defaults on first access.
    pub async fn config(&self, guild_id: u64) -> Result<LevelingConfig, LevelingError> {
        if let Some(config) = self.configs.get(&guild_id) {
            return Ok(config.clone());
        }

        let config = match self.store.get_config(guild_id).await? {
            Some(config) => config,
            None => {
                let config = LevelingConfig::new(guild_id);
                self.store.save_config(&config).await?;
                config
            }
        };

        self.configs.insert(guild_id, config.clone());
        Ok(config)
    }

    /// Apply `change` to the guild's config and persist it.
    pub async fn update_config<F>(&self, guild_id: u64, change: F) -> Result<LevelingConfig, LevelingError>
    where
        F: FnOnce(&mut LevelingConfig),
    {
        let mut config = self.config(guild_id).await?;
        let previous_cooldown = config.cooldown;
        change(&mut config);

        self.store.save_config(&config).await?;
        if config.cooldown != previous_cooldown {
            self.cooldowns.reset_guild(guild_id);
        }
        self.configs.insert(guild_id, config.clone());

        tracing::debug!(guild_id, "Updated leveling config");
        Ok(config)
    }

    pub async fn set_module_enabled(&self, guild_id: u64, enabled: bool) -> Result<LevelingConfig, LevelingError> {
        self.update_config(guild_id, |c| c.module_enabled = enabled).await
    }

    pub async fn set_role_stack(&self, guild_id: u64, stack: bool) -> Result<LevelingConfig, LevelingError> {
        self.update_config(guild_id, |c| c.role_stack = stack).await
    }

    pub async fn set_level_role(
        &self,
        guild_id: u64,
        role_id: u64,
        level: Option<i64>,
    ) -> Result<LevelingConfig, LevelingError> {
        if let Some(level) = level {
            if !(0..=500).contains(&level) {
                return Err(LevelingError::InvalidLevel);
            }
        }

        self.update_config(guild_id, |c| match level {
            Some(level) => {
                c.level_roles.insert(role_id, level);
            }
            None => {
                c.level_roles.remove(&role_id);
            }
        })
        .await
    }

    /// Set the default message, or the special message for one level.
    /// `None` removes it.
    pub async fn set_level_up_message(
        &self,
        guild_id: u64,
        level: Option<i64>,
        message: Option<String>,
    ) -> Result<LevelingConfig, LevelingError> {
        self.update_config(guild_id, |c| match (level, message) {
            (None, message) => c.level_up_message = message,
            (Some(level), Some(message)) => {
                c.special_level_up_messages.insert(level, message);
            }
            (Some(level), None) => {
                c.special_level_up_messages.remove(&level);
            }
        })
        .await
    }

    pub async fn set_level_up_channel(
        &self,
        guild_id: u64,
        channel: LevelUpChannel,
    ) -> Result<LevelingConfig, LevelingError> {
        self.update_config(guild_id, |c| c.level_up_channel = channel).await
    }

    pub async fn set_gain(&self, guild_id: u64, gain: GainRange) -> Result<LevelingConfig, LevelingError> {
        if gain.min == 0 || gain.max > 500 || gain.min > gain.max {
            return Err(LevelingError::InvalidGain);
        }
        self.update_config(guild_id, |c| c.spec.gain = gain).await
    }

    pub async fn set_cooldown(
        &self,
        guild_id: u64,
        cooldown: CooldownSettings,
    ) -> Result<LevelingConfig, LevelingError> {
        if cooldown.rate == 0 || !(1.0..=86_400.0).contains(&cooldown.per) {
            return Err(LevelingError::InvalidCooldown);
        }
        self.update_config(guild_id, |c| c.cooldown = cooldown).await
    }

    pub async fn record(&self, guild_id: u64, user_id: u64) -> Result<LevelingRecord, LevelingError> {
        Self::validate_ids(guild_id, user_id)?;
        Ok(self
            .store
            .get_record(guild_id, user_id)
            .await?
            .unwrap_or_else(|| LevelingRecord::new(guild_id, user_id)))
    }

    /// Award XP for a message if the member is allowed to gain right now.
    ///
    /// Returns `Some` only when the member reached a new level.
    pub async fn process_message(
        &self,
        activity: &MessageActivity,
    ) -> Result<Option<LevelUpEvent>, LevelingError> {
        Self::validate_ids(activity.guild_id, activity.user_id)?;

        let config = self.config(activity.guild_id).await?;
        if !config.module_enabled
            || config.is_blacklisted(activity.user_id, activity.channel_id, &activity.role_ids)
        {
            return Ok(None);
        }

        if self
            .cooldowns
            .update_rate_limit(
                activity.guild_id,
                activity.user_id,
                config.cooldown,
                Instant::now(),
            )
            .is_some()
        {
            return Ok(None);
        }

        let multiplier = config.multiplier(activity.channel_id, &activity.role_ids);
        let gain = config.spec.xp_gain(multiplier);
        self.add_xp(&config, activity.user_id, gain, &activity.role_ids)
            .await
    }

    /// Add (or with a negative amount, remove) XP from a member.
    pub async fn adjust_xp(
        &self,
        guild_id: u64,
        user_id: u64,
        amount: i64,
        role_ids: &[u64],
    ) -> Result<Option<LevelUpEvent>, LevelingError> {
        Self::validate_ids(guild_id, user_id)?;
        if !(-MAX_XP_ADJUSTMENT..=MAX_XP_ADJUSTMENT).contains(&amount) {
            return Err(LevelingError::InvalidXpAmount);
        }
        let config = self.config(guild_id).await?;
        self.add_xp(&config, user_id, amount, role_ids).await
    }

    async fn add_xp(
        &self,
        config: &LevelingConfig,
        user_id: u64,
        amount: i64,
        role_ids: &[u64],
    ) -> Result<Option<LevelUpEvent>, LevelingError> {
        let mut record = self.record(config.guild_id, user_id).await?;
        let old_level = record.level;

        let (level, xp) = config.spec.apply_xp(record.level, record.xp, amount);
        record.level = level;
        record.xp = xp;
        self.store.save_record(&record).await?;

        if level <= old_level {
            return Ok(None);
        }

        tracing::info!(
            guild_id = config.guild_id,
            user_id,
            old_level,
            new_level = level,
            "Member leveled up"
        );

        Ok(Some(LevelUpEvent {
            guild_id: config.guild_id,
            user_id,
            old_level,
            new_level: level,
            xp,
            template: config.level_up_template(level).map(str::to_string),
            channel: config.level_up_channel,
            roles: config.role_changes(level, role_ids),
        }))
    }

    pub async fn rank_of(&self, guild_id: u64, user_id: u64) -> Result<RankInfo, LevelingError> {
        let config = self.config(guild_id).await?;
        let record = self.record(guild_id, user_id).await?;
        let ahead = self
            .store
            .count_ahead(guild_id, record.level, record.xp)
            .await?;

        Ok(RankInfo {
            record,
            rank: ahead + 1,
            max_xp: config.spec.level_requirement_for(record.level + 1),
        })
    }

    /// The top members of a guild, at most [`MAX_LEADERBOARD_SIZE`].
    pub async fn leaderboard(&self, guild_id: u64) -> Result<Vec<RankInfo>, LevelingError> {
        if guild_id == 0 {
            return Err(LevelingError::InvalidId);
        }
        let config = self.config(guild_id).await?;
        let records = self
            .store
            .leaderboard(guild_id, MAX_LEADERBOARD_SIZE)
            .await?;

        Ok(records
            .into_iter()
            .enumerate()
            .map(|(i, record)| RankInfo {
                record,
                rank: i as u64 + 1,
                max_xp: config.spec.level_requirement_for(record.level + 1),
            })
            .collect())
    }

    /// Called when a member leaves. Wipes their progress if the guild asks for it.
    pub async fn handle_member_leave(&self, guild_id: u64, user_id: u64) -> Result<bool, LevelingError> {
        let config = self.config(guild_id).await?;
        if !config.reset_on_leave {
            return Ok(false);
        }
        self.reset_member(guild_id, user_id).await
    }

    pub async fn reset_member(&self, guild_id: u64, user_id: u64) -> Result<bool, LevelingError> {
        Self::validate_ids(guild_id, user_id)?;
        self.store.delete_record(guild_id, user_id).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        configs: Mutex<Vec<LevelingConfig>>,
        records: Mutex<Vec<LevelingRecord>>,
    }

    #[async_trait]
    impl LevelingStore for MemoryStore {
        async fn get_config(&self, guild_id: u64) -> Result<Option<LevelingConfig>, LevelingError> {
            Ok(self
                .configs
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.guild_id == guild_id)
                .cloned())
        }

        async fn save_config(&self, config: &LevelingConfig) -> Result<(), LevelingError> {
            let mut configs = self.configs.lock().unwrap();
            configs.retain(|c| c.guild_id != config.guild_id);
            configs.push(config.clone());
            Ok(())
        }

        async fn get_record(&self, guild_id: u64, user_id: u64) -> Result<Option<LevelingRecord>, LevelingError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.guild_id == guild_id && r.user_id == user_id)
                .copied())
        }

        async fn save_record(&self, record: &LevelingRecord) -> Result<(), LevelingError> {
            let mut records = self.records.lock().unwrap();
            records.retain(|r| !(r.guild_id == record.guild_id && r.user_id == record.user_id));
            records.push(*record);
            Ok(())
        }

        async fn delete_record(&self, guild_id: u64, user_id: u64) -> Result<bool, LevelingError> {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|r| !(r.guild_id == guild_id && r.user_id == user_id));
            Ok(records.len() != before)
        }

        async fn leaderboard(&self, guild_id: u64, limit: usize) -> Result<Vec<LevelingRecord>, LevelingError> {
            let mut records: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.guild_id == guild_id && (r.level, r.xp) > (0, 0))
                .copied()
                .collect();
            records.sort_by(|a, b| (b.level, b.xp).cmp(&(a.level, a.xp)));
            records.truncate(limit);
            Ok(records)
        }

        async fn count_ahead(&self, guild_id: u64, level: i64, xp: i64) -> Result<u64, LevelingError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.guild_id == guild_id && (r.level, r.xp) > (level, xp))
                .count() as u64)
        }
    }

    fn activity(user_id: u64) -> MessageActivity {
        MessageActivity {
            guild_id: 1,
            channel_id: 10,
            user_id,
            role_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn disabled_module_awards_nothing() {
        let service = LevelingService::new(MemoryStore::default());
        assert!(service.process_message(&activity(5)).await.unwrap().is_none());
        assert_eq!(service.record(1, 5).await.unwrap().xp, 0);
    }

    #[tokio::test]
    async fn messages_award_xp_once_per_window() {
        let service = LevelingService::new(MemoryStore::default());
        service.set_module_enabled(1, true).await.unwrap();

        service.process_message(&activity(5)).await.unwrap();
        let first = service.record(1, 5).await.unwrap().xp;
        assert!((8..=15).contains(&first));

        service.process_message(&activity(5)).await.unwrap();
        assert_eq!(service.record(1, 5).await.unwrap().xp, first);
    }

    #[tokio::test]
    async fn blacklisted_channels_are_ignored() {
        let service = LevelingService::new(MemoryStore::default());
        service
            .update_config(1, |c| {
                c.module_enabled = true;
                c.blacklisted_channels.insert(10);
            })
            .await
            .unwrap();

        service.process_message(&activity(5)).await.unwrap();
        assert_eq!(service.record(1, 5).await.unwrap().xp, 0);
    }

    #[tokio::test]
    async fn level_up_event_carries_template_and_roles() {
        let service = LevelingService::new(MemoryStore::default());
        service.set_level_role(1, 77, Some(1)).await.unwrap();

        let event = service
            .adjust_xp(1, 5, 150, &[])
            .await
            .unwrap()
            .expect("level up");
        assert_eq!(event.old_level, 0);
        assert_eq!(event.new_level, 1);
        assert_eq!(event.xp, 50);
        assert_eq!(event.roles.grant, vec![77]);
        assert!(event.template.unwrap().contains("{user.mention}"));
    }

    #[tokio::test]
    async fn manual_adjustments_are_bounded() {
        let service = LevelingService::new(MemoryStore::default());
        assert!(matches!(
            service.adjust_xp(1, 5, i64::MAX, &[]).await,
            Err(LevelingError::InvalidXpAmount)
        ));
        assert!(matches!(
            service.adjust_xp(1, 5, -MAX_XP_ADJUSTMENT - 1, &[]).await,
            Err(LevelingError::InvalidXpAmount)
        ));
        assert_eq!(service.record(1, 5).await.unwrap().xp, 0);

        service.adjust_xp(1, 5, MAX_XP_ADJUSTMENT, &[]).await.unwrap();
        assert!(service.record(1, 5).await.unwrap().level > 0);
    }

    #[tokio::test]
    async fn rank_and_leaderboard_order_by_level_then_xp() {
        let service = LevelingService::new(MemoryStore::default());
        service.adjust_xp(1, 5, 50, &[]).await.unwrap();
        service.adjust_xp(1, 6, 150, &[]).await.unwrap();
        service.adjust_xp(1, 7, 60, &[]).await.unwrap();

        let board = service.leaderboard(1).await.unwrap();
        let order: Vec<u64> = board.iter().map(|r| r.record.user_id).collect();
        assert_eq!(order, vec![6, 7, 5]);

        let rank = service.rank_of(1, 5).await.unwrap();
        assert_eq!(rank.rank, 3);
        assert_eq!(rank.max_xp, 100);
    }

    #[tokio::test]
    async fn leaving_resets_only_when_configured() {
        let service = LevelingService::new(MemoryStore::default());
        service.adjust_xp(1, 5, 50, &[]).await.unwrap();

        assert!(!service.handle_member_leave(1, 5).await.unwrap());
        service.update_config(1, |c| c.reset_on_leave = true).await.unwrap();
        assert!(service.handle_member_leave(1, 5).await.unwrap());
        assert_eq!(service.record(1, 5).await.unwrap().xp, 0);
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected() {
        let service = LevelingService::new(MemoryStore::default());
        assert!(matches!(
            service.set_gain(1, GainRange { min: 20, max: 10 }).await,
            Err(LevelingError::InvalidGain)
        ));
        assert!(matches!(
            service.set_cooldown(1, CooldownSettings { rate: 0, per: 10.0 }).await,
            Err(LevelingError::InvalidCooldown)
        ));
        assert!(matches!(
            service.process_message(&MessageActivity { guild_id: 0, ..activity(1) }).await,
            Err(LevelingError::InvalidId)
        ));
    }
}
