// Giveaways: a message with an enter button, backed by a "giveaway_end"
// timer whose ID doubles as the giveaway ID.

use crate::core::timers::{Timer, TimerError, TimerManager, TimerStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

pub const GIVEAWAY_END_EVENT: &str = "giveaway_end";

pub const MIN_DURATION_SECONDS: u64 = 5;
pub const MAX_DURATION_SECONDS: u64 = 86_400 * 30;
pub const MAX_WINNERS: u32 = 20;
pub const MAX_LEVEL_REQUIREMENT: i64 = 500;
pub const MAX_PRIZE_LENGTH: usize = 100;
pub const MAX_ROLES: usize = 10;
pub const MAX_MESSAGE_LENGTH: usize = 1000;
pub const MAX_MESSAGE_NEWLINES: usize = 10;

// ============================================================================
// DOMAIN MODELS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Giveaway {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub timer_id: i64,
    pub level_requirement: i64,
    /// Entrants need at least one of these roles. Empty means anyone.
    pub roles_requirement: BTreeSet<u64>,
    pub prize: String,
    pub winners: u32,
}

impl Giveaway {
    pub fn id(&self) -> i64 {
        self.timer_id
    }
}

/// What a host asks for when starting a giveaway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiveawayOptions {
    pub duration: std::time::Duration,
    pub prize: String,
    pub winners: u32,
    pub message: Option<String>,
    pub level: i64,
    pub roles: Vec<u64>,
}

/// Outcome of a finished giveaway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiveawayResult {
    pub giveaway: Giveaway,
    pub entrant_count: usize,
    pub winners: Vec<u64>,
}

impl GiveawayResult {
    /// The announcement posted as a reply to the giveaway message.
    pub fn announcement(&self) -> String {
        if self.entrant_count == 0 {
            return "No one entered the giveaway.".to_string();
        }

        let heading = if self.winners.len() == 1 { "Winner" } else { "Winners" };
        let s = if self.entrant_count == 1 { "" } else { "s" };
        let list: Vec<String> = self.winners.iter().map(|id| format!("- <@{id}>")).collect();

        format!(
            "### {heading} of **{}**: *(out of {} entrant{s})*\n{}",
            self.giveaway.prize,
            crate::core::formatting::format_thousands(self.entrant_count as f64),
            list.join("\n")
        )
    }
}

#[derive(Debug, Error)]
pub enum GiveawayError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("You must have the Manage Server permission to create giveaways.")]
    MissingPermission,

    #[error("You must have the <@&{0}> role or the Manage Server permission to create giveaways.")]
    MissingPermissionOrRole(u64),

    #[error("The giveaway duration must be between 5 seconds and 30 days.")]
    InvalidDuration,

    #[error("The number of winners must be between 1 and 20.")]
    InvalidWinners,

    #[error("The level requirement must be between 0 and 500.")]
    InvalidLevel,

    #[error("The prize must be between 1 and 100 characters.")]
    InvalidPrize,

    #[error("You may only have up to 10 roles.")]
    TooManyRoles,

    #[error("The message must be between 1 and 1000 characters.")]
    InvalidMessage,

    #[error("The message can have at most 10 newlines.")]
    TooManyNewlines,

    #[error("You must be level **{required}** to enter this giveaway. (You are level {current})")]
    LevelTooLow { required: i64, current: i64 },

    #[error("You must have one of the following roles to enter this giveaway:\n{}", format_roles(.0))]
    MissingRole(Vec<u64>),

    #[error("This message is not a giveaway, or it has already ended.")]
    NotFound,
}

fn format_roles(roles: &[u64]) -> String {
    roles
        .iter()
        .map(|id| format!("- <@&{id}>"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<TimerError> for GiveawayError {
    fn from(error: TimerError) -> Self {
        match error {
            TimerError::StorageError(e) => Self::StorageError(e),
        }
    }
}

/// When a giveaway started at `now` with `duration` would end.
pub fn ends_at(now: DateTime<Utc>, duration: std::time::Duration) -> DateTime<Utc> {
    now + Duration::seconds(duration.as_secs() as i64)
}

/// Hosts need Manage Server or the guild's giveaway role.
pub fn check_host_permission(
    manage_guild: bool,
    member_roles: &[u64],
    giveaway_role: Option<u64>,
) -> Result<(), GiveawayError> {
    if manage_guild {
        return Ok(());
    }
    match giveaway_role {
        Some(role) if member_roles.contains(&role) => Ok(()),
        Some(role) => Err(GiveawayError::MissingPermissionOrRole(role)),
        None => Err(GiveawayError::MissingPermission),
    }
}

pub fn validate_options(options: &GiveawayOptions) -> Result<(), GiveawayError> {
    let seconds = options.duration.as_secs();
    if !(MIN_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&seconds) {
        return Err(GiveawayError::InvalidDuration);
    }
    if !(1..=MAX_WINNERS).contains(&options.winners) {
        return Err(GiveawayError::InvalidWinners);
    }
    if !(0..=MAX_LEVEL_REQUIREMENT).contains(&options.level) {
        return Err(GiveawayError::InvalidLevel);
    }
    if !(1..=MAX_PRIZE_LENGTH).contains(&options.prize.chars().count()) {
        return Err(GiveawayError::InvalidPrize);
    }
    if options.roles.len() > MAX_ROLES {
        return Err(GiveawayError::TooManyRoles);
    }
    if let Some(message) = &options.message {
        if !(1..=MAX_MESSAGE_LENGTH).contains(&message.chars().count()) {
            return Err(GiveawayError::InvalidMessage);
        }
        if message.matches('\n').count() > MAX_MESSAGE_NEWLINES {
            return Err(GiveawayError::TooManyNewlines);
        }
    }
    Ok(())
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait GiveawayStore: Send + Sync {
    async fn insert(&self, giveaway: &Giveaway) -> Result<(), GiveawayError>;
    async fn list_all(&self) -> Result<Vec<Giveaway>, GiveawayError>;
    /// Delete the giveaway and its entrants.
    async fn delete(&self, giveaway_id: i64) -> Result<bool, GiveawayError>;

    /// Add an entrant (no-op if already entered). Returns the entrant count.
    async fn add_entrant(&self, giveaway_id: i64, user_id: u64) -> Result<u64, GiveawayError>;
    async fn remove_entrant(&self, giveaway_id: i64, user_id: u64) -> Result<bool, GiveawayError>;
    async fn entrants(&self, giveaway_id: i64) -> Result<Vec<u64>, GiveawayError>;

    /// Drop giveaways backed by in-memory timers, which do not survive a restart.
    async fn purge_temporary(&self) -> Result<u64, GiveawayError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct GiveawayService<S: GiveawayStore, T: TimerStore> {
    store: S,
    timers: Arc<TimerManager<T>>,
    cache: DashMap<i64, Giveaway>,
    lookup: DashMap<(u64, u64), i64>,
}

impl<S: GiveawayStore, T: TimerStore> GiveawayService<S, T> {
    pub fn new(store: S, timers: Arc<TimerManager<T>>) -> Self {
        Self {
            store,
            timers,
            cache: DashMap::new(),
            lookup: DashMap::new(),
        }
    }

    fn register(&self, giveaway: Giveaway) {
        self.lookup
            .insert((giveaway.channel_id, giveaway.message_id), giveaway.id());
        self.cache.insert(giveaway.id(), giveaway);
    }

    fn unregister(&self, giveaway: &Giveaway) {
        self.cache.remove(&giveaway.id());
        self.lookup.remove(&(giveaway.channel_id, giveaway.message_id));
    }

    /// Load running giveaways into memory. Returns them so their buttons can
    /// be listened for.
    pub async fn load(&self) -> Result<Vec<Giveaway>, GiveawayError> {
        let purged = self.store.purge_temporary().await?;
        if purged > 0 {
            tracing::info!(purged, "Dropped giveaways from a previous run");
        }

        let giveaways = self.store.list_all().await?;
        for giveaway in &giveaways {
            self.register(giveaway.clone());
        }
        tracing::info!(count = giveaways.len(), "Loaded running giveaways");
        Ok(giveaways)
    }

    /// Register a giveaway whose message has already been sent.
    pub async fn create(
        &self,
        guild_id: u64,
        channel_id: u64,
        message_id: u64,
        options: &GiveawayOptions,
        ends_at: DateTime<Utc>,
    ) -> Result<Giveaway, GiveawayError> {
        validate_options(options)?;

        let timer = self
            .timers
            .create(ends_at, GIVEAWAY_END_EVENT, json!({}))
            .await?;

        let giveaway = Giveaway {
            guild_id,
            channel_id,
            message_id,
            timer_id: timer.id,
            level_requirement: options.level,
            roles_requirement: options.roles.iter().copied().collect(),
            prize: options.prize.clone(),
            winners: options.winners,
        };

        self.store.insert(&giveaway).await?;
        self.register(giveaway.clone());

        tracing::info!(guild_id, id = giveaway.id(), prize = %giveaway.prize, "Started giveaway");
        Ok(giveaway)
    }

    pub fn get(&self, giveaway_id: i64) -> Option<Giveaway> {
        self.cache.get(&giveaway_id).map(|g| g.clone())
    }

    pub fn lookup(&self, channel_id: u64, message_id: u64) -> Option<Giveaway> {
        let id = *self.lookup.get(&(channel_id, message_id))?;
        self.get(id)
    }

    /// Enter a member. Returns the entrant count afterwards.
    pub async fn enter(
        &self,
        giveaway: &Giveaway,
        user_id: u64,
        user_level: i64,
        member_roles: &[u64],
    ) -> Result<u64, GiveawayError> {
        if giveaway.level_requirement > 0 && user_level < giveaway.level_requirement {
            return Err(GiveawayError::LevelTooLow {
                required: giveaway.level_requirement,
                current: user_level,
            });
        }

        let roles = &giveaway.roles_requirement;
        if !roles.is_empty() && !member_roles.iter().any(|r| roles.contains(r)) {
            return Err(GiveawayError::MissingRole(roles.iter().copied().collect()));
        }

        self.store.add_entrant(giveaway.id(), user_id).await
    }

    pub async fn leave(&self, giveaway: &Giveaway, user_id: u64) -> Result<bool, GiveawayError> {
        self.store.remove_entrant(giveaway.id(), user_id).await
    }

    /// Handle an expired "giveaway_end" timer: draw winners and forget the giveaway.
    pub async fn finish(&self, timer: &Timer) -> Result<Option<GiveawayResult>, GiveawayError> {
        let Some(giveaway) = self.get(timer.id) else {
            tracing::debug!(id = timer.id, "Timer fired for an unknown giveaway");
            return Ok(None);
        };

        let entrants = self.store.entrants(giveaway.id()).await?;
        let count = (giveaway.winners as usize).min(entrants.len());
        let winners: Vec<u64> = entrants
            .choose_multiple(&mut rand::thread_rng(), count)
            .copied()
            .collect();

        self.store.delete(giveaway.id()).await?;
        self.unregister(&giveaway);

        tracing::info!(id = giveaway.id(), entrants = entrants.len(), "Giveaway ended");
        Ok(Some(GiveawayResult {
            giveaway,
            entrant_count: entrants.len(),
            winners,
        }))
    }

    /// End the giveaway posted as `message_id` right away.
    pub async fn end_early(&self, channel_id: u64, message_id: u64) -> Result<(), GiveawayError> {
        let giveaway = self
            .lookup(channel_id, message_id)
            .ok_or(GiveawayError::NotFound)?;
        let timer = self
            .timers
            .get(giveaway.id())
            .await?
            .ok_or(GiveawayError::NotFound)?;

        self.timers.end_timer(&timer, true, true).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryGiveaways {
        giveaways: Mutex<BTreeMap<i64, Giveaway>>,
        entrants: Mutex<BTreeMap<i64, BTreeSet<u64>>>,
    }

    #[async_trait]
    impl GiveawayStore for MemoryGiveaways {
        async fn insert(&self, giveaway: &Giveaway) -> Result<(), GiveawayError> {
            self.giveaways
                .lock()
                .unwrap()
                .insert(giveaway.id(), giveaway.clone());
            Ok(())
        }

        async fn list_all(&self) -> Result<Vec<Giveaway>, GiveawayError> {
            Ok(self.giveaways.lock().unwrap().values().cloned().collect())
        }

        async fn delete(&self, giveaway_id: i64) -> Result<bool, GiveawayError> {
            self.entrants.lock().unwrap().remove(&giveaway_id);
            Ok(self.giveaways.lock().unwrap().remove(&giveaway_id).is_some())
        }

        async fn add_entrant(&self, giveaway_id: i64, user_id: u64) -> Result<u64, GiveawayError> {
            let mut entrants = self.entrants.lock().unwrap();
            let set = entrants.entry(giveaway_id).or_default();
            set.insert(user_id);
            Ok(set.len() as u64)
        }

        async fn remove_entrant(&self, giveaway_id: i64, user_id: u64) -> Result<bool, GiveawayError> {
            Ok(self
                .entrants
                .lock()
                .unwrap()
                .get_mut(&giveaway_id)
                .is_some_and(|s| s.remove(&user_id)))
        }

        async fn entrants(&self, giveaway_id: i64) -> Result<Vec<u64>, GiveawayError> {
            Ok(self
                .entrants
                .lock()
                .unwrap()
                .get(&giveaway_id)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default())
        }

        async fn purge_temporary(&self) -> Result<u64, GiveawayError> {
            let mut giveaways = self.giveaways.lock().unwrap();
            let before = giveaways.len();
            giveaways.retain(|id, _| *id >= 0);
            Ok((before - giveaways.len()) as u64)
        }
    }

    #[derive(Default)]
    struct MemoryTimers {
        timers: Mutex<Vec<Timer>>,
    }

    #[async_trait]
    impl TimerStore for MemoryTimers {
        async fn insert(
            &self,
            event: &str,
            created_at: DateTime<Utc>,
            expires_at: DateTime<Utc>,
            metadata: &Value,
        ) -> Result<i64, TimerError> {
            let mut timers = self.timers.lock().unwrap();
            let id = timers.len() as i64 + 1;
            timers.push(Timer {
                id,
                event: event.to_string(),
                created_at,
                expires_at,
                metadata: metadata.clone(),
            });
            Ok(id)
        }

        async fn get(&self, id: i64) -> Result<Option<Timer>, TimerError> {
            Ok(self.timers.lock().unwrap().iter().find(|t| t.id == id).cloned())
        }

        async fn earliest(&self) -> Result<Option<Timer>, TimerError> {
            Ok(None)
        }

        async fn delete(&self, id: i64) -> Result<bool, TimerError> {
            let mut timers = self.timers.lock().unwrap();
            let before = timers.len();
            timers.retain(|t| t.id != id);
            Ok(before != timers.len())
        }

        async fn update_metadata(&self, _id: i64, _metadata: &Value) -> Result<bool, TimerError> {
            Ok(false)
        }

        async fn list_for_event(&self, _event: &str) -> Result<Vec<Timer>, TimerError> {
            Ok(Vec::new())
        }
    }

    fn options() -> GiveawayOptions {
        GiveawayOptions {
            duration: std::time::Duration::from_secs(3_600),
            prize: "Nitro".into(),
            winners: 2,
            message: None,
            level: 0,
            roles: Vec::new(),
        }
    }

    fn service() -> (
        GiveawayService<MemoryGiveaways, MemoryTimers>,
        tokio::sync::mpsc::UnboundedReceiver<Timer>,
    ) {
        let (timers, rx) = TimerManager::new(MemoryTimers::default());
        (GiveawayService::new(MemoryGiveaways::default(), Arc::new(timers)), rx)
    }

    #[test]
    fn options_are_validated() {
        assert!(validate_options(&options()).is_ok());

        let cases: Vec<(GiveawayOptions, fn(&GiveawayError) -> bool)> = vec![
            (
                GiveawayOptions { duration: std::time::Duration::from_secs(2), ..options() },
                |e| matches!(e, GiveawayError::InvalidDuration),
            ),
            (
                GiveawayOptions { winners: 21, ..options() },
                |e| matches!(e, GiveawayError::InvalidWinners),
            ),
            (
                GiveawayOptions { level: 501, ..options() },
                |e| matches!(e, GiveawayError::InvalidLevel),
            ),
            (
                GiveawayOptions { prize: String::new(), ..options() },
                |e| matches!(e, GiveawayError::InvalidPrize),
            ),
            (
                GiveawayOptions { roles: (0..11).collect(), ..options() },
                |e| matches!(e, GiveawayError::TooManyRoles),
            ),
            (
                GiveawayOptions { message: Some("\n".repeat(11)), ..options() },
                |e| matches!(e, GiveawayError::TooManyNewlines),
            ),
        ];

        for (options, check) in cases {
            let error = validate_options(&options).unwrap_err();
            assert!(check(&error), "unexpected error: {error}");
        }
    }

    #[test]
    fn host_permission_checks() {
        assert!(check_host_permission(true, &[], None).is_ok());
        assert!(check_host_permission(false, &[5], Some(5)).is_ok());
        assert!(matches!(
            check_host_permission(false, &[], Some(5)),
            Err(GiveawayError::MissingPermissionOrRole(5))
        ));
        assert!(matches!(
            check_host_permission(false, &[], None),
            Err(GiveawayError::MissingPermission)
        ));
    }

    #[tokio::test]
    async fn entering_checks_requirements_and_is_idempotent() {
        let (service, _rx) = service();
        let options = GiveawayOptions { level: 5, roles: vec![77], ..options() };
        let ends = ends_at(Utc::now(), options.duration);
        let giveaway = service.create(1, 2, 3, &options, ends).await.unwrap();

        let low = service.enter(&giveaway, 10, 2, &[77]).await.unwrap_err();
        assert_eq!(
            low.to_string(),
            "You must be level **5** to enter this giveaway. (You are level 2)"
        );

        let no_role = service.enter(&giveaway, 10, 9, &[1]).await.unwrap_err();
        assert_eq!(
            no_role.to_string(),
            "You must have one of the following roles to enter this giveaway:\n- <@&77>"
        );

        assert_eq!(service.enter(&giveaway, 10, 9, &[77]).await.unwrap(), 1);
        assert_eq!(service.enter(&giveaway, 10, 9, &[77]).await.unwrap(), 1);
        assert_eq!(service.enter(&giveaway, 11, 9, &[77]).await.unwrap(), 2);
        assert!(service.leave(&giveaway, 11).await.unwrap());
    }

    #[tokio::test]
    async fn ending_early_draws_winners() {
        let (service, mut rx) = service();
        let giveaway = service
            .create(1, 2, 3, &options(), Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        for user in [10, 11, 12] {
            service.enter(&giveaway, user, 0, &[]).await.unwrap();
        }

        assert!(matches!(service.end_early(2, 999).await, Err(GiveawayError::NotFound)));
        service.end_early(2, 3).await.unwrap();

        let timer = rx.recv().await.unwrap();
        assert_eq!(timer.event, GIVEAWAY_END_EVENT);

        let result = service.finish(&timer).await.unwrap().unwrap();
        assert_eq!(result.entrant_count, 3);
        assert_eq!(result.winners.len(), 2);
        assert!(result.announcement().starts_with("### Winners of **Nitro**: *(out of 3 entrants)*\n- <@"));
        assert!(service.lookup(2, 3).is_none());
        assert!(service.finish(&timer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_giveaway_announcement() {
        let (service, _rx) = service();
        let giveaway = service
            .create(1, 2, 3, &options(), Utc::now() + Duration::seconds(30))
            .await
            .unwrap();
        assert!(giveaway.id() < 0);

        let timer = service.timers.get(giveaway.id()).await.unwrap().unwrap();
        let result = service.finish(&timer).await.unwrap().unwrap();
        assert_eq!(result.announcement(), "No one entered the giveaway.");
    }

    #[tokio::test]
    async fn load_skips_temporary_giveaways() {
        let (service, _rx) = service();
        let mut stale = Giveaway {
            guild_id: 1,
            channel_id: 2,
            message_id: 3,
            timer_id: -4,
            level_requirement: 0,
            roles_requirement: BTreeSet::new(),
            prize: "old".into(),
            winners: 1,
        };
        service.store.insert(&stale).await.unwrap();
        stale.timer_id = 9;
        stale.message_id = 4;
        service.store.insert(&stale).await.unwrap();

        let loaded = service.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(service.lookup(2, 4).map(|g| g.id()), Some(9));
    }
}
