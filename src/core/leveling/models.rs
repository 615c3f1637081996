// Domain models for the leveling system.
// No Discord types in here, only IDs and numbers.

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

pub const DEFAULT_BASE: u32 = 100;
pub const DEFAULT_FACTOR: f64 = 1.2;
pub const DEFAULT_MIN_GAIN: u32 = 8;
pub const DEFAULT_MAX_GAIN: u32 = 15;
pub const DEFAULT_COOLDOWN_RATE: u32 = 1;
pub const DEFAULT_COOLDOWN_PER: f64 = 40.0;
/// Levels stop carrying past this; XP above it stays on the last level.
pub const MAX_LEVEL: i64 = 100_000;
pub const DEFAULT_LEVEL_UP_MESSAGE: &str = "{user.mention} has leveled up to **Level {level}!**";

// ============================================================================
// SPEC
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GainRange {
    pub min: u32,
    pub max: u32,
}

/// How much XP a level costs and how much a message is worth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelingSpec {
    pub base: u32,
    pub factor: f64,
    pub gain: GainRange,
}

impl Default for LevelingSpec {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            factor: DEFAULT_FACTOR,
            gain: GainRange {
                min: DEFAULT_MIN_GAIN,
                max: DEFAULT_MAX_GAIN,
            },
        }
    }
}

impl LevelingSpec {
    /// XP needed to go from `level - 1` to `level`, rounded up to a multiple of 10.
    pub fn level_requirement_for(&self, level: i64) -> i64 {
        let raw = self.base as f64 * (level.max(0) as f64).powf(self.factor) / 10.0;
        (raw.ceil() as i64) * 10
    }

    /// A random gain scaled by `multiplier`.
    pub fn xp_gain(&self, multiplier: f64) -> i64 {
        let (low, high) = (self.gain.min.min(self.gain.max), self.gain.min.max(self.gain.max));
        let roll = rand::thread_rng().gen_range(low..=high);
        (roll as f64 * multiplier).round() as i64
    }

    /// Apply `delta` XP, carrying overflow into following levels and
    /// borrowing from previous levels when XP goes negative.
    pub fn apply_xp(&self, mut level: i64, mut xp: i64, delta: i64) -> (i64, i64) {
        xp = xp.saturating_add(delta);

        if delta > 0 {
            while level < MAX_LEVEL {
                let needed = self.level_requirement_for(level + 1);
                if needed <= 0 || xp <= needed {
                    break;
                }
                xp -= needed;
                level += 1;
            }
        } else if delta < 0 {
            while xp < 0 && level > 0 {
                level -= 1;
                xp = xp.saturating_add(self.level_requirement_for(level + 1));
            }
            xp = xp.max(0);
        }

        (level, xp)
    }
}

// ============================================================================
// COOLDOWN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CooldownSettings {
    /// Messages that may earn XP per window.
    pub rate: u32,
    /// Window length in seconds.
    pub per: f64,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            rate: DEFAULT_COOLDOWN_RATE,
            per: DEFAULT_COOLDOWN_PER,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: Instant,
    tokens: u32,
}

/// Fixed-window rate limit per (guild, user).
#[derive(Debug, Default)]
pub struct CooldownManager {
    buckets: DashMap<(u64, u64), Bucket>,
}

impl CooldownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a token. Returns the time left when the member is rate limited.
    pub fn update_rate_limit(
        &self,
        guild_id: u64,
        user_id: u64,
        settings: CooldownSettings,
        now: Instant,
    ) -> Option<Duration> {
        let window = Duration::from_secs_f64(settings.per.max(0.0));
        let mut bucket = self.buckets.entry((guild_id, user_id)).or_insert(Bucket {
            window_start: now,
            tokens: settings.rate,
        });

        if now.duration_since(bucket.window_start) >= window {
            bucket.window_start = now;
            bucket.tokens = settings.rate;
        }

        if bucket.tokens == 0 {
            let elapsed = now.duration_since(bucket.window_start);
            return Some(window.saturating_sub(elapsed));
        }

        bucket.tokens -= 1;
        None
    }

    pub fn can_gain(&self, guild_id: u64, user_id: u64, settings: CooldownSettings) -> bool {
        self.update_rate_limit(guild_id, user_id, settings, Instant::now())
            .is_none()
    }

    /// Drop every bucket for a guild, used after its cooldown settings change.
    pub fn reset_guild(&self, guild_id: u64) {
        self.buckets.retain(|(guild, _), _| *guild != guild_id);
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// Where level-up messages go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelUpChannel {
    Disabled,
    SameChannel,
    DirectMessage,
    Channel(u64),
}

impl LevelUpChannel {
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => Self::Disabled,
            1 => Self::SameChannel,
            2 => Self::DirectMessage,
            id => Self::Channel(id),
        }
    }

    pub fn to_raw(self) -> u64 {
        match self {
            Self::Disabled => 0,
            Self::SameChannel => 1,
            Self::DirectMessage => 2,
            Self::Channel(id) => id,
        }
    }
}

/// Roles to add and remove after a level change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleChanges {
    pub grant: Vec<u64>,
    pub revoke: Vec<u64>,
}

impl RoleChanges {
    pub fn is_empty(&self) -> bool {
        self.grant.is_empty() && self.revoke.is_empty()
    }
}

/// Per-guild leveling configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelingConfig {
    pub guild_id: u64,
    pub module_enabled: bool,
    /// Keep every earned level role instead of only the highest.
    pub role_stack: bool,
    pub spec: LevelingSpec,
    pub cooldown: CooldownSettings,
    pub level_up_message: Option<String>,
    pub special_level_up_messages: BTreeMap<i64, String>,
    pub level_up_channel: LevelUpChannel,
    pub blacklisted_roles: BTreeSet<u64>,
    pub blacklisted_channels: BTreeSet<u64>,
    pub blacklisted_users: BTreeSet<u64>,
    /// role ID -> level needed
    pub level_roles: BTreeMap<u64, i64>,
    /// role ID -> bonus added to the multiplier
    pub multiplier_roles: BTreeMap<u64, f64>,
    /// channel ID -> bonus added to the multiplier
    pub multiplier_channels: BTreeMap<u64, f64>,
    pub reset_on_leave: bool,
}

impl LevelingConfig {
    pub fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            module_enabled: false,
            role_stack: true,
            spec: LevelingSpec::default(),
            cooldown: CooldownSettings::default(),
            level_up_message: Some(DEFAULT_LEVEL_UP_MESSAGE.to_string()),
            special_level_up_messages: BTreeMap::new(),
            level_up_channel: LevelUpChannel::SameChannel,
            blacklisted_roles: BTreeSet::new(),
            blacklisted_channels: BTreeSet::new(),
            blacklisted_users: BTreeSet::new(),
            level_roles: BTreeMap::new(),
            multiplier_roles: BTreeMap::new(),
            multiplier_channels: BTreeMap::new(),
            reset_on_leave: false,
        }
    }

    pub fn is_blacklisted(&self, user_id: u64, channel_id: u64, role_ids: &[u64]) -> bool {
        self.blacklisted_users.contains(&user_id)
            || self.blacklisted_channels.contains(&channel_id)
            || role_ids.iter().any(|r| self.blacklisted_roles.contains(r))
    }

    pub fn multiplier(&self, channel_id: u64, role_ids: &[u64]) -> f64 {
        let roles: f64 = role_ids
            .iter()
            .filter_map(|r| self.multiplier_roles.get(r))
            .sum();
        let channel = self
            .multiplier_channels
            .get(&channel_id)
            .copied()
            .unwrap_or(0.0);
        1.0 + roles + channel
    }

    /// The template to announce reaching `level`, if announcements are on.
    pub fn level_up_template(&self, level: i64) -> Option<&str> {
        if self.level_up_channel == LevelUpChannel::Disabled {
            return None;
        }
        let message = self
            .special_level_up_messages
            .get(&level)
            .or(self.level_up_message.as_ref())?;
        (!message.is_empty()).then_some(message.as_str())
    }

    /// Level roles the member should gain or lose at `level`.
    pub fn role_changes(&self, level: i64, member_roles: &[u64]) -> RoleChanges {
        if self.level_roles.is_empty() {
            return RoleChanges::default();
        }

        let earned: Vec<(u64, i64)> = self
            .level_roles
            .iter()
            .filter(|(_, needed)| level >= **needed)
            .map(|(role, needed)| (*role, *needed))
            .collect();

        let keep: BTreeSet<u64> = if self.role_stack {
            earned.iter().map(|(role, _)| *role).collect()
        } else {
            earned
                .iter()
                .max_by_key(|(_, needed)| *needed)
                .map(|(role, _)| *role)
                .into_iter()
                .collect()
        };

        let has = |role: &u64| member_roles.contains(role);
        RoleChanges {
            grant: keep.iter().copied().filter(|r| !has(r)).collect(),
            revoke: self
                .level_roles
                .keys()
                .copied()
                .filter(|r| !keep.contains(r) && has(r))
                .collect(),
        }
    }
}

// ============================================================================
// RECORDS AND EVENTS
// ============================================================================

/// A member's progress in one guild. `xp` is progress into the current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelingRecord {
    pub guild_id: u64,
    pub user_id: u64,
    pub level: i64,
    pub xp: i64,
}

impl LevelingRecord {
    pub fn new(guild_id: u64, user_id: u64) -> Self {
        Self {
            guild_id,
            user_id,
            level: 0,
            xp: 0,
        }
    }
}

/// A record together with its place on the leaderboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankInfo {
    pub record: LevelingRecord,
    /// 1-based.
    pub rank: u64,
    /// XP needed to finish the current level.
    pub max_xp: i64,
}

impl RankInfo {
    pub fn ratio(&self) -> f64 {
        if self.max_xp <= 0 {
            return 0.0;
        }
        self.record.xp as f64 / self.max_xp as f64
    }
}

/// The facts about a message the leveling system needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageActivity {
    pub guild_id: u64,
    pub channel_id: u64,
    pub user_id: u64,
    pub role_ids: Vec<u64>,
}

/// Returned when a member reaches a new level. The Discord layer announces it
/// and applies the role changes.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelUpEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub old_level: i64,
    pub new_level: i64,
    pub xp: i64,
    pub template: Option<String>,
    pub channel: LevelUpChannel,
    pub roles: RoleChanges,
}
