pub mod leveling_service;
pub mod models;

pub use leveling_service::{LevelingError, LevelingService, LevelingStore};
pub use models::{
    CooldownSettings, GainRange, LevelUpChannel, LevelUpEvent, LevelingConfig, LevelingRecord,
    LevelingSpec, MessageActivity, RankInfo,
};
