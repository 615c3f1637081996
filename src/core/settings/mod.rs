pub mod settings_service;

pub use settings_service::{
    strip_prefix, GuildSettings, SettingsError, SettingsService, SettingsStore,
};
