// Runtime configuration read from the environment (and `.env`, if present).

use anyhow::{Context as _, Result};
use std::path::PathBuf;

pub const DEFAULT_PREFIX: &str = ">";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_EVAL_ENDPOINT: &str = "http://127.0.0.1:8060/eval";

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub default_prefix: String,
    pub data_dir: PathBuf,
    pub database_url: String,
    pub eval_endpoint: String,
    pub owner_id: Option<u64>,
    /// Register slash commands in this guild only, so edits show up instantly.
    pub test_guild: Option<u64>,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let token = get("DISCORD_TOKEN").context(
            "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
        )?;

        let data_dir = PathBuf::from(get("LAMBDA_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));
        let database_url = get("LAMBDA_DATABASE_URL")
            .unwrap_or_else(|| format!("sqlite://{}/lambda.db", data_dir.display()));

        let owner_id = get("LAMBDA_OWNER_ID")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("LAMBDA_OWNER_ID must be a user ID")?;
        let test_guild = get("LAMBDA_TEST_GUILD")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("LAMBDA_TEST_GUILD must be a guild ID")?;

        Ok(Self {
            token,
            default_prefix: get("LAMBDA_DEFAULT_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            data_dir,
            database_url,
            eval_endpoint: get("LAMBDA_EVAL_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_EVAL_ENDPOINT.to_string()),
            owner_id,
            test_guild,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<BotConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn token_is_required() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn defaults_fill_in_the_rest() {
        let config = config_from(&[("DISCORD_TOKEN", "abc")]).unwrap();
        assert_eq!(config.default_prefix, ">");
        assert_eq!(config.database_url, "sqlite://data/lambda.db");
        assert_eq!(config.eval_endpoint, DEFAULT_EVAL_ENDPOINT);
        assert_eq!(config.owner_id, None);
        assert_eq!(config.test_guild, None);
    }

    #[test]
    fn database_follows_the_data_dir() {
        let config = config_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("LAMBDA_DATA_DIR", "/var/lib/lambda"),
            ("LAMBDA_TEST_GUILD", "1234"),
        ])
        .unwrap();
        assert_eq!(config.database_url, "sqlite:///var/lib/lambda/lambda.db");
        assert_eq!(config.test_guild, Some(1234));
    }

    #[test]
    fn bad_ids_are_rejected() {
        assert!(config_from(&[("DISCORD_TOKEN", "abc"), ("LAMBDA_OWNER_ID", "me")]).is_err());
    }
}
