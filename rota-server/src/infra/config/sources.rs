use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use rota_core::EngineConfig;

use super::models::DirectoryFeedMode;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub transport: FileTransportConfig,
    #[serde(default)]
    pub jobs: FileJobsConfig,
    #[serde(default)]
    pub directory_feed: FileDirectoryFeedConfig,
    #[serde(default)]
    pub commands: FileCommandsConfig,
    #[serde(default)]
    pub auth: FileAuthConfig,
    pub engine: Option<EngineConfig>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileTransportConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileJobsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purge_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_reset_at: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDirectoryFeedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<DirectoryFeedMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCommandsConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admins: Vec<i64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub database_url: Option<String>,
    pub webhook_url: Option<String>,
    pub sweep_interval_secs: Option<u64>,
    pub purge_interval_secs: Option<u64>,
    pub daily_reset_at: Option<String>,
    pub directory_feed: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub admins: Option<Vec<String>>,
    pub api_token: Option<String>,
    pub day_starts_at: Option<String>,
    pub utc_offset_minutes: Option<i32>,
    pub whitelist: Option<Vec<String>>,
    /// Variables that were set but could not be parsed.
    pub rejected: Vec<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup; `gather` reads the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env_config = Self::default();
        let mut rejected = Vec::new();

        env_config.config_path = lookup("ROTA_CONFIG").map(PathBuf::from);
        env_config.server_host = lookup("ROTA_HOST");
        env_config.server_port = parse_var(&lookup, "ROTA_PORT", &mut rejected);
        env_config.database_url = lookup("ROTA_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .filter(|value| !value.trim().is_empty());
        env_config.webhook_url = lookup("ROTA_WEBHOOK_URL")
            .filter(|value| !value.trim().is_empty());
        env_config.sweep_interval_secs =
            parse_var(&lookup, "ROTA_SWEEP_INTERVAL_SECS", &mut rejected);
        env_config.purge_interval_secs =
            parse_var(&lookup, "ROTA_PURGE_INTERVAL_SECS", &mut rejected);
        env_config.daily_reset_at = lookup("ROTA_DAILY_RESET_AT");
        env_config.directory_feed = lookup("ROTA_DIRECTORY_FEED");
        env_config.poll_interval_secs =
            parse_var(&lookup, "ROTA_POLL_INTERVAL_SECS", &mut rejected);
        env_config.admins = parse_csv_var(&lookup, "ROTA_ADMINS");
        env_config.api_token = lookup("ROTA_API_TOKEN")
            .filter(|value| !value.trim().is_empty());
        env_config.day_starts_at = lookup("ROTA_DAY_STARTS_AT");
        env_config.utc_offset_minutes =
            parse_var(&lookup, "ROTA_UTC_OFFSET_MINUTES", &mut rejected);
        env_config.whitelist = parse_csv_var(&lookup, "ROTA_WHITELIST");

        env_config.rejected = rejected;
        env_config
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, rejected: &mut Vec<String>) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            rejected.push(name.to_string());
            None
        }
    }
}

fn parse_csv_var<F>(lookup: &F, name: &str) -> Option<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).map(|raw| {
        raw.split(',')
            .filter_map(|part| {
                let trimmed = part.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect()
    })
}
