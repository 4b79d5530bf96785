use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use rota_core::EngineConfig;
use rota_model::RequesterId;

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub transport: TransportConfig,
    pub jobs: JobsConfig,
    pub directory_feed: DirectoryFeedConfig,
    pub commands: CommandsConfig,
    pub auth: AuthConfig,
    pub engine: EngineConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Absent means the process runs on in-memory stores.
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Absent means notifications are only logged.
    pub webhook_url: Option<String>,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Cadences of the periodic engine triggers.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub sweep_interval: Duration,
    pub purge_interval: Duration,
    /// Local wall-clock time of the daily reset.
    pub daily_reset_at: NaiveTime,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            purge_interval: Duration::from_secs(3600),
            daily_reset_at: default_daily_reset_at(),
        }
    }
}

pub(crate) fn default_daily_reset_at() -> NaiveTime {
    NaiveTime::from_hms_opt(5, 31, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryFeedMode {
    /// `LISTEN` on the directory channel; needs a database.
    #[default]
    Listen,
    /// Re-read the stored directory on a fixed interval.
    Poll,
    Off,
}

#[derive(Debug, Clone)]
pub struct DirectoryFeedConfig {
    pub mode: DirectoryFeedMode,
    pub poll_interval: Duration,
}

impl Default for DirectoryFeedConfig {
    fn default() -> Self {
        Self {
            mode: DirectoryFeedMode::default(),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Who may run admin commands through the text grammar.
#[derive(Debug, Clone, Default)]
pub struct CommandsConfig {
    pub admins: Vec<RequesterId>,
}

impl CommandsConfig {
    pub fn is_admin(&self, requester: RequesterId) -> bool {
        self.admins.contains(&requester)
    }
}

/// Shared secret front ends present as `Authorization: Bearer <token>`.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Absent means admin routes and `/command` are refused.
    pub api_token: Option<String>,
}

impl AuthConfig {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            api_token: Some(token.into()),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
