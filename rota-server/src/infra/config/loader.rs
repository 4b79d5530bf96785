use once_cell::sync::Lazy;
use std::{fs, path::PathBuf, time::Duration};
use thiserror::Error;

use chrono::NaiveTime;
use rota_core::config::hhmm;
use rota_model::RequesterId;

use super::{
    models::{
        AuthConfig, CommandsConfig, Config, ConfigMetadata, DatabaseConfig,
        DirectoryFeedConfig, DirectoryFeedMode, JobsConfig, ServerConfig,
        TransportConfig, default_daily_reset_at,
    },
    sources::{EnvConfig, FileConfig},
    validation::{self, ConfigWarnings},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![PathBuf::from("rota.toml"), PathBuf::from("config/rota.toml")]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Load `.env`, then compose the file configuration with the process
    /// environment on top.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        self.load_with_env(EnvConfig::gather(), env_file_loaded)
    }

    /// Compose against an already gathered environment.
    pub fn load_with_env(
        &self,
        env_config: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env_config)?;
        let (config, warnings) = self.compose_config(
            file_config,
            env_config,
            config_path,
            env_file_loaded,
        )?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env_config.config_path {
            source.env = Some(from_env.clone());
        }

        if source.is_empty() {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned();
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents =
            fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
                path: path.clone(),
                source: err,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
        env_file_loaded: bool,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if file_config.is_none() {
            warnings.push_with_hint(
                "No rota.toml detected; falling back to environment variables",
                "Create rota.toml or pass --config",
            );
        }
        for name in &env.rejected {
            warnings.push(format!("Ignoring {name}: value could not be parsed"));
        }

        let FileConfig {
            server: file_server,
            database: file_database,
            transport: file_transport,
            jobs: file_jobs,
            directory_feed: file_feed,
            commands: file_commands,
            auth: file_auth,
            engine: file_engine,
        } = file_config.unwrap_or_default();

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: env
                .server_host
                .clone()
                .or(file_server.host)
                .unwrap_or(server_defaults.host),
            port: env
                .server_port
                .or(file_server.port)
                .unwrap_or(server_defaults.port),
        };

        let database = DatabaseConfig {
            url: env.database_url.clone().or(file_database.url),
        };

        let transport = TransportConfig {
            webhook_url: env.webhook_url.clone().or(file_transport.webhook_url),
            timeout: file_transport
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(TransportConfig::default().timeout),
        };

        let jobs_defaults = JobsConfig::default();
        let daily_reset_at = match env
            .daily_reset_at
            .as_deref()
            .map(|raw| ("ROTA_DAILY_RESET_AT", raw))
            .or(file_jobs
                .daily_reset_at
                .as_deref()
                .map(|raw| ("jobs.daily_reset_at", raw)))
        {
            Some((field, raw)) => parse_time(field, raw)?,
            None => default_daily_reset_at(),
        };
        let jobs = JobsConfig {
            sweep_interval: env
                .sweep_interval_secs
                .or(file_jobs.sweep_interval_secs)
                .map(Duration::from_secs)
                .unwrap_or(jobs_defaults.sweep_interval),
            purge_interval: env
                .purge_interval_secs
                .or(file_jobs.purge_interval_secs)
                .map(Duration::from_secs)
                .unwrap_or(jobs_defaults.purge_interval),
            daily_reset_at,
        };

        let feed_mode = match env.directory_feed.as_deref() {
            Some(raw) => parse_feed_mode(raw)?,
            None => file_feed.mode.unwrap_or_default(),
        };
        let directory_feed = DirectoryFeedConfig {
            mode: feed_mode,
            poll_interval: env
                .poll_interval_secs
                .or(file_feed.poll_interval_secs)
                .map(Duration::from_secs)
                .unwrap_or(DirectoryFeedConfig::default().poll_interval),
        };

        let admins = match &env.admins {
            Some(raw) => parse_requesters("ROTA_ADMINS", raw)?,
            None => file_commands.admins.into_iter().map(RequesterId).collect(),
        };
        let commands = CommandsConfig { admins };

        let auth = AuthConfig {
            api_token: env
                .api_token
                .clone()
                .or(file_auth.api_token)
                .filter(|token| !token.trim().is_empty()),
        };

        let mut engine = file_engine.unwrap_or_default();
        if let Some(raw) = env.day_starts_at.as_deref() {
            engine.logical_day.day_starts_at =
                parse_time("ROTA_DAY_STARTS_AT", raw)?;
        }
        if let Some(offset) = env.utc_offset_minutes {
            engine.logical_day.utc_offset_minutes = offset;
        }
        if let Some(raw) = &env.whitelist {
            engine.quota.whitelist =
                parse_requesters("ROTA_WHITELIST", raw)?.into_iter().collect();
        }

        let mut config = Config {
            server,
            database,
            transport,
            jobs,
            directory_feed,
            commands,
            auth,
            engine,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        };

        warnings.extend(validation::review(&mut config));
        Ok((config, warnings))
    }
}

fn parse_time(field: &'static str, raw: &str) -> Result<NaiveTime, ConfigLoadError> {
    hhmm::parse(raw).ok_or_else(|| ConfigLoadError::InvalidTime {
        field,
        value: raw.to_string(),
    })
}

fn parse_feed_mode(raw: &str) -> Result<DirectoryFeedMode, ConfigLoadError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "listen" => Ok(DirectoryFeedMode::Listen),
        "poll" => Ok(DirectoryFeedMode::Poll),
        "off" | "none" | "disabled" => Ok(DirectoryFeedMode::Off),
        _ => Err(ConfigLoadError::InvalidFeedMode {
            value: raw.to_string(),
        }),
    }
}

fn parse_requesters(
    field: &'static str,
    raw: &[String],
) -> Result<Vec<RequesterId>, ConfigLoadError> {
    raw.iter()
        .map(|value| {
            value.parse::<RequesterId>().map_err(|_| {
                ConfigLoadError::InvalidRequesterId {
                    field,
                    value: value.clone(),
                }
            })
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{field}: expected HH:MM time, got {value:?}")]
    InvalidTime { field: &'static str, value: String },
    #[error("unknown directory feed mode {value:?} (expected listen, poll or off)")]
    InvalidFeedMode { value: String },
    #[error("{field}: invalid requester id {value:?}")]
    InvalidRequesterId { field: &'static str, value: String },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn is_empty(&self) -> bool {
        self.explicit.is_none() && self.env.is_none() && self.default.is_none()
    }

    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(
            self,
            ConfigPathProvenance::Explicit | ConfigPathProvenance::Env
        )
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}
