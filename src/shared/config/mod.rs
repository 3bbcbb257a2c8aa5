//! Application configuration module
//!
//! `AppConfig` carries every setting the chat cache and the backup engine
//! need. Values are layered: built-in defaults, then an optional TOML file
//! named by `STUDYSYNC_CONFIG`, then environment variables. An absent or empty
//! connection string means "not configured" and selects the degraded mode for
//! that store rather than an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "STUDYSYNC_CONFIG";

/// Longest accepted backup interval (one year)
pub const MAX_BACKUP_INTERVAL_HOURS: u64 = 24 * 365;

/// Primary-store collections mirrored by a full backup, in backup order.
pub const DEFAULT_COLLECTIONS: &[&str] = &[
    "users",
    "tasks",
    "task_comments",
    "study_sessions",
    "reports",
    "report_entries",
    "chat_rooms",
    "room_members",
    "chat_messages",
    "direct_messages",
    "forms",
    "form_fields",
    "form_responses",
    "form_answers",
    "notifications",
];

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Fast-path store connection string (`REDIS_URL`)
    pub redis_url: Option<String>,
    /// Backup mirror connection string (`MONGODB_URI`)
    pub mongo_url: Option<String>,
    /// Primary relational store connection string (`DATABASE_URL`)
    pub database_url: Option<String>,
    /// TTL of a room's message list on the fast path, reset on every new message
    pub message_ttl_secs: u64,
    /// TTL of the presence hash on the fast path
    pub presence_ttl_secs: u64,
    /// How long a typing marker lives without renewal
    pub typing_ttl_secs: u64,
    /// Maximum number of messages retained per room
    pub room_message_limit: usize,
    /// Hours between scheduled full backups (`BACKUP_INTERVAL_HOURS`)
    pub backup_interval_hours: u64,
    /// Delay before the first backup after startup
    pub backup_startup_delay_secs: u64,
    /// Seconds between write-behind queue drains
    pub drain_interval_secs: u64,
    /// Seconds between fast-path reachability probes while on the fallback
    pub probe_interval_secs: u64,
    /// Primary collections included in a full backup
    pub collections: Vec<String>,
    /// HTTP port for the operational routes (`SERVER_PORT`)
    pub server_port: u16,
    /// Directory JSON exports requested over HTTP are written into (`BACKUP_EXPORT_DIR`)
    pub export_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            mongo_url: None,
            database_url: None,
            message_ttl_secs: 24 * 60 * 60,
            presence_ttl_secs: 60 * 60,
            typing_ttl_secs: 10,
            room_message_limit: 100,
            backup_interval_hours: 24,
            backup_startup_delay_secs: 30,
            drain_interval_secs: 5,
            probe_interval_secs: 15,
            collections: DEFAULT_COLLECTIONS.iter().map(|c| c.to_string()).collect(),
            server_port: 3000,
            export_dir: PathBuf::from("backups"),
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Load configuration from defaults, the optional TOML file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match non_empty_env(CONFIG_PATH_ENV) {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        let config = base.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Overlay environment variables on top of this configuration.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(url) = non_empty_env("REDIS_URL") {
            self.redis_url = Some(url);
        }
        if let Some(url) = non_empty_env("MONGODB_URI") {
            self.mongo_url = Some(url);
        }
        if let Some(url) = non_empty_env("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(hours) = non_empty_env("BACKUP_INTERVAL_HOURS") {
            self.backup_interval_hours = hours.parse().map_err(|_| {
                ConfigError::invalid("BACKUP_INTERVAL_HOURS", format!("not a number: {}", hours))
            })?;
        }
        if let Some(dir) = non_empty_env("BACKUP_EXPORT_DIR") {
            self.export_dir = PathBuf::from(dir);
        }
        if let Some(port) = non_empty_env("SERVER_PORT") {
            self.server_port = port.parse().map_err(|_| {
                ConfigError::invalid("SERVER_PORT", format!("not a port: {}", port))
            })?;
        }
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_scheme(&self.redis_url, &["redis://", "rediss://"])?;
        check_scheme(&self.mongo_url, &["mongodb://", "mongodb+srv://"])?;
        check_scheme(&self.database_url, &["postgres://", "postgresql://"])?;

        if self.room_message_limit == 0 {
            return Err(ConfigError::invalid("room_message_limit", "must be greater than 0"));
        }
        if self.typing_ttl_secs == 0 {
            return Err(ConfigError::invalid("typing_ttl_secs", "must be greater than 0"));
        }
        if self.backup_interval_hours == 0 {
            return Err(ConfigError::invalid("backup_interval_hours", "must be greater than 0"));
        }
        if self.backup_interval_hours > MAX_BACKUP_INTERVAL_HOURS {
            return Err(ConfigError::invalid(
                "backup_interval_hours",
                format!("must be at most {}", MAX_BACKUP_INTERVAL_HOURS),
            ));
        }
        if self.export_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("export_dir", "cannot be empty"));
        }
        if self.drain_interval_secs == 0 {
            return Err(ConfigError::invalid("drain_interval_secs", "must be greater than 0"));
        }
        if self.probe_interval_secs == 0 {
            return Err(ConfigError::invalid("probe_interval_secs", "must be greater than 0"));
        }
        for name in &self.collections {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid("collections", "collection names cannot be empty"));
            }
            if name.starts_with('_') {
                return Err(ConfigError::invalid(
                    "collections",
                    format!("'{}' uses the reserved '_' prefix", name),
                ));
            }
        }
        Ok(())
    }

    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_secs)
    }

    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_secs)
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_secs(self.typing_ttl_secs)
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_hours.saturating_mul(60 * 60))
    }

    pub fn backup_startup_delay(&self) -> Duration {
        Duration::from_secs(self.backup_startup_delay_secs)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    /// Set the fast-path store URL
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.config.redis_url = Some(url.into());
        self
    }

    /// Set the backup mirror URL
    pub fn mongo_url(mut self, url: impl Into<String>) -> Self {
        self.config.mongo_url = Some(url.into());
        self
    }

    /// Set the primary store URL
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    pub fn room_message_limit(mut self, limit: usize) -> Self {
        self.config.room_message_limit = limit;
        self
    }

    pub fn typing_ttl_secs(mut self, secs: u64) -> Self {
        self.config.typing_ttl_secs = secs;
        self
    }

    pub fn backup_interval_hours(mut self, hours: u64) -> Self {
        self.config.backup_interval_hours = hours;
        self
    }

    pub fn backup_startup_delay_secs(mut self, secs: u64) -> Self {
        self.config.backup_startup_delay_secs = secs;
        self
    }

    pub fn export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.export_dir = dir.into();
        self
    }

    /// Replace the list of collections a full backup walks
    pub fn collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.collections = collections.into_iter().map(Into::into).collect();
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn check_scheme(url: &Option<String>, schemes: &[&str]) -> Result<(), ConfigError> {
    match url {
        Some(url) if !schemes.iter().any(|scheme| url.starts_with(scheme)) => {
            Err(ConfigError::InvalidUrl(url.clone()))
        }
        _ => Ok(()),
    }
}
