//! Application configuration management.
//!
//! Handles loading, saving, and validating botmeta configuration including:
//! - Cache TTL and sweep period
//! - Default scan budget and model filter
//! - Query fallbacks
//! - HTTP bind address for the host server
//!
//! Configuration is layered with the `config` crate: an optional TOML file,
//! then `BOTMETA_*` environment variables (`BOTMETA_CACHE__TTL_SECS=30`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{DEFAULT_CACHE_TTL, DEFAULT_CHECK_PERIOD};
use crate::service::DEFAULT_BATTERY_LEVEL;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "BOTMETA";

static MAC_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("valid MAC address pattern")
});

/// Whether `address` is a colon-separated 48-bit MAC address.
#[must_use]
pub fn is_valid_mac_address(address: &str) -> bool {
    MAC_ADDRESS_RE.is_match(address)
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    NotFound(String),

    /// The configuration file could not be written.
    #[error("failed to write {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration sources could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("invalid `{field}`: {message}")]
    ValidationError {
        /// Dotted field path.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotmetaConfig {
    /// Metadata cache settings.
    pub cache: CacheConfig,
    /// Scan settings.
    pub scan: ScanConfig,
    /// Query facade settings.
    pub service: ServiceConfig,
    /// HTTP host settings.
    pub server: ServerConfig,
}

/// Metadata cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached record in seconds.
    pub ttl_secs: u64,
    /// Seconds between expiry sweeps.
    pub check_period_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            check_period_secs: DEFAULT_CHECK_PERIOD.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep period.
    #[must_use]
    pub const fn check_period(&self) -> Duration {
        Duration::from_secs(self.check_period_secs)
    }
}

/// Scan settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Scan budget used when a caller does not supply one, in milliseconds.
    pub default_budget_ms: u64,
    /// Single-character model to scan for; empty scans every model.
    pub model_filter: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            default_budget_ms: 5000,
            model_filter: "H".to_string(),
        }
    }
}

impl ScanConfig {
    /// Default scan budget.
    #[must_use]
    pub const fn default_budget(&self) -> Duration {
        Duration::from_millis(self.default_budget_ms)
    }

    /// Model filter as a character, `None` when scanning every model.
    #[must_use]
    pub fn model(&self) -> Option<char> {
        self.model_filter.trim().chars().next()
    }
}

/// Query facade settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Battery level returned for unknown devices.
    pub default_battery_level: u8,
    /// Capacity of the advertisement channel.
    pub channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_battery_level: DEFAULT_BATTERY_LEVEL,
            channel_capacity: crate::bluetooth::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// HTTP host settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

impl BotmetaConfig {
    /// Load configuration from the default path plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load() -> ConfigResult<Self> {
        Self::load_or_default(default_config_path())
    }

    /// Load configuration from `path` if it exists, plus environment overrides.
    ///
    /// A missing file is not an error; defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let config: Self = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, which must exist. No environment
    /// overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unparsable or invalid.
    pub fn load_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config: Self = ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let write_error = |source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)
    }

    /// Check every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns the single error, or `MultipleValidationErrors` when several
    /// fields are invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &'static str, message: &str| {
            if !ok {
                errors.push(ConfigError::ValidationError {
                    field,
                    message: message.to_string(),
                });
            }
        };

        check(self.cache.ttl_secs > 0, "cache.ttl_secs", "must be positive");
        check(
            self.cache.check_period_secs > 0,
            "cache.check_period_secs",
            "must be positive",
        );
        check(
            self.scan.default_budget_ms > 0,
            "scan.default_budget_ms",
            "must be positive",
        );
        check(
            self.scan.model_filter.trim().chars().count() <= 1,
            "scan.model_filter",
            "must be a single model character or empty",
        );
        check(
            (1..=100).contains(&self.service.default_battery_level),
            "service.default_battery_level",
            "must be between 1 and 100",
        );
        check(
            self.service.channel_capacity > 0,
            "service.channel_capacity",
            "must be positive",
        );
        check(
            self.server.bind_address.parse::<SocketAddr>().is_ok(),
            "server.bind_address",
            "must be a socket address like 0.0.0.0:3000",
        );

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Default configuration file path.
///
/// On Linux: `/etc/botmeta/config.toml`
/// Elsewhere: the platform config directory, e.g. `~/.config/botmeta/config.toml`
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/botmeta/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "botmeta").map_or_else(
            || PathBuf::from("config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}
