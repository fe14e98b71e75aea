//! TOML-based configuration for vista.
//!
//! Supports a config file (vista.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [pool]
//! size = 16
//!
//! [query]
//! default_limit = 10
//! search_after_limit = 10000
//! max_scope_nodes = 20
//! max_sub_conditions = 10
//! default_pit_keep_alive = "1m"
//! sql_timeout = "${VISTA_SQL_TIMEOUT}"
//!
//! [logging]
//! filter = "vista=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Row normalization pool.
    pub pool: PoolSettings,

    /// Query compilation limits and defaults.
    pub query: QuerySettings,

    /// Log filter used by the binary.
    pub logging: LoggingSettings,
}

/// Row normalization pool settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Number of worker threads. Zero means one per available core.
    pub size: usize,
}

impl PoolSettings {
    /// Resolved thread count.
    pub fn threads(&self) -> usize {
        if self.size > 0 {
            return self.size;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

/// Query compilation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Page size used when a request does not set one.
    pub default_limit: usize,

    /// Page size used for cursor pagination when the request leaves it at zero.
    pub search_after_limit: usize,

    /// Maximum number of nodes in a data scope.
    pub max_scope_nodes: usize,

    /// Maximum number of children of an `and`/`or` filter.
    pub max_sub_conditions: usize,

    /// Keep-alive used when a point-in-time is opened without one (e.g., "1m").
    pub default_pit_keep_alive: String,

    /// Timeout handed to the SQL gateway (e.g., "30s").
    pub sql_timeout: String,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_limit: 10,
            search_after_limit: 10_000,
            max_scope_nodes: 20,
            max_sub_conditions: 10,
            default_pit_keep_alive: "1m".to_string(),
            sql_timeout: "60s".to_string(),
        }
    }
}

impl QuerySettings {
    pub fn sql_timeout(&self) -> Result<Duration, SettingsError> {
        parse_duration(&self.sql_timeout)
    }

    /// Check that limits and durations are usable.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_scope_nodes == 0 {
            return Err(SettingsError::InvalidConfig(
                "query.max_scope_nodes must be positive".to_string(),
            ));
        }
        if self.search_after_limit == 0 {
            return Err(SettingsError::InvalidConfig(
                "query.search_after_limit must be positive".to_string(),
            ));
        }
        parse_duration(&self.default_pit_keep_alive)?;
        parse_duration(&self.sql_timeout)?;
        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing-subscriber` env-filter directive; `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text, expanding environment variables first.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let expanded = expand_env_vars(content)?;
        let settings: Settings = toml::from_str(&expanded)?;
        settings.query.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `VISTA_CONFIG`
    /// 2. `./vista.toml`
    /// 3. `~/.config/vista/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("VISTA_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("vista.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("vista").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}

/// Parse a short duration such as `500ms`, `30s`, `5m`, `1h` or `2d`.
pub fn parse_duration(s: &str) -> Result<Duration, SettingsError> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| SettingsError::InvalidDuration(s.to_string()))?;
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| SettingsError::InvalidDuration(s.to_string()))?;

    let secs = match unit {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => return Err(SettingsError::InvalidDuration(s.to_string())),
    };
    Ok(Duration::from_secs(secs))
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
