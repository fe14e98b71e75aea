//! Configuration module for vista.
//!
//! Handles the TOML settings file, environment variable expansion and
//! duration parsing.

mod settings;

pub use settings::{
    expand_env_vars, parse_duration, LoggingSettings, PoolSettings, QuerySettings, Settings,
    SettingsError,
};
