//! Configuration for the TaskMaster CLI host.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TASKMASTER_VAULT_DIR` | No | current directory | Root that document paths are relative to |
//! | `TASKMASTER_SETTINGS_PATH` | No | `<vault>/.obsidian/plugins/taskmaster/data.json` | Persisted settings document |
//! | `TASKMASTER_SYNC_ATTEMPTS` | No | 3 | Compare-and-swap attempts per write-back (1-10) |
//! | `TASKMASTER_STRICT_STATES` | No | false | Render tokens with unknown states as literal text |
//!
//! # Example
//!
//! ```no_run
//! use taskmaster_engine::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Vault: {}", config.vault_dir.display());
//! ```

use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::sync::DEFAULT_SYNC_ATTEMPTS;

/// Settings file location relative to the vault.
const DEFAULT_SETTINGS_FILE: &str = ".obsidian/plugins/taskmaster/data.json";

/// Minimum allowed sync attempts.
const MIN_SYNC_ATTEMPTS: u8 = 1;

/// Maximum allowed sync attempts.
const MAX_SYNC_ATTEMPTS: u8 = 10;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine the current directory.
    #[error("failed to determine current directory")]
    NoWorkingDirectory,
}

/// Configuration for the TaskMaster CLI host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root directory documents are resolved against.
    pub vault_dir: PathBuf,

    /// Path of the JSON settings document.
    pub settings_path: PathBuf,

    /// Compare-and-swap attempts per write-back. Between 1 and 10.
    pub sync_attempts: u8,

    /// Render tokens whose state is unknown as literal text instead of
    /// falling back to the group's first state.
    pub strict_states: bool,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `TASKMASTER_VAULT_DIR` is unset and the current directory cannot be determined
    /// - `TASKMASTER_SYNC_ATTEMPTS` is not an integer between 1 and 10
    /// - `TASKMASTER_STRICT_STATES` is not a boolean
    pub fn from_env() -> Result<Self, ConfigError> {
        // Optional: TASKMASTER_VAULT_DIR (default: current directory)
        let vault_dir = match env::var("TASKMASTER_VAULT_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => env::current_dir().map_err(|_| ConfigError::NoWorkingDirectory)?,
        };

        // Optional: TASKMASTER_SETTINGS_PATH (default: inside the vault)
        let settings_path = env::var("TASKMASTER_SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| vault_dir.join(DEFAULT_SETTINGS_FILE));

        // Optional: TASKMASTER_SYNC_ATTEMPTS (default: 3, must be 1-10)
        let sync_attempts = match env::var("TASKMASTER_SYNC_ATTEMPTS") {
            Ok(val) => {
                let attempts = val.trim().parse::<u8>().map_err(|_| ConfigError::InvalidValue {
                    key: "TASKMASTER_SYNC_ATTEMPTS".to_string(),
                    message: format!("expected integer 1-10, got '{val}'"),
                })?;
                if !(MIN_SYNC_ATTEMPTS..=MAX_SYNC_ATTEMPTS).contains(&attempts) {
                    return Err(ConfigError::InvalidValue {
                        key: "TASKMASTER_SYNC_ATTEMPTS".to_string(),
                        message: format!(
                            "sync attempts must be between {MIN_SYNC_ATTEMPTS} and {MAX_SYNC_ATTEMPTS}, got {attempts}"
                        ),
                    });
                }
                attempts
            }
            Err(_) => DEFAULT_SYNC_ATTEMPTS,
        };

        // Optional: TASKMASTER_STRICT_STATES (default: false)
        let strict_states = match env::var("TASKMASTER_STRICT_STATES") {
            Ok(val) => parse_bool(&val).ok_or_else(|| ConfigError::InvalidValue {
                key: "TASKMASTER_STRICT_STATES".to_string(),
                message: format!("expected true or false, got '{val}'"),
            })?,
            Err(_) => false,
        };

        Ok(Self {
            vault_dir,
            settings_path,
            sync_attempts,
            strict_states,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
