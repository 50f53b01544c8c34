//! Integration tests for environment variable configuration.
//!
//! # Important Notes
//!
//! These tests modify environment variables and use the `serial_test` crate
//! to prevent interference between tests.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use taskmaster_engine::config::{Config, ConfigError};

// =============================================================================
// Test Helpers
// =============================================================================

const VARS: [&str; 4] = [
    "TASKMASTER_VAULT_DIR",
    "TASKMASTER_SETTINGS_PATH",
    "TASKMASTER_SYNC_ATTEMPTS",
    "TASKMASTER_STRICT_STATES",
];

/// RAII guard that saves and restores an environment variable.
///
/// When dropped, the guard restores the environment variable to its
/// original value (or removes it if it was not set).
struct EnvGuard {
    name: String,
    original: Option<String>,
}

impl EnvGuard {
    /// Creates a new guard that saves the current value and clears it.
    fn cleared(name: &str) -> Self {
        let original = env::var(name).ok();
        env::remove_var(name);
        Self {
            name: name.to_string(),
            original,
        }
    }

    /// Sets the environment variable to a new value.
    fn set(&self, value: &str) {
        env::set_var(&self.name, value);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.original {
            Some(val) => env::set_var(&self.name, val),
            None => env::remove_var(&self.name),
        }
    }
}

/// Clears every TASKMASTER_* variable for the lifetime of the returned guards.
fn clean_env() -> Vec<EnvGuard> {
    VARS.iter().map(|name| EnvGuard::cleared(name)).collect()
}

fn guard<'a>(guards: &'a [EnvGuard], name: &str) -> &'a EnvGuard {
    guards
        .iter()
        .find(|g| g.name == name)
        .expect("guard exists for variable")
}

// =============================================================================
// Defaults
// =============================================================================

#[test]
#[serial]
fn defaults_use_current_directory() {
    let _guards = clean_env();

    let config = Config::from_env().expect("should parse empty environment");

    let cwd = env::current_dir().unwrap();
    assert_eq!(config.vault_dir, cwd);
    assert_eq!(
        config.settings_path,
        cwd.join(".obsidian/plugins/taskmaster/data.json")
    );
    assert_eq!(config.sync_attempts, 3);
    assert!(!config.strict_states);
}

#[test]
#[serial]
fn settings_path_follows_vault_dir() {
    let guards = clean_env();
    guard(&guards, "TASKMASTER_VAULT_DIR").set("/notes/vault");

    let config = Config::from_env().unwrap();

    assert_eq!(config.vault_dir, PathBuf::from("/notes/vault"));
    assert_eq!(
        config.settings_path,
        PathBuf::from("/notes/vault/.obsidian/plugins/taskmaster/data.json")
    );
}

// =============================================================================
// Explicit values
// =============================================================================

#[test]
#[serial]
fn full_config() {
    let guards = clean_env();
    guard(&guards, "TASKMASTER_VAULT_DIR").set("/vault");
    guard(&guards, "TASKMASTER_SETTINGS_PATH").set("/etc/taskmaster.json");
    guard(&guards, "TASKMASTER_SYNC_ATTEMPTS").set("7");
    guard(&guards, "TASKMASTER_STRICT_STATES").set("true");

    let config = Config::from_env().expect("should parse full config");

    assert_eq!(
        config,
        Config {
            vault_dir: PathBuf::from("/vault"),
            settings_path: PathBuf::from("/etc/taskmaster.json"),
            sync_attempts: 7,
            strict_states: true,
        }
    );
}

// =============================================================================
// Validation
// =============================================================================

#[test]
#[serial]
fn sync_attempts_must_be_a_number() {
    let guards = clean_env();
    guard(&guards, "TASKMASTER_SYNC_ATTEMPTS").set("lots");

    let err = Config::from_env().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue { ref key, .. } if key == "TASKMASTER_SYNC_ATTEMPTS"
    ));
}

#[test]
#[serial]
fn sync_attempts_range_is_enforced() {
    let guards = clean_env();

    for value in ["0", "11"] {
        guard(&guards, "TASKMASTER_SYNC_ATTEMPTS").set(value);
        let err = Config::from_env().unwrap_err();
        assert!(
            matches!(
                err,
                ConfigError::InvalidValue { ref message, .. } if message.contains("between 1 and 10")
            ),
            "value {value} should be rejected"
        );
    }

    for value in ["1", "10"] {
        guard(&guards, "TASKMASTER_SYNC_ATTEMPTS").set(value);
        assert!(Config::from_env().is_ok(), "value {value} should be accepted");
    }
}

#[test]
#[serial]
fn strict_states_rejects_garbage() {
    let guards = clean_env();
    guard(&guards, "TASKMASTER_STRICT_STATES").set("sometimes");

    let err = Config::from_env().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue { ref key, .. } if key == "TASKMASTER_STRICT_STATES"
    ));
}
