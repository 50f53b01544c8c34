//! Error types for the TaskMaster engine.
//!
//! Each module owns an error enum for its own failure modes. [`EngineError`]
//! wraps them for callers that drive several modules at once.

use thiserror::Error;

use crate::commands::CommandError;
use crate::config::ConfigError;
use crate::document::DocumentError;
use crate::model::ModelError;
use crate::settings::SettingsError;
use crate::sync::SyncError;

/// Errors that can occur during engine operations.
///
/// Activation never produces one of these: a failed write-back is reported
/// in [`crate::engine::ActivationOutcome`] instead.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Settings could not be loaded, validated, or saved.
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// A state group mutation broke an invariant.
    #[error("state model error: {0}")]
    Model(#[from] ModelError),

    /// A document could not be read or written.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// A state change could not be written back.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// An editor command could not run.
    #[error("command error: {0}")]
    Command(#[from] CommandError),
}

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
