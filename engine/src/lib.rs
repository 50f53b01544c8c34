//! TaskMaster engine - multi-state buttons embedded in plain-text documents.
//!
//! A button lives in a document as an inline token such as
//! `{{multi-state-button:btn1:todo}}`. The engine finds those tokens, renders
//! each one as a control showing its current state, and when a control is
//! activated advances it to the next state of its group and rewrites the
//! token in the document. The document text is always the source of truth.
//!
//! # Modules
//!
//! - [`model`]: Task states and state groups
//! - [`token`]: Token parsing for the legacy and extended syntaxes
//! - [`transition`]: Cycling to the next state
//! - [`render`]: Controls, contrast colours, and render targets
//! - [`document`]: Document stores with compare-and-swap writes
//! - [`sync`]: Writing state changes back into document text
//! - [`settings`]: Settings persistence and snapshot publishing
//! - [`engine`]: The render, activate, write-back loop
//! - [`commands`]: Editor commands (insert, cycle at cursor, list)
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for engine operations

pub mod commands;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod model;
pub mod render;
pub mod settings;
pub mod sync;
pub mod token;
pub mod transition;

pub use commands::{generate_button_id, insert_button, list_buttons, token_at_cursor, CommandError};
pub use config::{Config, ConfigError};
pub use document::{DocumentError, DocumentStore, FsDocumentStore, MemoryDocumentStore};
pub use engine::{ActivationOutcome, ButtonEngine, Persistence};
pub use error::{EngineError, Result};
pub use model::{ModelError, TaskState, TaskStateGroup};
pub use render::{
    contrast_color, ButtonControl, Foreground, Node, RenderOptions, RenderTarget, RenderedDocument,
    Renderer, Rgb,
};
pub use settings::{
    JsonFileSettingsStore, MemorySettingsStore, Settings, SettingsController, SettingsError,
    SettingsHandle, SettingsStore,
};
pub use sync::{rewrite_text, RewriteRequest, SourceSynchronizer, SyncError, TokenForm};
pub use token::{parse_token, scan, ButtonRef, ButtonToken, TokenMatch, TokenSyntax};
pub use transition::advance;
