//! TaskMaster - multi-state buttons for plain-text notes.
//!
//! This binary renders, lists, and cycles the button tokens in a vault of
//! Markdown documents and manages the state groups they cycle through.
//!
//! # Commands
//!
//! - `taskmaster render <doc>`: Print a document with buttons drawn as `[Label]`
//! - `taskmaster list <doc>`: List every button in a document
//! - `taskmaster cycle <doc> <id>`: Advance a button to its next state
//! - `taskmaster cycle-at <doc> --line N --column N`: Advance the button at a cursor
//! - `taskmaster insert <doc> --line N --column N`: Insert a new button
//! - `taskmaster groups`: Show the configured state groups
//! - `taskmaster default-group <id>`: Change the default state group
//!
//! # Environment Variables
//!
//! See the [`config`](taskmaster_engine::config) module for available
//! configuration options.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use taskmaster_engine::commands::{generate_button_id, insert_button, list_buttons};
use taskmaster_engine::config::Config;
use taskmaster_engine::document::{DocumentError, DocumentStore, FsDocumentStore};
use taskmaster_engine::engine::{ActivationOutcome, ButtonEngine, Persistence};
use taskmaster_engine::settings::{JsonFileSettingsStore, SettingsController};

/// TaskMaster - multi-state buttons for plain-text notes.
///
/// Buttons are stored in documents as `{{multi-state-button:...}}` tokens.
/// Document paths are relative to the vault directory.
#[derive(Parser, Debug)]
#[command(name = "taskmaster")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    TASKMASTER_VAULT_DIR       Vault directory (default: current directory)
    TASKMASTER_SETTINGS_PATH   Settings file (default: <vault>/.obsidian/plugins/taskmaster/data.json)
    TASKMASTER_SYNC_ATTEMPTS   Write-back attempts on concurrent edits (default: 3)
    TASKMASTER_STRICT_STATES   Show tokens with unknown states as text (default: false)

EXAMPLES:
    # Show a note with its buttons
    taskmaster render daily/2025-08-06.md

    # Advance one button
    taskmaster cycle daily/2025-08-06.md btn_me0x1k2a_4f9qz

    # Add a bug-tracking button at the start of line 3
    taskmaster insert todo.md --line 2 --column 0 --group bugs
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print a document with each button drawn as `[Label]`.
    Render {
        /// Document path relative to the vault.
        document: String,
    },

    /// List every button in a document.
    List {
        /// Document path relative to the vault.
        document: String,
    },

    /// Advance a button to the next state of its group.
    Cycle {
        /// Document path relative to the vault.
        document: String,

        /// Button id.
        button_id: String,
    },

    /// Advance the button at a cursor position.
    ///
    /// Lines and columns are zero-based. The cursor may sit up to five
    /// characters outside the token.
    CycleAt {
        /// Document path relative to the vault.
        document: String,

        #[arg(long)]
        line: usize,

        #[arg(long)]
        column: usize,
    },

    /// Insert a new button at a cursor position.
    ///
    /// The button starts in the first state of its group. Lines and columns
    /// are zero-based. The document is created if it does not exist.
    Insert {
        /// Document path relative to the vault.
        document: String,

        #[arg(long)]
        line: usize,

        #[arg(long)]
        column: usize,

        /// State group (default: the configured default group).
        #[arg(short, long)]
        group: Option<String>,

        /// Button id (default: generated).
        #[arg(long)]
        id: Option<String>,
    },

    /// Show the configured state groups.
    Groups,

    /// Change the default state group.
    DefaultGroup {
        /// Group id.
        group_id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let settings_store = JsonFileSettingsStore::new(&config.settings_path);
    let mut controller = SettingsController::load(settings_store)
        .await
        .with_context(|| {
            format!(
                "Failed to load settings from {}",
                config.settings_path.display()
            )
        })?;

    init_logging(controller.snapshot().debug_mode);

    debug!(
        vault_dir = %config.vault_dir.display(),
        settings_path = %config.settings_path.display(),
        sync_attempts = config.sync_attempts,
        strict_states = config.strict_states,
        "Configuration loaded"
    );

    let store = Arc::new(FsDocumentStore::new(&config.vault_dir));
    let engine = ButtonEngine::from_config(Arc::clone(&store), controller.subscribe(), &config);

    match cli.command {
        Command::Render { document } => {
            let rendered = engine
                .render_document(&document)
                .await
                .with_context(|| format!("Failed to read {document}"))?;
            let output = rendered.to_string();
            if output.ends_with('\n') {
                print!("{output}");
            } else {
                println!("{output}");
            }
        }

        Command::List { document } => {
            let text = store
                .read_text(&document)
                .await
                .with_context(|| format!("Failed to read {document}"))?;
            for button in list_buttons(&text, &engine.settings()) {
                let label = button
                    .display_state
                    .as_ref()
                    .map_or("(unknown group)", |state| state.name.as_str());
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    button.line,
                    button.button_id,
                    button.group_id,
                    button.state_id,
                    label
                );
            }
        }

        Command::Cycle {
            document,
            button_id,
        } => {
            let outcome = engine
                .cycle_button(&document, &button_id)
                .await
                .with_context(|| format!("Failed to cycle {button_id} in {document}"))?;
            report(outcome)?;
        }

        Command::CycleAt {
            document,
            line,
            column,
        } => {
            let outcome = engine
                .cycle_at_cursor(Some(&document), line, column)
                .await
                .with_context(|| format!("Failed to cycle button in {document}"))?;
            report(outcome)?;
        }

        Command::Insert {
            document,
            line,
            column,
            group,
            id,
        } => {
            let existing = match store.read_text(&document).await {
                Ok(text) => Some(text),
                Err(DocumentError::NotFound(_)) => None,
                Err(e) => return Err(e).with_context(|| format!("Failed to read {document}")),
            };
            let text = existing.as_deref().unwrap_or_default();

            let button_id = id.unwrap_or_else(generate_button_id);
            let inserted = insert_button(
                text,
                line,
                column,
                &button_id,
                group.as_deref(),
                &engine.settings(),
            )?;

            let written = match &existing {
                Some(original) => store.replace_text(&document, original, &inserted.text).await,
                None => store.write_text(&document, &inserted.text).await,
            };
            written.with_context(|| format!("Failed to write {document}"))?;

            println!("{}", inserted.token);
        }

        Command::Groups => {
            let settings = engine.settings();
            for group in settings.state_groups.values() {
                let marker = if group.id() == settings.default_state_group {
                    " (default)"
                } else {
                    ""
                };
                println!("{} - {}{marker}", group.id(), group.name());
                for state in group.states() {
                    println!("    {}. {} [{}] {}", state.order, state.id, state.name, state.color);
                }
            }
        }

        Command::DefaultGroup { group_id } => {
            controller
                .set_default_group(&group_id)
                .await
                .with_context(|| format!("Failed to set default group to {group_id}"))?;
            println!("Default group: {group_id}");
        }
    }

    Ok(())
}

/// Prints an activation result. A change that did not reach the document
/// is an error.
fn report(outcome: ActivationOutcome) -> Result<()> {
    match outcome.persistence {
        Persistence::Persisted(_) => {
            println!(
                "{}: {} -> {} ({})",
                outcome.button_id, outcome.previous_state_id, outcome.state.id, outcome.state.name
            );
            Ok(())
        }
        Persistence::NotPersisted(e) => Err(anyhow::Error::new(e).context(format!(
            "{} advanced to {} but the document was not updated",
            outcome.button_id, outcome.state.id
        ))),
    }
}

/// Initializes the logging subsystem.
///
/// `RUST_LOG` wins when set. Otherwise the filter is `debug` in debug mode
/// and `info` elsewhere.
fn init_logging(debug_mode: bool) {
    let default_level = if debug_mode { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}
