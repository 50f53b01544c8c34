//! The button engine.
//!
//! [`ButtonEngine`] ties the pieces into one loop: documents are rendered
//! into controls against the current settings snapshot, activating a control
//! advances it to the next state in its group and writes the change back to
//! the document.
//!
//! Activation never fails. The control's visual always moves to the next
//! state; whether the document followed is reported in
//! [`ActivationOutcome::persistence`]. When it did not, the control keeps
//! remembering the state still written in the source, so a later activation
//! rewrites from there.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::commands::{token_at_cursor, CommandError};
use crate::config::Config;
use crate::document::{DocumentError, DocumentStore};
use crate::error::Result;
use crate::model::TaskState;
use crate::render::{ButtonControl, Node, RenderOptions, RenderedDocument, Renderer};
use crate::settings::{Settings, SettingsHandle};
use crate::sync::{RewriteRequest, SourceSynchronizer, SyncError, TokenForm, DEFAULT_SYNC_ATTEMPTS};
use crate::transition::advance;

/// Whether an activation reached the document.
#[derive(Debug)]
pub enum Persistence {
    /// The token was rewritten using the given template.
    Persisted(TokenForm),

    /// The document still holds the previous state.
    NotPersisted(SyncError),
}

/// Result of activating a button.
#[derive(Debug)]
pub struct ActivationOutcome {
    pub button_id: String,
    pub group_id: String,
    /// State displayed before the activation.
    pub previous_state_id: String,
    /// State displayed now.
    pub state: TaskState,
    pub persistence: Persistence,
}

impl ActivationOutcome {
    /// Returns `true` if the document was updated.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        matches!(self.persistence, Persistence::Persisted(_))
    }

    /// The write-back failure, if any.
    #[must_use]
    pub fn sync_error(&self) -> Option<&SyncError> {
        match &self.persistence {
            Persistence::Persisted(_) => None,
            Persistence::NotPersisted(e) => Some(e),
        }
    }
}

/// Renders documents and cycles their buttons.
#[derive(Debug)]
pub struct ButtonEngine<D> {
    settings: SettingsHandle,
    sync: SourceSynchronizer<D>,
    options: RenderOptions,
}

impl<D: DocumentStore> ButtonEngine<D> {
    /// Creates an engine with default options.
    pub fn new(store: Arc<D>, settings: SettingsHandle) -> Self {
        Self {
            settings,
            sync: SourceSynchronizer::new(store, DEFAULT_SYNC_ATTEMPTS),
            options: RenderOptions::default(),
        }
    }

    /// Creates an engine using the attempt count and strict mode from
    /// `config`.
    pub fn from_config(store: Arc<D>, settings: SettingsHandle, config: &Config) -> Self {
        Self {
            settings,
            sync: SourceSynchronizer::new(store, config.sync_attempts),
            options: RenderOptions {
                strict_states: config.strict_states,
            },
        }
    }

    /// Replaces the render options.
    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// The current settings snapshot.
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.current()
    }

    /// The document store.
    pub fn store(&self) -> &Arc<D> {
        self.sync.store()
    }

    /// Renders `text` as the content of the document at `path`.
    pub fn render_text(&self, path: &str, text: &str) -> RenderedDocument {
        let settings = self.settings.current();
        let mut rendered = RenderedDocument::from_text(path, text);
        Renderer::new(&settings, self.options).render_into(&mut rendered, path);
        rendered
    }

    /// Reads and renders the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] if the document cannot be read.
    pub async fn render_document(&self, path: &str) -> std::result::Result<RenderedDocument, DocumentError> {
        let text = self.store().read_text(path).await?;
        Ok(self.render_text(path, &text))
    }

    /// Advances `control` to its next state and writes the change back to
    /// its document.
    pub async fn activate(&self, control: &mut ButtonControl) -> ActivationOutcome {
        let previous_state_id = control.state_id().to_string();
        let next = advance(control.group(), &previous_state_id).clone();

        control.apply_state(&next);

        let context = control.context();
        let request = RewriteRequest {
            document: context.document.clone(),
            button_id: context.button_id.clone(),
            group_id: context.group_id.clone(),
            old_state_id: context.source_state_id.clone(),
            new_state_id: next.id.clone(),
        };

        let persistence = match self.sync.rewrite(&request).await {
            Ok(form) => {
                control.mark_persisted(&next.id);
                info!(
                    path = %request.document,
                    button_id = %request.button_id,
                    from = %previous_state_id,
                    to = %next.id,
                    "Button state changed"
                );
                Persistence::Persisted(form)
            }
            Err(e) => {
                warn!(
                    path = %request.document,
                    button_id = %request.button_id,
                    state = %next.id,
                    error = %e,
                    "Button state not written back to document"
                );
                Persistence::NotPersisted(e)
            }
        };

        ActivationOutcome {
            button_id: request.button_id,
            group_id: request.group_id,
            previous_state_id,
            state: next,
            persistence,
        }
    }

    /// Renders the document at `path` and activates the first control bound
    /// to `button_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or holds no
    /// renderable button with that id.
    pub async fn cycle_button(&self, path: &str, button_id: &str) -> Result<ActivationOutcome> {
        let mut rendered = self.render_document(path).await?;
        let control = rendered
            .control_mut(button_id)
            .ok_or_else(|| CommandError::ButtonNotFound(button_id.to_string()))?;

        debug!(path, button_id, state = %control.state_id(), "Cycling button");
        Ok(self.activate(control).await)
    }

    /// Activates the button at the cursor. `path` defaults to the store's
    /// active document.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no document to work in, the cursor is
    /// out of range, no token is near the cursor, the token's group does
    /// not exist, or strict mode hides a token whose state is unknown.
    pub async fn cycle_at_cursor(
        &self,
        path: Option<&str>,
        line: usize,
        column: usize,
    ) -> Result<ActivationOutcome> {
        let path = match path {
            Some(path) => path.to_string(),
            None => self
                .store()
                .active_document()
                .ok_or(DocumentError::NoActiveDocument)?,
        };

        let text = self.store().read_text(&path).await?;
        let found = token_at_cursor(&text, line, column)?;

        let settings = self.settings.current();
        let node = Renderer::new(&settings, self.options).render(&path, &found.token, found.as_str());
        let Node::Control(mut control) = node else {
            let group_id = found
                .token
                .group_id
                .clone()
                .unwrap_or_else(|| settings.default_state_group.clone());
            if settings.group(&group_id).is_none() {
                return Err(CommandError::UnknownGroup(group_id).into());
            }
            return Err(CommandError::UnknownState {
                group_id,
                state_id: found.token.state_id.clone(),
            }
            .into());
        };

        debug!(path = %path, line, column, button_id = %control.button_id(), "Cycling button at cursor");
        Ok(self.activate(&mut control).await)
    }
}
