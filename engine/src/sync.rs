//! Source synchronizer.
//!
//! Writes a button's new state back into the document text. The document is
//! the source of truth, so the synchronizer locates the exact token the
//! control was rendered from and swaps only that span.
//!
//! Tokens may have been authored in several historical forms. The
//! synchronizer tries an ordered list of [`TokenForm`] templates and replaces
//! the first occurrence of the first template that matches:
//!
//! | # | Form searched | Written back as |
//! |---|---------------|-----------------|
//! | 1 | `id=..;group=..;state=..` | same |
//! | 2 | `<id>:<state>` | same |
//! | 3 | `group=..;id=..;state=..` | `id=..;group=..;state=..` |
//! | 4 | `state=..;id=..;group=..` | `id=..;group=..;state=..` |
//! | 5 | `state=..;group=..;id=..` | `id=..;group=..;state=..` |
//! | 6 | `id=..;state=..` | same |
//! | 7 | `state=..;id=..` | `id=..;state=..` |
//!
//! Templates are matched as exact text. The parser trims whitespace around
//! extended keys and values, so a token such as
//! `{{multi-state-button: id=b; state=todo}}` renders but matches no template:
//! activating it reports [`SyncError::SourceMismatch`] and leaves the
//! document unchanged.
//!
//! Writes are compare-and-swap: the text that was read is handed back to
//! [`DocumentStore::replace_text`], and a concurrent edit restarts the whole
//! read, match, write cycle up to a configured number of attempts.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::document::{DocumentError, DocumentStore};
use crate::token::{extended_token, legacy_token};

/// Default number of compare-and-swap attempts per rewrite.
pub const DEFAULT_SYNC_ATTEMPTS: u8 = 3;

/// Errors that can occur while writing a state change back to a document.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The document behind the button no longer exists.
    #[error("source document not found: {path}")]
    SourceNotFound { path: String },

    /// No template matched the button's token in the current text.
    #[error("no token for button '{button_id}' in state '{state_id}' found in {path}")]
    SourceMismatch {
        path: String,
        button_id: String,
        state_id: String,
    },

    /// Every attempt lost a race with a concurrent edit.
    #[error("document {path} kept changing; gave up after {attempts} attempts")]
    Conflict { path: String, attempts: u8 },

    /// The document store failed.
    #[error("document store error: {0}")]
    Store(#[from] DocumentError),
}

/// One concrete way a token can be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenForm {
    /// `id;group;state`
    Canonical,
    /// `<id>:<state>`
    Legacy,
    /// `group;id;state`
    GroupIdState,
    /// `state;id;group`
    StateIdGroup,
    /// `state;group;id`
    StateGroupId,
    /// `id;state` with no group.
    IdState,
    /// `state;id` with no group.
    StateId,
}

/// Search order used by [`rewrite_text`]. Each entry is matched verbatim,
/// with no whitespace around keys, values or separators.
pub const TEMPLATES: [TokenForm; 7] = [
    TokenForm::Canonical,
    TokenForm::Legacy,
    TokenForm::GroupIdState,
    TokenForm::StateIdGroup,
    TokenForm::StateGroupId,
    TokenForm::IdState,
    TokenForm::StateId,
];

impl TokenForm {
    /// Formats a token in this form.
    #[must_use]
    pub fn format(self, button_id: &str, group_id: &str, state_id: &str) -> String {
        let (id, group, state) = (button_id, group_id, state_id);
        match self {
            Self::Canonical => extended_token(id, Some(group), state),
            Self::Legacy => legacy_token(id, state),
            Self::GroupIdState => wrap(&format!("group={group};id={id};state={state}")),
            Self::StateIdGroup => wrap(&format!("state={state};id={id};group={group}")),
            Self::StateGroupId => wrap(&format!("state={state};group={group};id={id}")),
            Self::IdState => extended_token(id, None, state),
            Self::StateId => wrap(&format!("state={state};id={id}")),
        }
    }

    /// The form a match is rewritten into.
    #[must_use]
    pub fn written_as(self) -> Self {
        match self {
            Self::Canonical | Self::GroupIdState | Self::StateIdGroup | Self::StateGroupId => {
                Self::Canonical
            }
            Self::Legacy => Self::Legacy,
            Self::IdState | Self::StateId => Self::IdState,
        }
    }
}

fn wrap(params: &str) -> String {
    format!("{{{{{}:{params}}}}}", crate::token::TOKEN_TAG)
}

/// A state change to write back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRequest {
    pub document: String,
    pub button_id: String,
    pub group_id: String,
    /// State currently written in the document.
    pub old_state_id: String,
    pub new_state_id: String,
}

/// Replaces the first occurrence of the button's token, trying each
/// template in [`TEMPLATES`] order. Returns the new text and the template
/// that matched, or `None` if no template matched.
#[must_use]
pub fn rewrite_text(text: &str, request: &RewriteRequest) -> Option<(String, TokenForm)> {
    TEMPLATES.iter().find_map(|&form| {
        let old = form.format(&request.button_id, &request.group_id, &request.old_state_id);
        let start = text.find(&old)?;
        let new = form.written_as().format(
            &request.button_id,
            &request.group_id,
            &request.new_state_id,
        );

        let mut rewritten = String::with_capacity(text.len() - old.len() + new.len());
        rewritten.push_str(&text[..start]);
        rewritten.push_str(&new);
        rewritten.push_str(&text[start + old.len()..]);
        Some((rewritten, form))
    })
}

/// Writes state changes back to documents.
#[derive(Debug)]
pub struct SourceSynchronizer<D> {
    store: Arc<D>,
    max_attempts: u8,
}

impl<D> Clone for SourceSynchronizer<D> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_attempts: self.max_attempts,
        }
    }
}

impl<D: DocumentStore> SourceSynchronizer<D> {
    /// Creates a synchronizer that makes at most `max_attempts` (minimum 1)
    /// compare-and-swap attempts per rewrite.
    pub fn new(store: Arc<D>, max_attempts: u8) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// The underlying document store.
    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    /// Rewrites the button's token from `old_state_id` to `new_state_id`.
    /// Returns the template that matched.
    ///
    /// # Errors
    ///
    /// - [`SyncError::SourceNotFound`] if the document is gone
    /// - [`SyncError::SourceMismatch`] if no template matches the current text
    /// - [`SyncError::Conflict`] if every attempt raced a concurrent edit
    /// - [`SyncError::Store`] for other store failures
    pub async fn rewrite(&self, request: &RewriteRequest) -> Result<TokenForm, SyncError> {
        let path = &request.document;

        for attempt in 1..=self.max_attempts {
            let text = self
                .store
                .read_text(path)
                .await
                .map_err(not_found_as_source)?;

            let Some((rewritten, form)) = rewrite_text(&text, request) else {
                return Err(SyncError::SourceMismatch {
                    path: path.clone(),
                    button_id: request.button_id.clone(),
                    state_id: request.old_state_id.clone(),
                });
            };

            if rewritten == text {
                return Ok(form);
            }

            match self.store.replace_text(path, &text, &rewritten).await {
                Ok(()) => {
                    debug!(
                        path = %path,
                        button_id = %request.button_id,
                        from = %request.old_state_id,
                        to = %request.new_state_id,
                        form = ?form,
                        attempt,
                        "Rewrote button token"
                    );
                    return Ok(form);
                }
                Err(DocumentError::Conflict(_)) => {
                    debug!(path = %path, attempt, "Document changed during rewrite, retrying");
                }
                Err(e) => return Err(not_found_as_source(e)),
            }
        }

        Err(SyncError::Conflict {
            path: path.clone(),
            attempts: self.max_attempts,
        })
    }
}

fn not_found_as_source(error: DocumentError) -> SyncError {
    match error {
        DocumentError::NotFound(path) => SyncError::SourceNotFound { path },
        other => SyncError::Store(other),
    }
}
