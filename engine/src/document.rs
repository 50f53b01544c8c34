//! Document access.
//!
//! Documents are addressed by vault-relative paths such as
//! `projects/roadmap.md`. [`DocumentStore::replace_text`] is the only write
//! path the synchronizer uses: it swaps the whole text only if the document
//! still holds exactly what the caller read, so an edit that lands between
//! the read and the write is detected instead of overwritten.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

/// Errors that can occur while reading or writing documents.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// No document exists at the path.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Reading or writing the document failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The path is empty, absolute, or escapes the vault.
    #[error("invalid document path: {0}")]
    InvalidPath(String),

    /// The document changed since it was read.
    #[error("document changed concurrently: {0}")]
    Conflict(String),

    /// The host has no active document.
    #[error("no active document")]
    NoActiveDocument,
}

/// Text storage for documents.
pub trait DocumentStore: Send + Sync {
    /// Reads the full text of the document at `path`.
    fn read_text(&self, path: &str) -> impl Future<Output = Result<String, DocumentError>> + Send;

    /// Overwrites the document at `path`, creating it if needed.
    fn write_text(
        &self,
        path: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), DocumentError>> + Send;

    /// Replaces the document's text with `new_text` only if it currently
    /// equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Conflict`] if the text differs from
    /// `expected`.
    fn replace_text(
        &self,
        path: &str,
        expected: &str,
        new_text: &str,
    ) -> impl Future<Output = Result<(), DocumentError>> + Send;

    /// Path of the document the user is currently working in, if any.
    fn active_document(&self) -> Option<String>;
}

/// Documents stored as files under a vault directory.
#[derive(Debug)]
pub struct FsDocumentStore {
    root: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    active: Mutex<Option<String>>,
}

impl FsDocumentStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    /// The vault directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Marks `path` as the active document.
    pub fn set_active(&self, path: Option<String>) {
        *self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = path;
    }

    /// Maps a vault-relative path onto the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidPath`] for empty or absolute paths and
    /// for paths containing `..`.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, DocumentError> {
        let relative = Path::new(path);
        if path.trim().is_empty() {
            return Err(DocumentError::InvalidPath(path.to_string()));
        }

        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(DocumentError::InvalidPath(path.to_string()));
                }
            }
        }

        Ok(self.root.join(relative))
    }

    async fn read_resolved(&self, path: &str, full: &Path) -> Result<String, DocumentError> {
        tokio::fs::read_to_string(full)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn write_resolved(&self, path: &str, full: &Path, text: &str) -> Result<(), DocumentError> {
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(path, e))?;
        }
        tokio::fs::write(full, text)
            .await
            .map_err(|e| io_error(path, e))
    }
}

impl DocumentStore for FsDocumentStore {
    async fn read_text(&self, path: &str) -> Result<String, DocumentError> {
        let full = self.resolve(path)?;
        self.read_resolved(path, &full).await
    }

    async fn write_text(&self, path: &str, text: &str) -> Result<(), DocumentError> {
        let full = self.resolve(path)?;
        let _guard = self.write_lock.lock().await;
        self.write_resolved(path, &full, text).await
    }

    async fn replace_text(&self, path: &str, expected: &str, new_text: &str) -> Result<(), DocumentError> {
        let full = self.resolve(path)?;
        let _guard = self.write_lock.lock().await;

        let current = self.read_resolved(path, &full).await?;
        if current != expected {
            debug!(path, "Document changed since read");
            return Err(DocumentError::Conflict(path.to_string()));
        }
        self.write_resolved(path, &full, new_text).await
    }

    fn active_document(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn io_error(path: &str, source: io::Error) -> DocumentError {
    if source.kind() == io::ErrorKind::NotFound {
        DocumentError::NotFound(path.to_string())
    } else {
        DocumentError::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// In-memory documents for hosts that keep text themselves, and for tests.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<String, String>>,
    active: Mutex<Option<String>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites a document.
    pub fn insert(&self, path: impl Into<String>, text: impl Into<String>) {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.into(), text.into());
    }

    /// Current text of a document.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<String> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned()
    }

    /// Marks `path` as the active document.
    pub fn set_active(&self, path: Option<String>) {
        *self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = path;
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn read_text(&self, path: &str) -> Result<String, DocumentError> {
        self.get(path)
            .ok_or_else(|| DocumentError::NotFound(path.to_string()))
    }

    async fn write_text(&self, path: &str, text: &str) -> Result<(), DocumentError> {
        self.insert(path, text);
        Ok(())
    }

    async fn replace_text(&self, path: &str, expected: &str, new_text: &str) -> Result<(), DocumentError> {
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = documents
            .get_mut(path)
            .ok_or_else(|| DocumentError::NotFound(path.to_string()))?;
        if current.as_str() != expected {
            return Err(DocumentError::Conflict(path.to_string()));
        }
        *current = new_text.to_string();
        Ok(())
    }

    fn active_document(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
