//! Settings aggregate, persistence, and the snapshot controller.
//!
//! Settings are stored as one JSON document using camelCase keys. Loading
//! merges the persisted document over the built-in defaults: keys present
//! in the document win, missing keys keep their default, and keys this crate
//! does not know about are carried through untouched so they survive a save.
//!
//! # Ownership
//!
//! A single [`SettingsController`] owns the mutable settings. Every mutation
//! is validated, persisted through a [`SettingsStore`], and only then
//! published as a new immutable `Arc<Settings>` snapshot. Readers hold a
//! [`SettingsHandle`] and take a snapshot at the start of each operation, so
//! nothing ever observes a half-applied change.
//!
//! # Example
//!
//! ```
//! use taskmaster_engine::settings::{MemorySettingsStore, SettingsController};
//!
//! # tokio_test_block_on(async {
//! let mut controller = SettingsController::load(MemorySettingsStore::default()).await.unwrap();
//! let handle = controller.subscribe();
//!
//! controller.remove_state("default", "in-progress").await.unwrap();
//! assert_eq!(handle.current().group("default").unwrap().len(), 2);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::model::{ModelError, TaskState, TaskStateGroup};

/// Id of the built-in state group.
pub const DEFAULT_GROUP_ID: &str = "default";

/// Errors that can occur while loading, saving, or mutating settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("failed to access settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The settings document is not valid JSON.
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A group mutation broke a state model invariant.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The referenced state group does not exist.
    #[error("unknown state group: {0}")]
    UnknownGroup(String),

    /// A group with this id already exists.
    #[error("state group already exists: {0}")]
    DuplicateGroup(String),

    /// The default group cannot be removed.
    #[error("cannot remove '{0}': it is the default state group")]
    DefaultGroupRemoval(String),
}

/// A person who can be assigned to tasks. Carried through settings for the
/// people-management features layered on top of the button engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub role: String,
}

/// The root settings aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// State groups keyed by group id.
    pub state_groups: BTreeMap<String, TaskStateGroup>,

    /// Group used by tokens that do not name one.
    pub default_state_group: String,

    /// Enables debug-level logging.
    pub debug_mode: bool,

    /// People keyed by person id.
    pub people: BTreeMap<String, Person>,

    pub time_tracking_enabled: bool,

    pub auto_save: bool,

    pub theme: String,

    /// Keys not modelled here, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut state_groups = BTreeMap::new();
        let group = default_state_group();
        state_groups.insert(group.id().to_string(), group);

        Self {
            state_groups,
            default_state_group: DEFAULT_GROUP_ID.to_string(),
            debug_mode: false,
            people: BTreeMap::new(),
            time_tracking_enabled: true,
            auto_save: true,
            theme: "default".to_string(),
            extra: Map::new(),
        }
    }
}

/// The built-in `To Do → In Progress → Done` workflow.
#[must_use]
pub fn default_state_group() -> TaskStateGroup {
    TaskStateGroup::new(
        DEFAULT_GROUP_ID,
        "Default",
        vec![
            TaskState::new("todo", "To Do", "#e74c3c", 0),
            TaskState::new("in-progress", "In Progress", "#f39c12", 1),
            TaskState::new("done", "Done", "#27ae60", 2),
        ],
    )
    .unwrap_or_else(|_| unreachable!("built-in group satisfies every invariant"))
}

impl Settings {
    /// Merges a persisted settings document over the defaults.
    ///
    /// Each known key is decoded on its own, so one malformed value falls
    /// back to its default without discarding the rest of the document.
    /// State groups that violate the model's invariants are dropped with a
    /// warning; if none survive, the built-in group is used. A default
    /// group id that names no surviving group is replaced by the first
    /// group id.
    #[must_use]
    pub fn merge_over_defaults(persisted: Value) -> Self {
        let defaults = Self::default();
        let mut doc = match persisted {
            Value::Object(map) => map,
            Value::Null => return defaults,
            other => {
                warn!(kind = %json_kind(&other), "Settings document is not an object, using defaults");
                return defaults;
            }
        };

        let mut state_groups = doc
            .remove("stateGroups")
            .map(decode_groups)
            .unwrap_or_default();
        if state_groups.is_empty() {
            state_groups = defaults.state_groups.clone();
        }

        let mut default_state_group =
            take_field(&mut doc, "defaultStateGroup", defaults.default_state_group);
        if !state_groups.contains_key(&default_state_group) {
            if let Some(first) = state_groups.keys().next() {
                warn!(
                    missing = %default_state_group,
                    replacement = %first,
                    "Default state group does not exist"
                );
                default_state_group = first.clone();
            }
        }

        Self {
            state_groups,
            default_state_group,
            debug_mode: take_field(&mut doc, "debugMode", defaults.debug_mode),
            people: take_field(&mut doc, "people", defaults.people),
            time_tracking_enabled: take_field(
                &mut doc,
                "timeTrackingEnabled",
                defaults.time_tracking_enabled,
            ),
            auto_save: take_field(&mut doc, "autoSave", defaults.auto_save),
            theme: take_field(&mut doc, "theme", defaults.theme),
            extra: doc,
        }
    }

    /// Looks up a group by id.
    #[must_use]
    pub fn group(&self, group_id: &str) -> Option<&TaskStateGroup> {
        self.state_groups.get(group_id)
    }

    /// Returns the default group, if it exists.
    #[must_use]
    pub fn default_group(&self) -> Option<&TaskStateGroup> {
        self.group(&self.default_state_group)
    }

    /// Resolves an optional group reference, falling back to the default.
    #[must_use]
    pub fn resolve_group(&self, group_id: Option<&str>) -> Option<&TaskStateGroup> {
        self.group(group_id.unwrap_or(&self.default_state_group))
    }

    fn group_mut(&mut self, group_id: &str) -> Result<&mut TaskStateGroup, SettingsError> {
        self.state_groups
            .get_mut(group_id)
            .ok_or_else(|| SettingsError::UnknownGroup(group_id.to_string()))
    }
}

fn decode_groups(value: Value) -> BTreeMap<String, TaskStateGroup> {
    let Value::Object(entries) = value else {
        warn!("stateGroups is not an object, ignoring");
        return BTreeMap::new();
    };

    let mut groups = BTreeMap::new();
    for (key, raw) in entries {
        match serde_json::from_value::<TaskStateGroup>(raw) {
            Ok(group) => {
                if group.id() != key {
                    warn!(key = %key, id = %group.id(), "State group key does not match its id, using id");
                }
                if groups.contains_key(group.id()) {
                    warn!(key = %key, id = %group.id(), "Duplicate state group id, keeping the first");
                    continue;
                }
                groups.insert(group.id().to_string(), group);
            }
            Err(e) => {
                warn!(group = %key, error = %e, "Dropping invalid state group");
            }
        }
    }
    groups
}

fn take_field<T: DeserializeOwned>(doc: &mut Map<String, Value>, key: &str, default: T) -> T {
    match doc.remove(key) {
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(key, error = %e, "Ignoring invalid settings value");
            default
        }),
        None => default,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Persistence backend for the settings document.
pub trait SettingsStore: Send + Sync {
    /// Loads settings, merged over the defaults.
    fn load(&self) -> impl Future<Output = Result<Settings, SettingsError>> + Send;

    /// Persists the full settings document.
    fn save(&self, settings: &Settings) -> impl Future<Output = Result<(), SettingsError>> + Send;
}

/// Stores settings as pretty-printed JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
}

impl JsonFileSettingsStore {
    /// Creates a store backed by `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SettingsStore for JsonFileSettingsStore {
    async fn load(&self) -> Result<Settings, SettingsError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No settings file found, using defaults");
                return Ok(Settings::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        if contents.trim().is_empty() {
            return Ok(Settings::default());
        }

        let value: Value = serde_json::from_str(&contents)?;
        Ok(Settings::merge_over_defaults(value))
    }

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(settings)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }

        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

/// In-memory settings store holding the last saved JSON document.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    document: Mutex<Option<Value>>,
}

impl MemorySettingsStore {
    /// Creates a store pre-populated with a persisted document.
    #[must_use]
    pub fn with_document(document: Value) -> Self {
        Self {
            document: Mutex::new(Some(document)),
        }
    }

    /// Returns the last saved document.
    #[must_use]
    pub fn document(&self) -> Option<Value> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<Settings, SettingsError> {
        Ok(self
            .document()
            .map(Settings::merge_over_defaults)
            .unwrap_or_default())
    }

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let value = serde_json::to_value(settings)?;
        *self
            .document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(value);
        Ok(())
    }
}

/// Read-only view of the latest published settings snapshot.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    rx: watch::Receiver<Arc<Settings>>,
}

impl SettingsHandle {
    /// A handle that always yields `settings`, for hosts without a
    /// controller.
    #[must_use]
    pub fn fixed(settings: Settings) -> Self {
        let (_tx, rx) = watch::channel(Arc::new(settings));
        Self { rx }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<Settings> {
        Arc::clone(&self.rx.borrow())
    }

    /// Waits for the next published snapshot. Returns `false` once the
    /// controller is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Single owner of the mutable settings.
#[derive(Debug)]
pub struct SettingsController<S> {
    store: S,
    current: Settings,
    publisher: watch::Sender<Arc<Settings>>,
}

impl<S: SettingsStore> SettingsController<S> {
    /// Loads settings from `store` and starts publishing snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the store fails to load.
    pub async fn load(store: S) -> Result<Self, SettingsError> {
        let settings = store.load().await?;
        Ok(Self::new(store, settings))
    }

    /// Creates a controller around already-loaded settings.
    pub fn new(store: S, settings: Settings) -> Self {
        let (publisher, _rx) = watch::channel(Arc::new(settings.clone()));
        Self {
            store,
            current: settings,
            publisher,
        }
    }

    /// Returns a handle that follows every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> SettingsHandle {
        SettingsHandle {
            rx: self.publisher.subscribe(),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Settings> {
        Arc::clone(&self.publisher.borrow())
    }

    /// Returns the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replaces the whole settings document.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::UnknownGroup`] if the new default group does
    /// not exist, or a store error if persisting fails.
    pub async fn replace(&mut self, settings: Settings) -> Result<(), SettingsError> {
        if settings.default_group().is_none() {
            return Err(SettingsError::UnknownGroup(settings.default_state_group));
        }
        self.commit(settings).await
    }

    /// Adds a new group.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::DuplicateGroup`] if the id is taken.
    pub async fn add_group(&mut self, group: TaskStateGroup) -> Result<(), SettingsError> {
        if self.current.state_groups.contains_key(group.id()) {
            return Err(SettingsError::DuplicateGroup(group.id().to_string()));
        }
        self.upsert_group(group).await
    }

    /// Adds or replaces a group.
    ///
    /// # Errors
    ///
    /// Returns a store error if persisting fails.
    pub async fn upsert_group(&mut self, group: TaskStateGroup) -> Result<(), SettingsError> {
        let mut next = self.current.clone();
        next.state_groups.insert(group.id().to_string(), group);
        self.commit(next).await
    }

    /// Removes a group other than the default one.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::DefaultGroupRemoval`] for the default group
    /// and [`SettingsError::UnknownGroup`] if the id does not exist.
    pub async fn remove_group(&mut self, group_id: &str) -> Result<TaskStateGroup, SettingsError> {
        if group_id == self.current.default_state_group {
            return Err(SettingsError::DefaultGroupRemoval(group_id.to_string()));
        }
        let mut next = self.current.clone();
        let removed = next
            .state_groups
            .remove(group_id)
            .ok_or_else(|| SettingsError::UnknownGroup(group_id.to_string()))?;
        self.commit(next).await?;
        Ok(removed)
    }

    /// Changes the default group.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::UnknownGroup`] if the group does not exist.
    pub async fn set_default_group(&mut self, group_id: &str) -> Result<(), SettingsError> {
        if self.current.group(group_id).is_none() {
            return Err(SettingsError::UnknownGroup(group_id.to_string()));
        }
        let mut next = self.current.clone();
        next.default_state_group = group_id.to_string();
        self.commit(next).await
    }

    /// Appends a state to a group.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the group is unknown or the state breaks
    /// a group invariant.
    pub async fn add_state(&mut self, group_id: &str, state: TaskState) -> Result<(), SettingsError> {
        let mut next = self.current.clone();
        next.group_mut(group_id)?.add_state(state)?;
        self.commit(next).await
    }

    /// Replaces a state in a group, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the group or state is unknown or the
    /// replacement breaks a group invariant.
    pub async fn replace_state(
        &mut self,
        group_id: &str,
        state_id: &str,
        replacement: TaskState,
    ) -> Result<(), SettingsError> {
        let mut next = self.current.clone();
        next.group_mut(group_id)?
            .replace_state(state_id, replacement)?;
        self.commit(next).await
    }

    /// Removes a state from a group. The last state cannot be removed.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the group or state is unknown or the
    /// state is the last one in its group.
    pub async fn remove_state(
        &mut self,
        group_id: &str,
        state_id: &str,
    ) -> Result<TaskState, SettingsError> {
        let mut next = self.current.clone();
        let removed = next.group_mut(group_id)?.remove_state(state_id)?;
        self.commit(next).await?;
        Ok(removed)
    }

    /// Moves a state to a new cycle position.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the group or state is unknown.
    pub async fn move_state(
        &mut self,
        group_id: &str,
        state_id: &str,
        new_index: usize,
    ) -> Result<(), SettingsError> {
        let mut next = self.current.clone();
        next.group_mut(group_id)?.move_state(state_id, new_index)?;
        self.commit(next).await
    }

    /// Persists `next`, then makes it current and publishes it.
    async fn commit(&mut self, next: Settings) -> Result<(), SettingsError> {
        self.store.save(&next).await?;
        self.current = next;
        self.publisher.send_replace(Arc::new(self.current.clone()));
        debug!(
            groups = self.current.state_groups.len(),
            default_group = %self.current.default_state_group,
            "Published settings snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_state_group(id: &str) -> TaskStateGroup {
        TaskStateGroup::new(
            id,
            id.to_uppercase(),
            vec![
                TaskState::new("open", "Open", "#3b82f6", 0),
                TaskState::new("closed", "Closed", "#10b981", 1),
            ],
        )
        .unwrap()
    }

    #[test]
    fn defaults_contain_builtin_group() {
        let settings = Settings::default();
        let group = settings.default_group().unwrap();

        assert_eq!(settings.default_state_group, "default");
        let ids: Vec<_> = group.states().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["todo", "in-progress", "done"]);
    }

    #[test]
    fn merge_keeps_defaults_for_missing_keys() {
        let settings = Settings::merge_over_defaults(json!({ "debugMode": true }));

        assert!(settings.debug_mode);
        assert!(settings.time_tracking_enabled);
        assert_eq!(settings.theme, "default");
        assert!(settings.group("default").is_some());
    }

    #[test]
    fn merge_persisted_groups_replace_defaults() {
        let settings = Settings::merge_over_defaults(json!({
            "stateGroups": {
                "bugs": {
                    "id": "bugs",
                    "name": "Bugs",
                    "states": [
                        { "id": "new", "name": "New", "color": "#ff0000", "order": 0 },
                        { "id": "fixed", "name": "Fixed", "color": "#00ff00", "order": 1 }
                    ]
                }
            },
            "defaultStateGroup": "bugs"
        }));

        assert_eq!(settings.state_groups.len(), 1);
        assert_eq!(settings.default_state_group, "bugs");
        assert!(settings.group("default").is_none());
    }

    #[test]
    fn merge_drops_invalid_groups() {
        let settings = Settings::merge_over_defaults(json!({
            "stateGroups": {
                "empty": { "id": "empty", "name": "Empty", "states": [] },
                "ok": {
                    "id": "ok",
                    "name": "Ok",
                    "states": [{ "id": "a", "name": "A", "color": "#000000", "order": 0 }]
                }
            },
            "defaultStateGroup": "ok"
        }));

        assert!(settings.group("empty").is_none());
        assert!(settings.group("ok").is_some());
    }

    #[test]
    fn merge_drops_groups_with_unsafe_ids() {
        let settings = Settings::merge_over_defaults(json!({
            "stateGroups": {
                "review": {
                    "id": "review",
                    "name": "Review",
                    "states": [
                        { "id": "todo", "name": "To Do", "color": "#000000", "order": 0 },
                        { "id": "wip:review", "name": "WIP", "color": "#000000", "order": 1 }
                    ]
                },
                "bad;group": {
                    "id": "bad;group",
                    "name": "Bad",
                    "states": [{ "id": "a", "name": "A", "color": "#000000", "order": 0 }]
                },
                "ok": {
                    "id": "ok",
                    "name": "Ok",
                    "states": [{ "id": "a", "name": "A", "color": "#000000", "order": 0 }]
                }
            },
            "defaultStateGroup": "ok"
        }));

        assert!(settings.group("review").is_none());
        assert!(settings.group("bad;group").is_none());
        assert_eq!(settings.state_groups.len(), 1);
    }

    #[test]
    fn merge_keeps_first_group_on_id_collision() {
        let settings = Settings::merge_over_defaults(json!({
            "stateGroups": {
                "alpha": {
                    "id": "shared",
                    "name": "First",
                    "states": [{ "id": "a", "name": "A", "color": "#000000", "order": 0 }]
                },
                "beta": {
                    "id": "shared",
                    "name": "Second",
                    "states": [{ "id": "b", "name": "B", "color": "#000000", "order": 0 }]
                }
            },
            "defaultStateGroup": "shared"
        }));

        assert_eq!(settings.state_groups.len(), 1);
        assert_eq!(settings.group("shared").unwrap().name(), "First");
    }

    #[test]
    fn merge_falls_back_when_all_groups_invalid() {
        let settings = Settings::merge_over_defaults(json!({
            "stateGroups": { "empty": { "id": "empty", "name": "Empty", "states": [] } }
        }));

        assert!(settings.group("default").is_some());
        assert_eq!(settings.default_state_group, "default");
    }

    #[test]
    fn merge_repairs_dangling_default_group() {
        let settings = Settings::merge_over_defaults(json!({
            "stateGroups": {
                "work": {
                    "id": "work",
                    "name": "Work",
                    "states": [{ "id": "a", "name": "A", "color": "#000000", "order": 0 }]
                }
            },
            "defaultStateGroup": "gone"
        }));

        assert_eq!(settings.default_state_group, "work");
    }

    #[test]
    fn merge_ignores_badly_typed_values() {
        let settings = Settings::merge_over_defaults(json!({ "debugMode": "yes", "theme": "dark" }));

        assert!(!settings.debug_mode);
        assert_eq!(settings.theme, "dark");
    }

    #[test]
    fn merge_preserves_unknown_keys() {
        let settings = Settings::merge_over_defaults(json!({ "dashboardLayout": [1, 2, 3] }));
        assert_eq!(settings.extra.get("dashboardLayout"), Some(&json!([1, 2, 3])));

        let saved = serde_json::to_value(&settings).unwrap();
        assert_eq!(saved["dashboardLayout"], json!([1, 2, 3]));
        assert_eq!(saved["defaultStateGroup"], json!("default"));
    }

    #[test]
    fn merge_of_non_object_yields_defaults() {
        assert_eq!(Settings::merge_over_defaults(json!([1, 2])), Settings::default());
        assert_eq!(Settings::merge_over_defaults(Value::Null), Settings::default());
    }

    #[test]
    fn resolve_group_uses_default_when_absent() {
        let settings = Settings::default();
        assert_eq!(settings.resolve_group(None).unwrap().id(), "default");
        assert!(settings.resolve_group(Some("missing")).is_none());
    }

    #[tokio::test]
    async fn controller_publishes_after_persisting() {
        let mut controller = SettingsController::load(MemorySettingsStore::default())
            .await
            .unwrap();
        let mut handle = controller.subscribe();

        controller.add_group(two_state_group("review")).await.unwrap();

        assert!(handle.changed().await);
        assert!(handle.current().group("review").is_some());
        let saved = controller.store().document().unwrap();
        assert!(saved["stateGroups"]["review"].is_object());
    }

    #[tokio::test]
    async fn controller_snapshots_are_immutable() {
        let mut controller = SettingsController::load(MemorySettingsStore::default())
            .await
            .unwrap();
        let before = controller.snapshot();

        controller
            .add_state("default", TaskState::new("blocked", "Blocked", "#ef4444", 0))
            .await
            .unwrap();

        assert_eq!(before.group("default").unwrap().len(), 3);
        assert_eq!(controller.snapshot().group("default").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn controller_rejects_removing_last_state() {
        let mut controller = SettingsController::new(
            MemorySettingsStore::default(),
            Settings::default(),
        );
        controller.add_group(TaskStateGroup::new(
            "solo",
            "Solo",
            vec![TaskState::new("only", "Only", "#ffffff", 0)],
        )
        .unwrap())
        .await
        .unwrap();

        let err = controller.remove_state("solo", "only").await.unwrap_err();
        assert!(matches!(err, SettingsError::Model(ModelError::LastState { .. })));
        assert_eq!(controller.snapshot().group("solo").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn controller_rejects_removing_default_group() {
        let mut controller =
            SettingsController::new(MemorySettingsStore::default(), Settings::default());

        let err = controller.remove_group("default").await.unwrap_err();
        assert!(matches!(err, SettingsError::DefaultGroupRemoval(_)));
    }

    #[tokio::test]
    async fn controller_set_default_group_requires_existing_group() {
        let mut controller =
            SettingsController::new(MemorySettingsStore::default(), Settings::default());

        let err = controller.set_default_group("nope").await.unwrap_err();
        assert!(matches!(err, SettingsError::UnknownGroup(_)));

        controller.add_group(two_state_group("work")).await.unwrap();
        controller.set_default_group("work").await.unwrap();
        assert_eq!(controller.snapshot().default_state_group, "work");
    }

    #[tokio::test]
    async fn controller_replace_is_the_update_push() {
        let mut controller =
            SettingsController::new(MemorySettingsStore::default(), Settings::default());
        let handle = controller.subscribe();

        let mut next = Settings::default();
        next.theme = "dark".to_string();
        controller.replace(next).await.unwrap();

        assert_eq!(handle.current().theme, "dark");
    }

    #[test]
    fn fixed_handle_keeps_its_snapshot() {
        let handle = SettingsHandle::fixed(Settings::default());
        assert!(handle.current().group("default").is_some());
        assert!(handle.current().group("default").is_some());
    }

    #[test]
    fn settings_error_display() {
        let err = SettingsError::UnknownGroup("x".to_string());
        assert_eq!(err.to_string(), "unknown state group: x");

        let err = SettingsError::DefaultGroupRemoval("default".to_string());
        assert_eq!(
            err.to_string(),
            "cannot remove 'default': it is the default state group"
        );
    }
}
