//! Task states and the state groups buttons cycle through.
//!
//! A [`TaskStateGroup`] owns an ordered list of [`TaskState`]s. The order of
//! that list is the cycling order, and each state's `order` field always
//! equals its position: every mutation re-sequences the list so the values
//! stay contiguous from zero.
//!
//! Groups can never be empty and never hold two states with the same id.
//! Group and state ids must be writable into a button token. These rules are
//! enforced at construction (including deserialization) and on every
//! mutation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::is_valid_field;

/// Errors raised when a state group mutation would break an invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A group was built without any states.
    #[error("state group '{0}' must contain at least one state")]
    EmptyGroup(String),

    /// Removing the state would leave the group empty.
    #[error("cannot remove '{state_id}': it is the last state in group '{group_id}'")]
    LastState { group_id: String, state_id: String },

    /// Two states in one group share an id.
    #[error("duplicate state id '{state_id}' in group '{group_id}'")]
    DuplicateStateId { group_id: String, state_id: String },

    /// The referenced state does not exist in the group.
    #[error("state '{state_id}' not found in group '{group_id}'")]
    UnknownState { group_id: String, state_id: String },

    /// A group or state id is blank.
    #[error("identifier cannot be empty")]
    EmptyId,

    /// A group or state id contains whitespace or a token delimiter
    /// (`:`, `;`, `=`, `{`, `}`) and could not be written into a token.
    #[error("identifier '{0}' cannot be used in a button token")]
    InvalidId(String),
}

/// One named, coloured position within a state group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    /// Identifier written into button tokens. Unique within its group.
    pub id: String,

    /// Label shown on the rendered control.
    pub name: String,

    /// Background colour as a hex RGB string (e.g. `#27ae60`).
    pub color: String,

    /// Cycle position. Kept equal to the state's index by the owning group.
    #[serde(default)]
    pub order: u32,
}

impl TaskState {
    /// Creates a new state.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        color: impl Into<String>,
        order: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            order,
        }
    }
}

/// Serialized shape of a group, validated into a [`TaskStateGroup`].
#[derive(Debug, Deserialize)]
struct RawStateGroup {
    id: String,
    name: String,
    #[serde(default)]
    states: Vec<TaskState>,
}

/// A named, ordered set of states a button cycles through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStateGroup")]
pub struct TaskStateGroup {
    id: String,
    name: String,
    states: Vec<TaskState>,
}

impl TryFrom<RawStateGroup> for TaskStateGroup {
    type Error = ModelError;

    fn try_from(raw: RawStateGroup) -> Result<Self, Self::Error> {
        Self::new(raw.id, raw.name, raw.states)
    }
}

impl TaskStateGroup {
    /// Builds a group, sorting states by their `order` field and then
    /// re-sequencing them so `order` matches position.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the group id or any state id is blank or
    /// not token-safe, if `states` is empty, or if two states share an id.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mut states: Vec<TaskState>,
    ) -> Result<Self, ModelError> {
        let id = id.into();
        check_id(&id)?;
        if states.is_empty() {
            return Err(ModelError::EmptyGroup(id));
        }

        let mut seen = HashSet::new();
        for state in &states {
            check_id(&state.id)?;
            if !seen.insert(state.id.as_str()) {
                return Err(ModelError::DuplicateStateId {
                    group_id: id,
                    state_id: state.id.clone(),
                });
            }
        }

        // Stable sort keeps authoring order for states with equal `order`.
        states.sort_by_key(|state| state.order);

        let mut group = Self {
            id,
            name: name.into(),
            states,
        };
        group.resequence();
        Ok(group)
    }

    /// Returns the group id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the states in cycling order.
    #[must_use]
    pub fn states(&self) -> &[TaskState] {
        &self.states
    }

    /// Number of states in the group. Always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always `false`; a group cannot be empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Returns the first state in cycling order.
    #[must_use]
    pub fn first_state(&self) -> &TaskState {
        &self.states[0]
    }

    /// Looks up a state by id.
    #[must_use]
    pub fn state(&self, state_id: &str) -> Option<&TaskState> {
        self.states.iter().find(|state| state.id == state_id)
    }

    /// Returns the cycle position of a state.
    #[must_use]
    pub fn position(&self, state_id: &str) -> Option<usize> {
        self.states.iter().position(|state| state.id == state_id)
    }

    /// Changes the display name.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Appends a state at the end of the cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateStateId`] if the id is already used,
    /// [`ModelError::EmptyId`] if it is blank and [`ModelError::InvalidId`]
    /// if it is not token-safe.
    pub fn add_state(&mut self, state: TaskState) -> Result<(), ModelError> {
        check_id(&state.id)?;
        if self.state(&state.id).is_some() {
            return Err(self.duplicate(&state.id));
        }
        self.states.push(state);
        self.resequence();
        Ok(())
    }

    /// Replaces the state `state_id` with `replacement`, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownState`] if `state_id` is not in the group,
    /// or [`ModelError::DuplicateStateId`] if the replacement renames the
    /// state to an id another state already uses. Blank or unsafe ids fail as
    /// in [`TaskStateGroup::add_state`].
    pub fn replace_state(
        &mut self,
        state_id: &str,
        replacement: TaskState,
    ) -> Result<(), ModelError> {
        let index = self
            .position(state_id)
            .ok_or_else(|| self.unknown(state_id))?;
        check_id(&replacement.id)?;
        if replacement.id != state_id && self.state(&replacement.id).is_some() {
            return Err(self.duplicate(&replacement.id));
        }
        self.states[index] = replacement;
        self.resequence();
        Ok(())
    }

    /// Removes a state and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::LastState`] when `state_id` is the only state
    /// left, or [`ModelError::UnknownState`] if it is not in the group.
    pub fn remove_state(&mut self, state_id: &str) -> Result<TaskState, ModelError> {
        let index = self
            .position(state_id)
            .ok_or_else(|| self.unknown(state_id))?;
        if self.states.len() == 1 {
            return Err(ModelError::LastState {
                group_id: self.id.clone(),
                state_id: state_id.to_string(),
            });
        }
        let removed = self.states.remove(index);
        self.resequence();
        Ok(removed)
    }

    /// Moves a state to `new_index`, clamped to the end of the list.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownState`] if `state_id` is not in the group.
    pub fn move_state(&mut self, state_id: &str, new_index: usize) -> Result<(), ModelError> {
        let index = self
            .position(state_id)
            .ok_or_else(|| self.unknown(state_id))?;
        let state = self.states.remove(index);
        let new_index = new_index.min(self.states.len());
        self.states.insert(new_index, state);
        self.resequence();
        Ok(())
    }

    fn resequence(&mut self) {
        for (index, state) in self.states.iter_mut().enumerate() {
            state.order = u32::try_from(index).unwrap_or(u32::MAX);
        }
    }

    fn unknown(&self, state_id: &str) -> ModelError {
        ModelError::UnknownState {
            group_id: self.id.clone(),
            state_id: state_id.to_string(),
        }
    }

    fn duplicate(&self, state_id: &str) -> ModelError {
        ModelError::DuplicateStateId {
            group_id: self.id.clone(),
            state_id: state_id.to_string(),
        }
    }
}

fn check_id(id: &str) -> Result<(), ModelError> {
    if id.trim().is_empty() {
        return Err(ModelError::EmptyId);
    }
    if !is_valid_field(id) {
        return Err(ModelError::InvalidId(id.to_string()));
    }
    Ok(())
}
