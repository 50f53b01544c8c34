//! State transitions.
//!
//! Advancing is a pure function of the group and the current state id. A
//! state id the group does not know is treated as sitting at index 0, so an
//! unknown state advances to the group's second state (or stays on the only
//! state of a one-state group).

use crate::model::{TaskState, TaskStateGroup};

/// Returns the state that follows `current_state_id` in `group`'s cycle,
/// wrapping from the last state back to the first.
#[must_use]
pub fn advance<'g>(group: &'g TaskStateGroup, current_state_id: &str) -> &'g TaskState {
    let states = group.states();
    let current = group.position(current_state_id).unwrap_or(0);
    &states[(current + 1) % states.len()]
}
