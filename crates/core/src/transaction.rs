//! Transaction participation: single-slot undo of id-index state.

use serde::{Deserialize, Serialize};

/// Saved id-index state of an aggregate.
///
/// Only ids round-trip; entity objects handle their own rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot<Id> {
    pub full_ids: Vec<Id>,
    pub loaded_ids: Vec<Id>,
}

/// An object an external transaction coordinator can roll back.
pub trait Restorable {
    type State;

    /// Key under which a coordinator tracks (and locks) this object.
    fn object_identifier(&self) -> String;

    /// State captured before the most recent mutation, if any.
    fn object_state(&self) -> Option<Self::State>;

    /// Overwrite the current state with a previously captured one.
    fn restore_object_state(&mut self, state: Self::State);
}
