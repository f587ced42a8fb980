//! Save state and the guard that resets it.

use std::cell::Cell;
use std::fmt;

use crate::error::{StorageResult, TransactionError};

/// Phase of a save call.
///
/// Within one call the state only moves forward. Every top-level save starts
/// and ends in [`SaveState::None`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SaveState {
    /// No save in progress.
    #[default]
    None,
    /// Running `before_validate` and `validate`.
    Validate,
    /// Running before-save hooks.
    BeforeSave,
    /// Writing models.
    Save,
    /// Running after-save hooks.
    AfterSave,
}

impl SaveState {
    /// Returns whether `next` comes strictly after this state.
    pub fn can_advance_to(self, next: SaveState) -> bool {
        next > self
    }

    /// Moves `cell` to `next`, refusing to go backwards.
    pub(crate) fn advance(cell: &Cell<SaveState>, next: SaveState) -> StorageResult<()> {
        let current = cell.get();
        if !current.can_advance_to(next) {
            return Err(TransactionError::InvalidStateTransition {
                from: current.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        tracing::trace!(from = %current, to = %next, "save state transition");
        cell.set(next);
        Ok(())
    }
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveState::None => write!(f, "none"),
            SaveState::Validate => write!(f, "validate"),
            SaveState::BeforeSave => write!(f, "before-save"),
            SaveState::Save => write!(f, "save"),
            SaveState::AfterSave => write!(f, "after-save"),
        }
    }
}

/// Puts the state back to what it was when the guard was created.
///
/// Entering resets the state to [`SaveState::None`] so a nested save starts
/// its own sequence; dropping restores the outer state, on success, error or
/// unwind alike.
pub(crate) struct StateGuard<'a> {
    cell: &'a Cell<SaveState>,
    previous: SaveState,
}

impl<'a> StateGuard<'a> {
    pub(crate) fn enter(cell: &'a Cell<SaveState>) -> Self {
        let previous = cell.replace(SaveState::None);
        Self { cell, previous }
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        tracing::trace!(to = %self.previous, "save state restored");
        self.cell.set(self.previous);
    }
}
