//! Single-assignment result slots.

use std::sync::{Mutex, PoisonError};

use crate::error::ExportError;

/// State of one slot. Leaves `Pending` exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState<T> {
    Pending,
    Resolved(T),
    Failed(ExportError),
}

impl<T> SlotState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, SlotState::Pending)
    }
}

/// A write-once container; the first completion wins and later attempts
/// are ignored.
#[derive(Debug)]
pub struct Slot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
        }
    }
}

impl<T: Clone> Slot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve with `value`. Returns `false` if the slot was already done.
    pub fn complete(&self, value: T) -> bool {
        self.transition(|| SlotState::Resolved(value))
    }

    /// Fail with `error`. Returns `false` if the slot was already done.
    pub fn fail(&self, error: ExportError) -> bool {
        self.transition(|| SlotState::Failed(error))
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_pending()
    }

    pub fn state(&self) -> SlotState<T> {
        self.lock().clone()
    }

    fn transition(&self, next: impl FnOnce() -> SlotState<T>) -> bool {
        let mut state = self.lock();
        if !state.is_pending() {
            return false;
        }
        *state = next();
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState<T>> {
        // A poisoned slot still holds a consistent state value.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
