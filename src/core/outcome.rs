//! Step outcomes

use serde::{Deserialize, Serialize};

/// The decision returned by a step for one record
///
/// `Continue` carries the value handed to the next step. `Abort` carries
/// nothing and removes the record from every later step of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepOutcome<T> {
    Continue(T),
    Abort,
}

impl<T> StepOutcome<T> {
    pub fn is_abort(&self) -> bool {
        matches!(self, StepOutcome::Abort)
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, StepOutcome::Continue(_))
    }

    /// Borrow the continued value
    pub fn value(&self) -> Option<&T> {
        match self {
            StepOutcome::Continue(value) => Some(value),
            StepOutcome::Abort => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            StepOutcome::Continue(value) => Some(value),
            StepOutcome::Abort => None,
        }
    }

    /// Transform the continued value, leaving `Abort` untouched
    pub fn map<U, F>(self, f: F) -> StepOutcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            StepOutcome::Continue(value) => StepOutcome::Continue(f(value)),
            StepOutcome::Abort => StepOutcome::Abort,
        }
    }
}

impl<T> From<Option<T>> for StepOutcome<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => StepOutcome::Continue(value),
            None => StepOutcome::Abort,
        }
    }
}
