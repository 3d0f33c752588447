//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// A type-erased record value travelling between steps
pub type AnyValue = Box<dyn Any + Send>;

/// State of a single record within a batch run
///
/// Slots are replaced rather than edited: a step either moves the record
/// on with a new value or marks it aborted. Aborted slots stay in place so
/// indices remain stable across steps.
#[derive(Debug)]
pub enum WorkItem {
    /// The record is waiting for its next step
    Active(AnyValue),
    /// The record's value has been handed to a running step invocation
    InFlight,
    /// A step aborted the record; no later step will see it
    Aborted,
}

impl WorkItem {
    pub fn active(value: AnyValue) -> Self {
        WorkItem::Active(value)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, WorkItem::Aborted)
    }

    /// Move the value out for a step invocation, leaving the slot in flight
    pub fn take(&mut self) -> Option<AnyValue> {
        match std::mem::replace(self, WorkItem::InFlight) {
            WorkItem::Active(value) => Some(value),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Replace the slot after a step reported abort
    pub fn abort(&mut self) {
        *self = WorkItem::Aborted;
    }

    /// Replace the slot with the value produced by a step
    pub fn continue_with(&mut self, value: AnyValue) {
        *self = WorkItem::Active(value);
    }

    /// Move the final value out once the batch is complete
    pub fn into_value(self) -> Option<AnyValue> {
        match self {
            WorkItem::Active(value) => Some(value),
            _ => None,
        }
    }
}

/// Count records that have not been aborted
pub fn count_active(items: &[WorkItem]) -> usize {
    items.iter().filter(|item| !item.is_aborted()).count()
}

/// Summary of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Pipeline name used for instrumentation
    pub pipeline_name: String,

    /// Number of records in the batch
    pub records: usize,

    /// Records that passed every step
    pub completed: usize,

    /// Records aborted by some step
    pub aborted: usize,

    /// Steps that were opened (steps after everything aborted are skipped)
    pub steps_attempted: usize,

    /// Total steps in the pipeline
    pub total_steps: usize,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl BatchSummary {
    /// Summary for a batch with no records
    pub fn empty(pipeline_name: &str, total_steps: usize) -> Self {
        let now = Utc::now();
        Self {
            pipeline_name: pipeline_name.to_string(),
            records: 0,
            completed: 0,
            aborted: 0,
            steps_attempted: 0,
            total_steps,
            started_at: now,
            completed_at: now,
        }
    }

    /// Fraction of pipeline steps that ran (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 1.0;
        }
        self.steps_attempted as f64 / self.total_steps as f64
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at.signed_duration_since(self.started_at)
    }
}
