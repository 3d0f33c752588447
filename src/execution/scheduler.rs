//! Dispatch strategy selection - decides how a step sees the active records

use crate::core::{ExecutionOptions, StepAdapter};
use std::fmt;

/// How one step is invoked over the active records of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// One call with every active record
    WholeBatch,

    /// One call per active record, in index order
    Sequential,

    /// One call per active record, at most N in flight
    BoundedParallel(usize),
}

impl DispatchStrategy {
    /// Pick the strategy for a step
    ///
    /// Whole-batch capability wins over the execution options; otherwise
    /// `sequential` or a parallelism of one gives ordered dispatch.
    pub fn select(stage: &StepAdapter, options: &ExecutionOptions) -> Self {
        if stage.is_batch_aware() {
            DispatchStrategy::WholeBatch
        } else if options.sequential || options.max_parallelism == 1 {
            DispatchStrategy::Sequential
        } else {
            DispatchStrategy::BoundedParallel(options.max_parallelism)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DispatchStrategy::WholeBatch => "whole-batch",
            DispatchStrategy::Sequential => "sequential",
            DispatchStrategy::BoundedParallel(_) => "bounded-parallel",
        }
    }
}

impl fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStrategy::BoundedParallel(limit) => write!(f, "{} ({})", self.label(), limit),
            other => f.write_str(other.label()),
        }
    }
}
