//! Instrumentation port for batch execution
//!
//! The executor opens one [`BatchScope`] per `process_batch` call and one
//! [`StepScope`] per step it actually runs. Scopes are closed by dropping
//! them; the executor drops every scope it opens on every exit path,
//! including failure and cancellation.

mod tracing_metrics;

pub use tracing_metrics::TracingMetrics;

use crate::core::PipelineError;

/// Factory for batch-level scopes
pub trait PipelineMetrics: Send + Sync {
    fn track_batch(
        &self,
        pipeline_name: &str,
        record_count: usize,
        is_sequential: bool,
        max_parallelism: usize,
    ) -> Box<dyn BatchScope>;
}

/// Instrumentation for one batch run
pub trait BatchScope: Send {
    /// Open a scope for a step about to run over `active_count` records
    fn track_step(
        &mut self,
        step_name: &str,
        active_count: usize,
        is_batch_aware: bool,
    ) -> Box<dyn StepScope>;

    fn mark_failed(&mut self, error: &PipelineError);
}

/// Instrumentation for one step of a batch run
pub trait StepScope: Send {
    /// Number of records this step aborted
    fn record_outcome(&mut self, aborted_count: usize);

    fn mark_failed(&mut self, error: &PipelineError);
}

/// Instrumentation that records nothing; the executor default
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl PipelineMetrics for NoopMetrics {
    fn track_batch(&self, _: &str, _: usize, _: bool, _: usize) -> Box<dyn BatchScope> {
        Box::new(NoopMetrics)
    }
}

impl BatchScope for NoopMetrics {
    fn track_step(&mut self, _: &str, _: usize, _: bool) -> Box<dyn StepScope> {
        Box::new(NoopMetrics)
    }

    fn mark_failed(&mut self, _: &PipelineError) {}
}

impl StepScope for NoopMetrics {
    fn record_outcome(&mut self, _: usize) {}

    fn mark_failed(&mut self, _: &PipelineError) {}
}
