//! Instrumentation backend that reports through `tracing`

use super::{BatchScope, PipelineMetrics, StepScope};
use crate::core::PipelineError;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Logs batch and step lifecycles as structured `tracing` events
///
/// Every batch gets a fresh `batch_id` so the events of concurrent runs of
/// the same pipeline can be told apart.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl TracingMetrics {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineMetrics for TracingMetrics {
    fn track_batch(
        &self,
        pipeline_name: &str,
        record_count: usize,
        is_sequential: bool,
        max_parallelism: usize,
    ) -> Box<dyn BatchScope> {
        let batch_id = Uuid::new_v4();
        info!(
            %batch_id,
            pipeline = pipeline_name,
            records = record_count,
            sequential = is_sequential,
            max_parallelism,
            "Batch started"
        );

        Box::new(TracingBatchScope {
            batch_id,
            pipeline: pipeline_name.to_string(),
            started: Instant::now(),
            steps: 0,
            failed: false,
        })
    }
}

struct TracingBatchScope {
    batch_id: Uuid,
    pipeline: String,
    started: Instant,
    steps: usize,
    failed: bool,
}

impl BatchScope for TracingBatchScope {
    fn track_step(
        &mut self,
        step_name: &str,
        active_count: usize,
        is_batch_aware: bool,
    ) -> Box<dyn StepScope> {
        self.steps += 1;
        debug!(
            batch_id = %self.batch_id,
            step = step_name,
            active = active_count,
            batch_aware = is_batch_aware,
            "Step started"
        );

        Box::new(TracingStepScope {
            batch_id: self.batch_id,
            step: step_name.to_string(),
            started: Instant::now(),
            aborted: None,
            failed: false,
        })
    }

    fn mark_failed(&mut self, err: &PipelineError) {
        self.failed = true;
        if err.is_cancelled() {
            warn!(batch_id = %self.batch_id, pipeline = %self.pipeline, "Batch cancelled");
        } else {
            error!(batch_id = %self.batch_id, pipeline = %self.pipeline, error = %err, "Batch failed");
        }
    }
}

impl Drop for TracingBatchScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        if self.failed {
            info!(
                batch_id = %self.batch_id,
                pipeline = %self.pipeline,
                steps = self.steps,
                elapsed_ms,
                "Batch closed after failure"
            );
        } else {
            info!(
                batch_id = %self.batch_id,
                pipeline = %self.pipeline,
                steps = self.steps,
                elapsed_ms,
                "Batch finished"
            );
        }
    }
}

struct TracingStepScope {
    batch_id: Uuid,
    step: String,
    started: Instant,
    aborted: Option<usize>,
    failed: bool,
}

impl StepScope for TracingStepScope {
    fn record_outcome(&mut self, aborted_count: usize) {
        self.aborted = Some(aborted_count);
    }

    fn mark_failed(&mut self, err: &PipelineError) {
        self.failed = true;
        if !err.is_cancelled() {
            error!(batch_id = %self.batch_id, step = %self.step, error = %err, "Step failed");
        }
    }
}

impl Drop for TracingStepScope {
    fn drop(&mut self) {
        debug!(
            batch_id = %self.batch_id,
            step = %self.step,
            aborted = self.aborted.unwrap_or(0),
            failed = self.failed,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Step finished"
        );
    }
}
