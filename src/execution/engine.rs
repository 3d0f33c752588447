//! Batch execution engine - runs a built pipeline over a batch of records

use crate::{
    core::{
        count_active, BatchSummary, ExecutionOptions, PipelineContext, PipelineError,
        ProcessingPipeline, StepAdapter, WorkItem,
    },
    execution::{DispatchStrategy, StepExecutor},
    instrumentation::{BatchScope, NoopMetrics, PipelineMetrics},
};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_PIPELINE_NAME: &str = "pipeline";

/// Runs pipelines over batches of records, step by step
///
/// Every step sees all records that are still active before the next step
/// starts. A record that aborts is skipped by every later step; the rest of
/// the batch carries on.
#[derive(Clone)]
pub struct BatchExecutor {
    pipeline_name: String,
    metrics: Arc<dyn PipelineMetrics>,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchExecutor {
    /// Executor named "pipeline" that records no metrics
    pub fn new() -> Self {
        Self {
            pipeline_name: DEFAULT_PIPELINE_NAME.to_string(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Set the name reported to instrumentation; blank names fall back to "pipeline"
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.pipeline_name = if name.trim().is_empty() {
            DEFAULT_PIPELINE_NAME.to_string()
        } else {
            name
        };
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// Run every record of `items` through `pipeline`
    ///
    /// An empty batch succeeds without touching the pipeline or the
    /// instrumentation. Otherwise the options are validated and the
    /// pipeline must come from [`PipelineBuilder`](crate::core::PipelineBuilder).
    ///
    /// The first step failure stops the batch and is returned; values are
    /// not returned, steps publish results through `context`.
    pub async fn process_batch<In, Out, P>(
        &self,
        items: Vec<In>,
        pipeline: &P,
        context: &PipelineContext,
        options: &ExecutionOptions,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, PipelineError>
    where
        In: Send + 'static,
        Out: Send + 'static,
        P: ProcessingPipeline<In, Out> + ?Sized,
    {
        if items.is_empty() {
            debug!(pipeline = %self.pipeline_name, "Empty batch, nothing to do");
            let total_steps = pipeline.stages().map_or(0, <[StepAdapter]>::len);
            return Ok(BatchSummary::empty(&self.pipeline_name, total_steps));
        }

        options.validate()?;
        let stages = pipeline.stages().ok_or(PipelineError::UnbuiltPipeline)?;

        let started_at = Utc::now();
        let mut work: Vec<WorkItem> = items
            .into_iter()
            .map(|item| WorkItem::active(Box::new(item)))
            .collect();

        info!(
            pipeline = %self.pipeline_name,
            records = work.len(),
            steps = stages.len(),
            "Processing batch"
        );

        let mut batch_scope = self.metrics.track_batch(
            &self.pipeline_name,
            work.len(),
            options.sequential,
            options.max_parallelism,
        );

        let result = run_steps(stages, &mut work, context, options, cancel, batch_scope.as_mut()).await;

        let steps_attempted = match result {
            Ok(steps_attempted) => steps_attempted,
            Err(err) => {
                if err.is_cancelled() {
                    warn!(pipeline = %self.pipeline_name, "Batch was cancelled");
                }
                batch_scope.mark_failed(&err);
                return Err(err);
            }
        };
        drop(batch_scope);

        let completed = count_active(&work);
        let summary = BatchSummary {
            pipeline_name: self.pipeline_name.clone(),
            records: work.len(),
            completed,
            aborted: work.len() - completed,
            steps_attempted,
            total_steps: stages.len(),
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            pipeline = %summary.pipeline_name,
            completed = summary.completed,
            aborted = summary.aborted,
            "Batch finished"
        );

        Ok(summary)
    }
}

// At most one step scope is open at a time; each one is closed before the
// next step starts or the error is returned.
async fn run_steps(
    stages: &[StepAdapter],
    work: &mut [WorkItem],
    context: &PipelineContext,
    options: &ExecutionOptions,
    cancel: &CancellationToken,
    batch_scope: &mut dyn BatchScope,
) -> Result<usize, PipelineError> {
    let mut steps_attempted = 0;

    for stage in stages {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let active_before = count_active(work);
        if active_before == 0 {
            debug!(step = stage.name(), "All records aborted, skipping remaining steps");
            break;
        }

        let strategy = DispatchStrategy::select(stage, options);
        debug!(
            step = stage.name(),
            active = active_before,
            strategy = %strategy,
            "Running step"
        );

        let aborted_before = work.len() - active_before;
        let mut step_scope = batch_scope.track_step(stage.name(), active_before, stage.is_batch_aware());
        steps_attempted += 1;

        let result = StepExecutor::new(stage, context, cancel)
            .execute(strategy, work)
            .await;

        if let Err(err) = &result {
            step_scope.mark_failed(err);
        }

        let aborted_after = work.len() - count_active(work);
        step_scope.record_outcome(aborted_after.saturating_sub(aborted_before));
        drop(step_scope);

        result?;
    }

    Ok(steps_attempted)
}
