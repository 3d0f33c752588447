//! Step executor - runs one step over the work items of a batch

use crate::{
    core::{AnyValue, PipelineContext, PipelineError, StepAdapter, StepOutcome, WorkItem},
    execution::DispatchStrategy,
};
use std::any::Any;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs a single step over the active records of a batch
///
/// Every routine writes an outcome only into the slot of the record it was
/// produced for, so indices stay stable and aborted slots are never handed
/// to the step.
pub struct StepExecutor<'a> {
    stage: &'a StepAdapter,
    context: &'a PipelineContext,
    cancel: &'a CancellationToken,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        stage: &'a StepAdapter,
        context: &'a PipelineContext,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            stage,
            context,
            cancel,
        }
    }

    /// Execute the step with the given strategy
    pub async fn execute(
        &self,
        strategy: DispatchStrategy,
        items: &mut [WorkItem],
    ) -> Result<(), PipelineError> {
        match strategy {
            DispatchStrategy::WholeBatch => self.run_whole_batch(items).await,
            DispatchStrategy::Sequential => self.run_sequential(items).await,
            DispatchStrategy::BoundedParallel(limit) => self.run_bounded_parallel(items, limit).await,
        }
    }

    async fn run_whole_batch(&self, items: &mut [WorkItem]) -> Result<(), PipelineError> {
        let mut indices = Vec::with_capacity(items.len());
        let mut values = Vec::with_capacity(items.len());
        for (index, item) in items.iter_mut().enumerate() {
            if let Some(value) = item.take() {
                indices.push(index);
                values.push(value);
            }
        }

        if indices.is_empty() {
            return Ok(());
        }

        debug!(step = self.stage.name(), records = indices.len(), "Invoking whole batch");
        let outcomes = self
            .stage
            .invoke_batch(values, self.context, self.cancel)
            .await?;

        // Nothing is applied unless every input got its outcome
        if outcomes.len() != indices.len() {
            return Err(PipelineError::BatchOutcomeMismatch {
                step: self.stage.name().to_string(),
                expected: indices.len(),
                actual: outcomes.len(),
            });
        }

        for (index, outcome) in indices.into_iter().zip(outcomes) {
            apply(&mut items[index], outcome);
        }

        Ok(())
    }

    async fn run_sequential(&self, items: &mut [WorkItem]) -> Result<(), PipelineError> {
        for item in items.iter_mut() {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let Some(value) = item.take() else {
                continue;
            };

            let outcome = self
                .stage
                .invoke_single(value, self.context, self.cancel)
                .await?;
            apply(item, outcome);
        }

        Ok(())
    }

    async fn run_bounded_parallel(
        &self,
        items: &mut [WorkItem],
        limit: usize,
    ) -> Result<(), PipelineError> {
        // tokio refuses gates wider than MAX_PERMITS
        let gate = Arc::new(Semaphore::new(limit.min(Semaphore::MAX_PERMITS)));
        let mut tasks = JoinSet::new();
        let mut cancelled = false;

        for index in 0..items.len() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            if items[index].is_aborted() {
                continue;
            }

            // The gate is never closed, so a failed acquire only happens on cancellation
            let admitted = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&gate).acquire_owned() => permit.ok(),
            };
            let Some(permit) = admitted else {
                cancelled = true;
                break;
            };

            let Some(value) = items[index].take() else {
                continue;
            };

            let invocation = self.stage.invoke_single(value, self.context, self.cancel);
            tasks.spawn(async move {
                let _permit = permit;
                (index, invocation.await)
            });
        }

        debug!(
            step = self.stage.name(),
            admitted = tasks.len(),
            limit,
            "Admitted parallel invocations"
        );

        // Admitted invocations always run to completion, even after a failure.
        // Tasks are joined in completion order, so the first failure kept is the
        // first one to finish.
        let mut failure: Option<PipelineError> = None;
        while let Some(joined) = tasks.join_next().await {
            let err = match joined {
                Ok((index, Ok(outcome))) => {
                    apply(&mut items[index], outcome);
                    continue;
                }
                Ok((_, Err(err))) => err,
                Err(join_error) => PipelineError::StepPanicked {
                    step: self.stage.name().to_string(),
                    message: panic_message(join_error),
                },
            };
            if failure.is_none() {
                failure = Some(err);
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        if cancelled {
            warn!(step = self.stage.name(), "Cancelled while admitting invocations");
            return Err(PipelineError::Cancelled);
        }

        Ok(())
    }
}

fn apply(item: &mut WorkItem, outcome: StepOutcome<AnyValue>) {
    match outcome {
        StepOutcome::Continue(value) => item.continue_with(value),
        StepOutcome::Abort => item.abort(),
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }

    let payload: Box<dyn Any + Send> = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
