//! Step capability contracts

use crate::core::{context::PipelineContext, outcome::StepOutcome};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A step that processes one record at a time
///
/// Returning `StepOutcome::Abort` drops the record from the rest of the
/// pipeline without affecting other records of the batch. Returning an
/// error fails the whole batch.
#[async_trait]
pub trait PipelineStep<In, Out>: Send + Sync
where
    In: Send + 'static,
    Out: Send + 'static,
{
    async fn invoke(
        &self,
        input: In,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<Out>>;
}

/// A step that can also process every active record of a batch in one call
///
/// The returned outcomes must line up with `inputs`: one outcome per input,
/// in the same order. Register these steps with
/// [`PipelineBuilder::use_batch_step`](crate::core::PipelineBuilder::use_batch_step)
/// so the executor dispatches them as a whole batch.
#[async_trait]
pub trait BatchStep<In, Out>: PipelineStep<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    async fn invoke_batch(
        &self,
        inputs: Vec<In>,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<StepOutcome<Out>>>;
}
