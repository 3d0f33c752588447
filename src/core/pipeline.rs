//! Pipeline domain model

use crate::core::{
    adapter::{recover, StepAdapter},
    context::PipelineContext,
    error::PipelineError,
    outcome::StepOutcome,
    state::AnyValue,
};
use async_trait::async_trait;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A composed pipeline that turns one `In` record into an `Out` outcome
#[async_trait]
pub trait ProcessingPipeline<In, Out>: Send + Sync
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Run one record through every step, stopping at the first abort
    async fn process(
        &self,
        input: In,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome<Out>, PipelineError>;

    /// The type-erased steps, available only for builder-produced pipelines
    ///
    /// The batch executor rejects pipelines that return `None` here.
    #[doc(hidden)]
    fn stages(&self) -> Option<&[StepAdapter]> {
        None
    }
}

/// An immutable, ordered sequence of steps produced by
/// [`PipelineBuilder`](crate::core::PipelineBuilder)
///
/// Holds no per-run state: one pipeline can process any number of records
/// and batches, concurrently. Cloning is cheap.
pub struct Pipeline<In, Out> {
    stages: Arc<[StepAdapter]>,
    _types: PhantomData<fn(In) -> Out>,
}

impl<In, Out> Pipeline<In, Out> {
    pub(crate) fn from_stages(stages: Vec<StepAdapter>) -> Self {
        Self {
            stages: stages.into(),
            _types: PhantomData,
        }
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Display names of the steps, in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.stages.iter().map(StepAdapter::name).collect()
    }

    pub fn steps(&self) -> &[StepAdapter] {
        &self.stages
    }
}

#[async_trait]
impl<In, Out> ProcessingPipeline<In, Out> for Pipeline<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    async fn process(
        &self,
        input: In,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome<Out>, PipelineError> {
        let mut current: AnyValue = Box::new(input);

        for stage in self.stages.iter() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            match stage.invoke_single(current, context, cancel).await? {
                StepOutcome::Continue(next) => current = next,
                StepOutcome::Abort => {
                    debug!(step = stage.name(), "Record aborted");
                    return Ok(StepOutcome::Abort);
                }
            }
        }

        recover::<Out>(current, "pipeline output").map(StepOutcome::Continue)
    }

    fn stages(&self) -> Option<&[StepAdapter]> {
        Some(&self.stages)
    }
}

impl<In, Out> Clone for Pipeline<In, Out> {
    fn clone(&self) -> Self {
        Self {
            stages: Arc::clone(&self.stages),
            _types: PhantomData,
        }
    }
}

impl<In, Out> fmt::Debug for Pipeline<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}
