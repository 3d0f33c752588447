//! Fluent, persistent pipeline builder

use crate::core::{
    adapter::StepAdapter,
    pipeline::Pipeline,
    step::{BatchStep, PipelineStep},
};
use std::marker::PhantomData;
use std::sync::Arc;

// Append-only list shared between builders. Each builder only points at its
// own tail, so extending one never changes what an earlier builder holds.
struct StageNode {
    adapter: StepAdapter,
    previous: Option<Arc<StageNode>>,
    depth: usize,
}

/// Builds a [`Pipeline`] one step at a time
///
/// `In` is the pipeline input type and `Current` the output type of the
/// last step added so far. Each `use_*` call returns a new builder and
/// leaves `self` usable, so a common prefix can be branched into several
/// pipelines.
///
/// ```ignore
/// let pipeline = PipelineBuilder::<i64>::start()
///     .use_step(AbortIfNegative)
///     .use_batch_step(Normalize)
///     .build();
/// ```
pub struct PipelineBuilder<In, Current = In> {
    tail: Option<Arc<StageNode>>,
    _types: PhantomData<fn(In) -> Current>,
}

impl<T> PipelineBuilder<T, T>
where
    T: Send + 'static,
{
    /// An empty builder; building it yields the identity pipeline
    pub fn start() -> Self {
        Self {
            tail: None,
            _types: PhantomData,
        }
    }
}

impl<In, Current> PipelineBuilder<In, Current>
where
    In: Send + 'static,
    Current: Send + 'static,
{
    /// Append a per-record step
    pub fn use_step<S, Next>(&self, step: S) -> PipelineBuilder<In, Next>
    where
        S: PipelineStep<Current, Next> + 'static,
        Next: Send + 'static,
    {
        self.push(StepAdapter::from_step::<S, Current, Next>(step))
    }

    /// Append a step that the batch executor invokes once per batch
    pub fn use_batch_step<S, Next>(&self, step: S) -> PipelineBuilder<In, Next>
    where
        S: BatchStep<Current, Next> + 'static,
        Next: Send + 'static,
    {
        self.push(StepAdapter::from_batch_step::<S, Current, Next>(step))
    }

    /// Number of steps added so far
    pub fn len(&self) -> usize {
        self.tail.as_ref().map_or(0, |node| node.depth)
    }

    pub fn is_empty(&self) -> bool {
        self.tail.is_none()
    }

    /// Freeze the steps into an immutable pipeline
    pub fn build(&self) -> Pipeline<In, Current> {
        let mut stages = Vec::with_capacity(self.len());
        let mut cursor = self.tail.as_deref();
        while let Some(node) = cursor {
            stages.push(node.adapter.clone());
            cursor = node.previous.as_deref();
        }
        stages.reverse();

        Pipeline::from_stages(stages)
    }

    fn push<Next>(&self, adapter: StepAdapter) -> PipelineBuilder<In, Next> {
        let node = StageNode {
            adapter,
            previous: self.tail.clone(),
            depth: self.len() + 1,
        };

        PipelineBuilder {
            tail: Some(Arc::new(node)),
            _types: PhantomData,
        }
    }
}

impl<In, Current> Clone for PipelineBuilder<In, Current> {
    fn clone(&self) -> Self {
        Self {
            tail: self.tail.clone(),
            _types: PhantomData,
        }
    }
}
