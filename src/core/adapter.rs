//! Type-erased step wrapper
//!
//! The builder checks at compile time that each step's input type matches
//! the previous step's output type. Once built, a pipeline only needs a
//! uniform way to call its steps, so every step is wrapped in a
//! [`StepAdapter`] that moves boxed values in and out.

use crate::core::{
    context::PipelineContext,
    error::PipelineError,
    outcome::StepOutcome,
    state::AnyValue,
    step::{BatchStep, PipelineStep},
};
use futures::future::{BoxFuture, FutureExt};
use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type SingleInvoker = Arc<
    dyn Fn(
            AnyValue,
            PipelineContext,
            CancellationToken,
        ) -> BoxFuture<'static, Result<StepOutcome<AnyValue>, PipelineError>>
        + Send
        + Sync,
>;

type BatchInvoker = Arc<
    dyn Fn(
            Vec<AnyValue>,
            PipelineContext,
            CancellationToken,
        ) -> BoxFuture<'static, Result<Vec<StepOutcome<AnyValue>>, PipelineError>>
        + Send
        + Sync,
>;

/// A step with its concrete input and output types erased
#[derive(Clone)]
pub struct StepAdapter {
    name: Arc<str>,
    single: SingleInvoker,
    batch: Option<BatchInvoker>,
}

impl StepAdapter {
    /// Wrap a per-record step
    pub(crate) fn from_step<S, In, Out>(step: S) -> Self
    where
        S: PipelineStep<In, Out> + 'static,
        In: Send + 'static,
        Out: Send + 'static,
    {
        let name: Arc<str> = Arc::from(short_type_name::<S>());
        let step = Arc::new(step);

        Self {
            single: single_invoker::<S, In, Out>(step, Arc::clone(&name)),
            batch: None,
            name,
        }
    }

    /// Wrap a step that also supports whole-batch invocation
    pub(crate) fn from_batch_step<S, In, Out>(step: S) -> Self
    where
        S: BatchStep<In, Out> + 'static,
        In: Send + 'static,
        Out: Send + 'static,
    {
        let name: Arc<str> = Arc::from(short_type_name::<S>());
        let step = Arc::new(step);

        Self {
            single: single_invoker::<S, In, Out>(Arc::clone(&step), Arc::clone(&name)),
            batch: Some(batch_invoker::<S, In, Out>(step, Arc::clone(&name))),
            name,
        }
    }

    /// Display name used for instrumentation
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_batch_aware(&self) -> bool {
        self.batch.is_some()
    }

    /// Run the step for one record
    pub fn invoke_single(
        &self,
        value: AnyValue,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> BoxFuture<'static, Result<StepOutcome<AnyValue>, PipelineError>> {
        (self.single)(value, context.clone(), cancel.clone())
    }

    /// Run the step once over a list of records
    pub fn invoke_batch(
        &self,
        values: Vec<AnyValue>,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> BoxFuture<'static, Result<Vec<StepOutcome<AnyValue>>, PipelineError>> {
        match &self.batch {
            Some(batch) => batch(values, context.clone(), cancel.clone()),
            None => {
                let step = self.name.to_string();
                async move { Err(PipelineError::NotBatchAware(step)) }.boxed()
            }
        }
    }
}

impl fmt::Debug for StepAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepAdapter")
            .field("name", &self.name)
            .field("batch_aware", &self.is_batch_aware())
            .finish()
    }
}

fn single_invoker<S, In, Out>(step: Arc<S>, name: Arc<str>) -> SingleInvoker
where
    S: PipelineStep<In, Out> + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    Arc::new(move |value, context, cancel| {
        let step = Arc::clone(&step);
        let name = Arc::clone(&name);
        async move {
            let input = recover::<In>(value, &name)?;
            let outcome = step
                .invoke(input, &context, &cancel)
                .await
                .map_err(|e| wrap_step_error(&name, e))?;
            Ok(erase(outcome))
        }
        .boxed()
    })
}

fn batch_invoker<S, In, Out>(step: Arc<S>, name: Arc<str>) -> BatchInvoker
where
    S: BatchStep<In, Out> + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    Arc::new(move |values, context, cancel| {
        let step = Arc::clone(&step);
        let name = Arc::clone(&name);
        async move {
            let inputs = values
                .into_iter()
                .map(|value| recover::<In>(value, &name))
                .collect::<Result<Vec<_>, _>>()?;
            let outcomes = step
                .invoke_batch(inputs, &context, &cancel)
                .await
                .map_err(|e| wrap_step_error(&name, e))?;
            Ok(outcomes.into_iter().map(erase).collect())
        }
        .boxed()
    })
}

/// Recover the concrete type of a boxed record
///
/// Builder chaining guarantees the types line up, so a failure here means
/// the adapter was fed a value from outside the builder.
pub(crate) fn recover<T: 'static>(value: AnyValue, step: &str) -> Result<T, PipelineError> {
    value
        .downcast::<T>()
        .map(|typed| *typed)
        .map_err(|_| PipelineError::TypeMismatch {
            step: step.to_string(),
            expected: type_name::<T>(),
        })
}

fn erase<T: Send + 'static>(outcome: StepOutcome<T>) -> StepOutcome<AnyValue> {
    outcome.map(|value| Box::new(value) as AnyValue)
}

// A step that observed the token and bailed with `Cancelled` is reported as
// a cancellation, not as a step failure.
fn wrap_step_error(step: &str, error: anyhow::Error) -> PipelineError {
    match error.downcast::<PipelineError>() {
        Ok(PipelineError::Cancelled) => PipelineError::Cancelled,
        Ok(other) => PipelineError::step_failed(step, other.into()),
        Err(error) => PipelineError::step_failed(step, error),
    }
}

/// Type name without module path or generic arguments
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
