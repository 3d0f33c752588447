//! Error types for pipeline construction and batch execution

use thiserror::Error;

/// Errors raised by pipelines, the batch executor and the shared context
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `max_parallelism` must be at least one
    #[error("max_parallelism must be greater than zero (got {0})")]
    InvalidParallelism(usize),

    /// The pipeline does not expose builder-produced stages
    #[error("pipeline instance was not created via the pipeline builder")]
    UnbuiltPipeline,

    /// A whole-batch step returned the wrong number of outcomes
    #[error("batch step '{step}' returned {actual} outcomes for {expected} inputs")]
    BatchOutcomeMismatch {
        step: String,
        expected: usize,
        actual: usize,
    },

    /// A whole-batch invocation was requested from a per-record step
    #[error("step '{0}' does not support whole-batch invocation")]
    NotBatchAware(String),

    /// A record reached a step with a value of the wrong type
    #[error("step '{step}' received a value that is not a {expected}")]
    TypeMismatch {
        step: String,
        expected: &'static str,
    },

    /// A step invocation returned an error
    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    /// A step invocation panicked inside a parallel task
    #[error("step '{step}' panicked: {message}")]
    StepPanicked { step: String, message: String },

    /// The cancellation token was triggered
    #[error("pipeline execution was cancelled")]
    Cancelled,

    #[error("context value '{0}' was not found")]
    ContextKeyNotFound(String),

    #[error("context value '{key}' is not a {expected}")]
    ContextTypeMismatch { key: String, expected: &'static str },
}

impl PipelineError {
    /// Wrap a step failure with the name of the step that raised it
    pub fn step_failed(step: impl Into<String>, source: anyhow::Error) -> Self {
        PipelineError::StepFailed {
            step: step.into(),
            source,
        }
    }

    /// True for errors that indicate a programming mistake rather than a runtime condition
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidParallelism(_)
                | PipelineError::UnbuiltPipeline
                | PipelineError::BatchOutcomeMismatch { .. }
                | PipelineError::NotBatchAware(_)
                | PipelineError::TypeMismatch { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// The underlying step error, if this is a step failure
    pub fn step_source(&self) -> Option<&anyhow::Error> {
        match self {
            PipelineError::StepFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
