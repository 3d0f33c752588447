//! batch-pipeline - type-checked step pipelines with batch execution

pub mod cli;
pub mod core;
pub mod execution;
pub mod instrumentation;
pub mod steps;

// Re-export commonly used types
pub use core::{
    BatchStep, BatchSummary, ExecutionOptions, Pipeline, PipelineBuilder, PipelineContext,
    PipelineError, PipelineStep, ProcessingPipeline, StepOutcome,
};
pub use execution::{BatchExecutor, DispatchStrategy};
pub use instrumentation::{BatchScope, NoopMetrics, PipelineMetrics, StepScope, TracingMetrics};
