//! Core domain models for pipelines
//!
//! This module defines step contracts, the type-erased step adapter, the
//! builder and the frozen pipeline, plus the per-batch state they share.

pub mod adapter;
pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod outcome;
pub mod pipeline;
pub mod state;
pub mod step;

pub use adapter::StepAdapter;
pub use builder::PipelineBuilder;
pub use config::{ExecutionOptions, PipelineConfig, StepConfig};
pub use context::{ContextValue, PipelineContext};
pub use error::PipelineError;
pub use outcome::StepOutcome;
pub use pipeline::{Pipeline, ProcessingPipeline};
pub use state::{count_active, AnyValue, BatchSummary, WorkItem};
pub use step::{BatchStep, PipelineStep};
