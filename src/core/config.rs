//! Execution options and pipeline configuration from YAML

use crate::core::{builder::PipelineBuilder, error::PipelineError, pipeline::Pipeline};
use crate::steps::{Collect, Filter, Number, RemoveField, Require, SetField};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// How a batch is dispatched to steps that are not whole-batch aware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Force one-record-at-a-time dispatch in index order
    pub sequential: bool,

    /// Upper bound on concurrently running per-record invocations
    pub max_parallelism: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            sequential: false,
            max_parallelism: 1,
        }
    }
}

impl ExecutionOptions {
    /// Strictly ordered dispatch
    pub fn sequential() -> Self {
        Self {
            sequential: true,
            max_parallelism: 1,
        }
    }

    /// Bounded-parallel dispatch with up to `max_parallelism` records in flight
    pub fn parallel(max_parallelism: usize) -> Self {
        Self {
            sequential: false,
            max_parallelism,
        }
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_parallelism == 0 {
            return Err(PipelineError::InvalidParallelism(self.max_parallelism));
        }
        Ok(())
    }
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, used to label instrumentation
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Batch dispatch options
    #[serde(default)]
    pub execution: ExecutionOptions,

    /// Steps in execution order
    pub steps: Vec<StepConfig>,
}

/// A built-in record step as declared in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepConfig {
    /// Abort records where the field is missing or null
    Require { field: String },

    /// Abort records unless the field equals the given value
    Filter { field: String, equals: Value },

    /// Set a field to a constant
    Set { field: String, value: Value },

    /// Remove a field
    Remove { field: String },

    /// Assign consecutive numbers to the records still active
    Number {
        field: String,
        #[serde(default)]
        start: i64,
    },

    /// Append records to a list in the context
    Collect { key: String },
}

impl StepConfig {
    /// Short label for listings
    pub fn label(&self) -> String {
        match self {
            StepConfig::Require { field } => format!("require {}", field),
            StepConfig::Filter { field, equals } => format!("filter {} == {}", field, equals),
            StepConfig::Set { field, value } => format!("set {} = {}", field, value),
            StepConfig::Remove { field } => format!("remove {}", field),
            StepConfig::Number { field, start } => format!("number {} from {}", field, start),
            StepConfig::Collect { key } => format!("collect into '{}'", key),
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Pipeline name must not be empty");
        }

        self.execution.validate()?;

        let mut seen_keys = HashSet::new();
        for step in &self.steps {
            match step {
                StepConfig::Collect { key } => {
                    if key.trim().is_empty() {
                        anyhow::bail!("Collect step requires a non-empty key");
                    }
                    if !seen_keys.insert(key) {
                        anyhow::bail!("Duplicate collect key: {}", key);
                    }
                }
                StepConfig::Require { field }
                | StepConfig::Filter { field, .. }
                | StepConfig::Set { field, .. }
                | StepConfig::Remove { field }
                | StepConfig::Number { field, .. } => {
                    if field.trim().is_empty() {
                        anyhow::bail!("Step '{}' requires a non-empty field", step.label());
                    }
                }
            }
        }

        Ok(())
    }

    /// Context keys written by `collect` steps, in step order
    pub fn collect_keys(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                StepConfig::Collect { key } => Some(key.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Build the configured steps into a pipeline over JSON records
    pub fn to_pipeline(&self) -> Pipeline<Value, Value> {
        let mut builder = PipelineBuilder::<Value>::start();

        for step in &self.steps {
            builder = match step {
                StepConfig::Require { field } => builder.use_step(Require::new(field)),
                StepConfig::Filter { field, equals } => {
                    builder.use_step(Filter::new(field, equals.clone()))
                }
                StepConfig::Set { field, value } => {
                    builder.use_step(SetField::new(field, value.clone()))
                }
                StepConfig::Remove { field } => builder.use_step(RemoveField::new(field)),
                StepConfig::Number { field, start } => {
                    builder.use_batch_step(Number::new(field, *start))
                }
                StepConfig::Collect { key } => builder.use_step(Collect::new(key)),
            };
        }

        builder.build()
    }
}
