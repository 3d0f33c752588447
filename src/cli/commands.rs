//! CLI command definitions

use crate::core::ExecutionOptions;
use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub config: String,

    /// Path to a JSON file holding an array of records
    #[arg(short, long)]
    pub input: String,

    /// Process records one at a time, in order
    #[arg(long)]
    pub sequential: bool,

    /// Override the configured parallelism; without --sequential this runs in parallel
    #[arg(long, value_parser = parse_parallelism)]
    pub max_parallelism: Option<usize>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    /// Apply the command-line overrides to the configured options
    ///
    /// An explicit `--max-parallelism` asks for parallel dispatch, so it clears a
    /// configured `sequential` unless `--sequential` is also given.
    pub fn execution_options(&self, configured: ExecutionOptions) -> ExecutionOptions {
        let mut options = configured;
        if let Some(max_parallelism) = self.max_parallelism {
            options = options
                .with_max_parallelism(max_parallelism)
                .with_sequential(false);
        }
        if self.sequential {
            options = options.with_sequential(true);
        }
        options
    }
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub config: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse a parallelism limit of at least one
pub fn parse_parallelism(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("max parallelism must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("Invalid parallelism: {}", s)),
    }
}
