use anyhow::{Context, Result};
use batch_pipeline::cli::commands::{RunCommand, ValidateCommand};
use batch_pipeline::cli::output::*;
use batch_pipeline::cli::{Cli, Command};
use batch_pipeline::core::{PipelineConfig, PipelineContext};
use batch_pipeline::instrumentation::{PipelineMetrics, TracingMetrics};
use batch_pipeline::steps::collected;
use batch_pipeline::BatchExecutor;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    let config = PipelineConfig::from_file(&cmd.config)
        .context("Failed to load pipeline config")?;
    let options = cmd.execution_options(config.execution);

    let input = std::fs::read_to_string(&cmd.input)
        .with_context(|| format!("Failed to read input file {}", cmd.input))?;
    let records: Vec<Value> = serde_json::from_str(&input)
        .context("Input must be a JSON array of records")?;

    let pipeline = config.to_pipeline();

    if !cmd.json {
        println!(
            "{} Running {} over {} records ({} steps)",
            ROCKET,
            style(&config.name).bold(),
            style(records.len()).cyan(),
            pipeline.len()
        );
    }

    let tracing_metrics: Arc<dyn PipelineMetrics> = Arc::new(TracingMetrics::new());
    let progress = if cmd.json {
        ProgressMetrics::hidden(tracing_metrics)
    } else {
        ProgressMetrics::new(tracing_metrics, pipeline.len())
    };

    let executor = BatchExecutor::new()
        .with_name(config.name.as_str())
        .with_metrics(Arc::new(progress));

    // Ctrl-C stops admitting new work; in-flight records finish first
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling batch");
            on_interrupt.cancel();
        }
    });

    let context = PipelineContext::new();
    let summary = match executor
        .process_batch(records, &pipeline, &context, &options, &cancel)
        .await
    {
        Ok(summary) => summary,
        Err(err) => {
            if !cmd.json {
                println!("\n{}", format_failure(&config.name, &err));
            }
            return Err(err).with_context(|| format!("Pipeline '{}' did not complete", config.name));
        }
    };

    let mut outputs = Map::new();
    for key in config.collect_keys() {
        outputs.insert(key.to_string(), Value::Array(collected(&context, key)));
    }

    if cmd.json {
        let data = json!({ "summary": summary, "collected": outputs });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("\n{}", format_summary(&summary));
    for (key, records) in &outputs {
        println!(
            "\n{} Collected {} ({} records):",
            INFO,
            style(key).cyan(),
            records.as_array().map_or(0, Vec::len)
        );
        println!("{}", serde_json::to_string_pretty(records)?);
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    let result = PipelineConfig::from_file(&cmd.config);

    if cmd.json {
        let data = match &result {
            Ok(config) => json!({ "valid": true, "pipeline": config }),
            Err(e) => json!({ "valid": false, "error": format!("{:#}", e) }),
        };
        println!("{}", serde_json::to_string_pretty(&data)?);
        if result.is_err() {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("{} Validating pipeline...", INFO);

    match result {
        Ok(config) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            if let Some(description) = &config.description {
                println!("  Description: {}", description);
            }
            println!(
                "  Execution: {}",
                if config.execution.sequential {
                    "sequential".to_string()
                } else {
                    format!("up to {} in parallel", config.execution.max_parallelism)
                }
            );
            println!("  Steps: {}", style(config.steps.len()).cyan());
            for line in format_step_list(&config) {
                println!("{}", line);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}
