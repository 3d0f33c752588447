//! CLI output formatting

use crate::{
    core::{BatchSummary, PipelineConfig, PipelineError},
    instrumentation::{BatchScope, PipelineMetrics, StepScope},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar over the steps of a pipeline
pub fn create_progress_bar(total_steps: usize) -> ProgressBar {
    let progress = ProgressBar::new(total_steps as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a batch summary for display
pub fn format_summary(summary: &BatchSummary) -> String {
    let icon = if summary.aborted == 0 { CHECK } else { WARN };
    let elapsed_ms = summary.duration().num_milliseconds();

    format!(
        "{} {} - {} records: {} completed, {} aborted - steps {}/{} ({}) in {}ms",
        icon,
        style(&summary.pipeline_name).bold(),
        style(summary.records).cyan(),
        style(summary.completed).green(),
        style(summary.aborted).yellow(),
        summary.steps_attempted,
        summary.total_steps,
        style(format!("{:.0}%", summary.progress() * 100.0)).cyan(),
        elapsed_ms
    )
}

/// One line per configured step, numbered from 1
pub fn format_step_list(config: &PipelineConfig) -> Vec<String> {
    config
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("  {}. {}", style(i + 1).dim(), step.label()))
        .collect()
}

/// Format a failed batch for display
pub fn format_failure(pipeline_name: &str, error: &PipelineError) -> String {
    if error.is_cancelled() {
        format!("{} {} {}", WARN, style(pipeline_name).bold(), style("cancelled").yellow())
    } else {
        format!(
            "{} {} {}: {}",
            CROSS,
            style(pipeline_name).bold(),
            style("failed").red(),
            error
        )
    }
}

/// Drives a progress bar from batch instrumentation, then forwards to `inner`
pub struct ProgressMetrics {
    inner: Arc<dyn PipelineMetrics>,
    bar: ProgressBar,
}

impl ProgressMetrics {
    pub fn new(inner: Arc<dyn PipelineMetrics>, total_steps: usize) -> Self {
        Self {
            inner,
            bar: create_progress_bar(total_steps),
        }
    }

    /// Forward to `inner` without drawing anything
    pub fn hidden(inner: Arc<dyn PipelineMetrics>) -> Self {
        Self {
            inner,
            bar: ProgressBar::hidden(),
        }
    }
}

impl PipelineMetrics for ProgressMetrics {
    fn track_batch(
        &self,
        pipeline_name: &str,
        record_count: usize,
        is_sequential: bool,
        max_parallelism: usize,
    ) -> Box<dyn BatchScope> {
        self.bar.reset();
        self.bar.set_message(format!("{} records", record_count));

        Box::new(ProgressBatchScope {
            inner: self
                .inner
                .track_batch(pipeline_name, record_count, is_sequential, max_parallelism),
            bar: self.bar.clone(),
        })
    }
}

struct ProgressBatchScope {
    inner: Box<dyn BatchScope>,
    bar: ProgressBar,
}

impl BatchScope for ProgressBatchScope {
    fn track_step(
        &mut self,
        step_name: &str,
        active_count: usize,
        is_batch_aware: bool,
    ) -> Box<dyn StepScope> {
        self.bar
            .set_message(format!("{} ({} active)", step_name, active_count));

        Box::new(ProgressStepScope {
            inner: self.inner.track_step(step_name, active_count, is_batch_aware),
            bar: self.bar.clone(),
        })
    }

    fn mark_failed(&mut self, error: &PipelineError) {
        self.bar.abandon_with_message(style("failed").red().to_string());
        self.inner.mark_failed(error);
    }
}

impl Drop for ProgressBatchScope {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

struct ProgressStepScope {
    inner: Box<dyn StepScope>,
    bar: ProgressBar,
}

impl StepScope for ProgressStepScope {
    fn record_outcome(&mut self, aborted_count: usize) {
        self.inner.record_outcome(aborted_count);
    }

    fn mark_failed(&mut self, error: &PipelineError) {
        self.inner.mark_failed(error);
    }
}

impl Drop for ProgressStepScope {
    fn drop(&mut self) {
        self.bar.inc(1);
    }
}
