//! Test steps and a recording metrics backend shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use batch_pipeline::core::{BatchStep, PipelineContext, PipelineError, PipelineStep, StepOutcome};
use batch_pipeline::instrumentation::{BatchScope, PipelineMetrics, StepScope};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub type Sink = Arc<Mutex<Vec<i32>>>;

pub fn sink() -> Sink {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn sorted(sink: &Sink) -> Vec<i32> {
    let mut values = sink.lock().clone();
    values.sort_unstable();
    values
}

/// Aborts zero and negative numbers
pub struct AbortIfNonPositive;

#[async_trait]
impl PipelineStep<i32, i32> for AbortIfNonPositive {
    async fn invoke(
        &self,
        input: i32,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<i32>> {
        if input <= 0 {
            Ok(StepOutcome::Abort)
        } else {
            Ok(StepOutcome::Continue(input))
        }
    }
}

/// Aborts even numbers
pub struct AbortIfEven;

#[async_trait]
impl PipelineStep<i32, i32> for AbortIfEven {
    async fn invoke(
        &self,
        input: i32,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<i32>> {
        if input % 2 == 0 {
            Ok(StepOutcome::Abort)
        } else {
            Ok(StepOutcome::Continue(input))
        }
    }
}

pub struct AbortAll;

#[async_trait]
impl PipelineStep<i32, i32> for AbortAll {
    async fn invoke(
        &self,
        _input: i32,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<i32>> {
        Ok(StepOutcome::Abort)
    }
}

pub struct Add(pub i32);

#[async_trait]
impl PipelineStep<i32, i32> for Add {
    async fn invoke(
        &self,
        input: i32,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<i32>> {
        Ok(StepOutcome::Continue(input + self.0))
    }
}

/// Pushes every value it sees into a sink and passes it on
pub struct Record(pub Sink);

#[async_trait]
impl PipelineStep<i32, i32> for Record {
    async fn invoke(
        &self,
        input: i32,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<i32>> {
        self.0.lock().push(input);
        Ok(StepOutcome::Continue(input))
    }
}

/// Doubles the input, optionally after a short sleep, and records the result
pub struct Double {
    pub outputs: Sink,
    pub delay: Option<Duration>,
}

impl Double {
    pub fn new(outputs: Sink) -> Self {
        Self { outputs, delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl PipelineStep<i32, i32> for Double {
    async fn invoke(
        &self,
        input: i32,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<i32>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let output = input * 2;
        self.outputs.lock().push(output);
        Ok(StepOutcome::Continue(output))
    }
}

/// Multiplies by a factor and aborts results above `abort_above`
///
/// Counts how it was invoked so tests can tell whole-batch from per-record
/// dispatch.
pub struct Multiply {
    pub factor: i32,
    pub abort_above: i32,
    pub single_calls: Arc<AtomicUsize>,
    pub batch_calls: Arc<AtomicUsize>,
}

impl Multiply {
    pub fn new(factor: i32) -> Self {
        Self {
            factor,
            abort_above: i32::MAX,
            single_calls: Arc::new(AtomicUsize::new(0)),
            batch_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn abort_above(mut self, limit: i32) -> Self {
        self.abort_above = limit;
        self
    }

    fn apply(&self, input: i32) -> StepOutcome<i32> {
        let output = input * self.factor;
        if output > self.abort_above {
            StepOutcome::Abort
        } else {
            StepOutcome::Continue(output)
        }
    }
}

#[async_trait]
impl PipelineStep<i32, i32> for Multiply {
    async fn invoke(
        &self,
        input: i32,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<i32>> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.apply(input))
    }
}

#[async_trait]
impl BatchStep<i32, i32> for Multiply {
    async fn invoke_batch(
        &self,
        inputs: Vec<i32>,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<StepOutcome<i32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs.into_iter().map(|input| self.apply(input)).collect())
    }
}

/// Batch step that drops the last outcome
pub struct DropsLastOutcome;

#[async_trait]
impl PipelineStep<i32, i32> for DropsLastOutcome {
    async fn invoke(
        &self,
        input: i32,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<i32>> {
        Ok(StepOutcome::Continue(input))
    }
}

#[async_trait]
impl BatchStep<i32, i32> for DropsLastOutcome {
    async fn invoke_batch(
        &self,
        mut inputs: Vec<i32>,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<StepOutcome<i32>>> {
        inputs.pop();
        Ok(inputs.into_iter().map(StepOutcome::Continue).collect())
    }
}

/// Fails for the listed inputs, after an optional per-input delay
pub struct FailOn {
    pub failing: Vec<i32>,
    pub delay_ms: fn(i32) -> u64,
    pub started: Arc<AtomicUsize>,
    pub finished: Arc<AtomicUsize>,
}

impl FailOn {
    pub fn new(failing: Vec<i32>) -> Self {
        Self {
            failing,
            delay_ms: |_| 0,
            started: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay_ms: fn(i32) -> u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl PipelineStep<i32, i32> for FailOn {
    async fn invoke(
        &self,
        input: i32,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<i32>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let delay = (self.delay_ms)(input);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(&input) {
            anyhow::bail!("failed on {}", input);
        }
        Ok(StepOutcome::Continue(input))
    }
}

/// Cancels the token when it sees `trigger`, then keeps going
pub struct CancelOn {
    pub trigger: i32,
    pub token: CancellationToken,
    pub seen: Sink,
    pub delay: Duration,
}

#[async_trait]
impl PipelineStep<i32, i32> for CancelOn {
    async fn invoke(
        &self,
        input: i32,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<i32>> {
        if input == self.trigger {
            self.token.cancel();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.seen.lock().push(input);
        Ok(StepOutcome::Continue(input))
    }
}

/// Bails out with `Cancelled` once its own token has fired
///
/// Models a step that watches an external shutdown signal rather than the
/// token the executor passes in.
pub struct ObservesCancellation(pub CancellationToken);

#[async_trait]
impl PipelineStep<i32, i32> for ObservesCancellation {
    async fn invoke(
        &self,
        input: i32,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<StepOutcome<i32>> {
        if self.0.is_cancelled() {
            return Err(PipelineError::Cancelled.into());
        }
        Ok(StepOutcome::Continue(input))
    }
}

/// Everything the executor reported, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricEvent {
    BatchOpened {
        pipeline: String,
        records: usize,
        sequential: bool,
        max_parallelism: usize,
    },
    StepOpened {
        step: String,
        active: usize,
        batch_aware: bool,
    },
    StepOutcome {
        step: String,
        aborted: usize,
    },
    StepFailed {
        step: String,
        error: String,
    },
    StepClosed {
        step: String,
    },
    BatchFailed {
        error: String,
    },
    BatchClosed,
}

#[derive(Clone, Default)]
pub struct RecordingMetrics {
    events: Arc<Mutex<Vec<MetricEvent>>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }

    /// (step, active before) for every step scope opened
    pub fn steps_opened(&self) -> Vec<(String, usize)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MetricEvent::StepOpened { step, active, .. } => Some((step, active)),
                _ => None,
            })
            .collect()
    }

    /// (step, newly aborted) for every recorded step outcome
    pub fn step_outcomes(&self) -> Vec<(String, usize)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MetricEvent::StepOutcome { step, aborted } => Some((step, aborted)),
                _ => None,
            })
            .collect()
    }

    pub fn step_failures(&self) -> usize {
        self.count(|event| matches!(event, MetricEvent::StepFailed { .. }))
    }

    pub fn batch_failures(&self) -> usize {
        self.count(|event| matches!(event, MetricEvent::BatchFailed { .. }))
    }

    pub fn batches_opened(&self) -> usize {
        self.count(|event| matches!(event, MetricEvent::BatchOpened { .. }))
    }

    pub fn batches_closed(&self) -> usize {
        self.count(|event| matches!(event, MetricEvent::BatchClosed))
    }

    /// Scopes opened but not yet dropped
    pub fn open_step_scopes(&self) -> usize {
        let opened = self.count(|event| matches!(event, MetricEvent::StepOpened { .. }));
        let closed = self.count(|event| matches!(event, MetricEvent::StepClosed { .. }));
        opened - closed
    }

    fn count(&self, predicate: impl Fn(&MetricEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }

    fn push(&self, event: MetricEvent) {
        self.events.lock().push(event);
    }
}

impl PipelineMetrics for RecordingMetrics {
    fn track_batch(
        &self,
        pipeline_name: &str,
        record_count: usize,
        is_sequential: bool,
        max_parallelism: usize,
    ) -> Box<dyn BatchScope> {
        self.push(MetricEvent::BatchOpened {
            pipeline: pipeline_name.to_string(),
            records: record_count,
            sequential: is_sequential,
            max_parallelism,
        });
        Box::new(RecordingBatch { metrics: self.clone() })
    }
}

struct RecordingBatch {
    metrics: RecordingMetrics,
}

impl BatchScope for RecordingBatch {
    fn track_step(
        &mut self,
        step_name: &str,
        active_count: usize,
        is_batch_aware: bool,
    ) -> Box<dyn StepScope> {
        assert_eq!(
            self.metrics.open_step_scopes(),
            0,
            "a step scope was opened while another was still open"
        );
        self.metrics.push(MetricEvent::StepOpened {
            step: step_name.to_string(),
            active: active_count,
            batch_aware: is_batch_aware,
        });
        Box::new(RecordingStep {
            metrics: self.metrics.clone(),
            step: step_name.to_string(),
        })
    }

    fn mark_failed(&mut self, error: &PipelineError) {
        self.metrics.push(MetricEvent::BatchFailed {
            error: error.to_string(),
        });
    }
}

impl Drop for RecordingBatch {
    fn drop(&mut self) {
        self.metrics.push(MetricEvent::BatchClosed);
    }
}

struct RecordingStep {
    metrics: RecordingMetrics,
    step: String,
}

impl StepScope for RecordingStep {
    fn record_outcome(&mut self, aborted_count: usize) {
        self.metrics.push(MetricEvent::StepOutcome {
            step: self.step.clone(),
            aborted: aborted_count,
        });
    }

    fn mark_failed(&mut self, error: &PipelineError) {
        self.metrics.push(MetricEvent::StepFailed {
            step: self.step.clone(),
            error: error.to_string(),
        });
    }
}

impl Drop for RecordingStep {
    fn drop(&mut self) {
        self.metrics.push(MetricEvent::StepClosed {
            step: self.step.clone(),
        });
    }
}
