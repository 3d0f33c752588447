use crate::core::{BatchStep, PipelineContext, PipelineStep, StepOutcome};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Records appended by [`Collect`] under `key`, in arrival order
pub fn collected(context: &PipelineContext, key: &str) -> Vec<Value> {
    context
        .try_get::<Mutex<Vec<Value>>>(key)
        .map(|records| records.lock().clone())
        .unwrap_or_default()
}

fn object_mut<'a>(record: &'a mut Value, step: &str) -> Result<&'a mut serde_json::Map<String, Value>> {
    record
        .as_object_mut()
        .ok_or_else(|| anyhow!("{} expects an object record", step))
}

/// Abort records where the field is missing or null
#[derive(Debug, Clone)]
pub struct Require {
    field: String,
}

impl Require {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

#[async_trait]
impl PipelineStep<Value, Value> for Require {
    async fn invoke(
        &self,
        input: Value,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> Result<StepOutcome<Value>> {
        match input.get(&self.field) {
            None | Some(Value::Null) => Ok(StepOutcome::Abort),
            Some(_) => Ok(StepOutcome::Continue(input)),
        }
    }
}

/// Abort records unless the field equals a value
#[derive(Debug, Clone)]
pub struct Filter {
    field: String,
    equals: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, equals: Value) -> Self {
        Self {
            field: field.into(),
            equals,
        }
    }
}

#[async_trait]
impl PipelineStep<Value, Value> for Filter {
    async fn invoke(
        &self,
        input: Value,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> Result<StepOutcome<Value>> {
        if input.get(&self.field) == Some(&self.equals) {
            Ok(StepOutcome::Continue(input))
        } else {
            Ok(StepOutcome::Abort)
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetField {
    field: String,
    value: Value,
}

impl SetField {
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

#[async_trait]
impl PipelineStep<Value, Value> for SetField {
    async fn invoke(
        &self,
        mut input: Value,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> Result<StepOutcome<Value>> {
        object_mut(&mut input, "set")?.insert(self.field.clone(), self.value.clone());
        Ok(StepOutcome::Continue(input))
    }
}

#[derive(Debug, Clone)]
pub struct RemoveField {
    field: String,
}

impl RemoveField {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

#[async_trait]
impl PipelineStep<Value, Value> for RemoveField {
    async fn invoke(
        &self,
        mut input: Value,
        _context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> Result<StepOutcome<Value>> {
        if let Some(object) = input.as_object_mut() {
            object.remove(&self.field);
        }
        Ok(StepOutcome::Continue(input))
    }
}

/// Number records consecutively from `start`
///
/// Called for a whole batch, numbers follow index order. Called one record
/// at a time, numbers come from a counter kept in the context, so each
/// batch run starts again from `start`.
#[derive(Debug, Clone)]
pub struct Number {
    field: String,
    start: i64,
    counter_key: String,
}

impl Number {
    pub fn new(field: impl Into<String>, start: i64) -> Self {
        let field = field.into();
        Self {
            counter_key: format!("__number.{}.{}", field, Uuid::new_v4()),
            field,
            start,
        }
    }

    // Reserve `count` consecutive numbers and return the first.
    // The counter holds the next free number, so it must stay representable.
    fn reserve(&self, context: &PipelineContext, count: usize) -> Result<i64> {
        let counter = context.get_or_insert_with(&self.counter_key, || AtomicI64::new(self.start))?;
        let count = i64::try_from(count)?;
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| next.checked_add(count))
            .map_err(|next| {
                anyhow!(
                    "numbering {} records from {} overflows field '{}'",
                    count,
                    next,
                    self.field
                )
            })
    }

    fn assign(&self, mut record: Value, number: i64) -> Result<Value> {
        object_mut(&mut record, "number")?.insert(self.field.clone(), Value::from(number));
        Ok(record)
    }
}

#[async_trait]
impl PipelineStep<Value, Value> for Number {
    async fn invoke(
        &self,
        input: Value,
        context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> Result<StepOutcome<Value>> {
        let number = self.reserve(context, 1)?;
        Ok(StepOutcome::Continue(self.assign(input, number)?))
    }
}

#[async_trait]
impl BatchStep<Value, Value> for Number {
    async fn invoke_batch(
        &self,
        inputs: Vec<Value>,
        context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> Result<Vec<StepOutcome<Value>>> {
        let first = self.reserve(context, inputs.len())?;
        inputs
            .into_iter()
            .enumerate()
            .map(|(offset, record)| {
                // Reserved above, so every offset stays in range
                let number = first + offset as i64;
                self.assign(record, number).map(StepOutcome::Continue)
            })
            .collect()
    }
}

/// Append each record to a shared list in the context
#[derive(Debug, Clone)]
pub struct Collect {
    key: String,
}

impl Collect {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl PipelineStep<Value, Value> for Collect {
    async fn invoke(
        &self,
        input: Value,
        context: &PipelineContext,
        _cancel: &CancellationToken,
    ) -> Result<StepOutcome<Value>> {
        let records = context.get_or_insert_with(&self.key, || Mutex::new(Vec::<Value>::new()))?;
        records.lock().push(input.clone());
        Ok(StepOutcome::Continue(input))
    }
}
