//! Pipeline context - shared state for one batch run

use crate::core::error::PipelineError;
use dashmap::DashMap;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A dynamically typed value stored in the context
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// Shared key-value scratch space visible to every step of a batch run
///
/// Cloning a context yields another handle to the same store, so steps
/// running in parallel tasks observe each other's writes. Reads and
/// writes on arbitrary keys are safe from any number of tasks.
#[derive(Clone, Default)]
pub struct PipelineContext {
    items: Arc<DashMap<String, ContextValue>>,
}

impl PipelineContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace a value
    pub fn set<T>(&self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.items.insert(key.into(), Arc::new(value));
    }

    /// Get a value that must be present with the given type
    pub fn get<T>(&self, key: &str) -> Result<Arc<T>, PipelineError>
    where
        T: Any + Send + Sync,
    {
        let raw = self
            .items
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PipelineError::ContextKeyNotFound(key.to_string()))?;

        raw.downcast::<T>()
            .map_err(|_| PipelineError::ContextTypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Get a value if it is present and has the given type
    pub fn try_get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.items
            .get(key)
            .and_then(|entry| Arc::clone(entry.value()).downcast::<T>().ok())
    }

    /// Get a value, inserting one built by `init` when the key is absent
    ///
    /// Concurrent callers racing on the same absent key all receive the
    /// single value that won the insert.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Result<Arc<T>, PipelineError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let raw = Arc::clone(
            self.items
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(init()))
                .value(),
        );

        raw.downcast::<T>()
            .map_err(|_| PipelineError::ContextTypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Remove a key, returning whether it was present
    pub fn remove(&self, key: &str) -> bool {
        self.items.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Read-only snapshot of the current entries
    pub fn snapshot(&self) -> HashMap<String, ContextValue> {
        self.items
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Keys currently stored, in no particular order
    pub fn keys(&self) -> Vec<String> {
        self.items.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("keys", &self.keys())
            .finish()
    }
}
