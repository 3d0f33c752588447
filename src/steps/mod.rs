//! Built-in steps over JSON records
//!
//! These are the steps a [`PipelineConfig`](crate::core::PipelineConfig)
//! can declare. Each works on `serde_json::Value` records, so any number
//! of them chain into a `Pipeline<Value, Value>`.

mod record;

pub use record::{collected, Collect, Filter, Number, RemoveField, Require, SetField};
