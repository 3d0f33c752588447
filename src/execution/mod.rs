//! Batch execution engine

pub mod engine;
pub mod executor;
pub mod scheduler;

pub use engine::BatchExecutor;
pub use executor::StepExecutor;
pub use scheduler::DispatchStrategy;
