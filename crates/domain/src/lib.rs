//! crosspost domain crate
//!
//! This crate contains the core publishing logic following hexagonal architecture:
//! - `model`: Articles, sync tasks and per-platform results
//! - `definition`: Declarative adapter definitions and their validation
//! - `expr`: Field-path expressions and template interpolation
//! - `executor`: Interprets one endpoint against a transport
//! - `runtime`: The per-platform publish workflow
//! - `orchestrator`: Batched multi-platform sync
//! - `ports`: Trait definitions for external dependencies (adapters)

pub mod context;
pub mod definition;
pub mod executor;
pub mod expr;
pub mod model;
pub mod orchestrator;
pub mod ports;
pub mod runtime;

#[cfg(test)]
mod test_support;

pub use context::{Blob, ExecutionContext};
pub use definition::*;
pub use executor::{EndpointExecutor, ExecuteError, ExecutionOutcome};
pub use model::*;
pub use orchestrator::{MAX_RETRIES, MAX_RETRY_DELAY, ProgressFn, SyncOptions, SyncOrchestrator};
pub use ports::*;
pub use runtime::{AdapterRuntime, AuthInfo, PublishOptions, PublishOutcome, WorkflowError, WorkflowState};
