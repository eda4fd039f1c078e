//! `engine` crate — run model, DAG validation, the action graph executor, the
//! run store, the processing worker and the recurring scheduler.

pub mod dag;
pub mod error;
pub mod executor;
pub mod models;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod worker;

pub use actions::{Action, Workflow, WorkflowState};
pub use dag::validate_dag;
pub use error::{EngineError, StoreError};
pub use executor::{ActionGraphExecutor, RunReport};
pub use models::{Run, RunState};
pub use scheduler::{RecurringScheduler, SchedulerConfig};
pub use service::{EngineConfig, EngineService};
pub use store::{MemoryStore, PgStore, RunStore};
pub use worker::{WorkerConfig, WorkflowWorker};

#[cfg(test)]
mod worker_tests;
