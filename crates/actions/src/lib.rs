//! `actions` crate — the workflow data model, the `ActionProcessor` trait,
//! parameter resolution, the processor registry, the async job poller and the
//! built-in processors.
//!
//! The engine crate dispatches every action through [`ActionProcessor`].

pub mod error;
pub mod mock;
pub mod models;
pub mod poller;
pub mod processors;
pub mod registrar;
pub mod registry;
pub mod resolver;
pub mod traits;

pub use error::{ActionError, TransportError};
pub use models::{
    Action, ActionInput, ActionOutcome, ActionProcessingContext, ActionType, ExecutionContext,
    OutcomeState, Workflow, WorkflowState,
};
pub use poller::{AsyncJobPoller, JobOperation, JobTransport, PollerConfig};
pub use registrar::HttpRegistrarTransport;
pub use registry::ProcessorRegistry;
pub use resolver::{resolve, ParameterReference};
pub use traits::ActionProcessor;
