//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::models::RunState;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// Two or more actions share the same ID.
    #[error("duplicate action ID: '{0}'")]
    DuplicateActionId(Uuid),

    /// An action's `run_after` references an action outside the workflow.
    #[error("action '{action_id}' depends on unknown action '{dependency}'")]
    UnknownDependency { action_id: Uuid, dependency: Uuid },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    /// A cron expression could not be parsed.
    #[error("invalid cron expression '{expression}': {message}")]
    Cron { expression: String, message: String },

    // ------ Execution errors ------

    /// Execution stopped because cancellation was requested.
    #[error("execution cancelled")]
    Cancelled,

    /// An outcome was finished twice.
    #[error(transparent)]
    Outcome(#[from] actions::models::OutcomeAlreadyFinished),

    /// Persistence error from the run store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The run queue rejected an id.
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
}

/// Errors returned by a [`crate::store::RunStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// The run is not in a state from which `to` can be reached.
    #[error("run '{run_id}' cannot move to {to}")]
    InvalidTransition { run_id: Uuid, to: RunState },

    /// A second outcome was recorded for the same action in one run.
    #[error("run '{run_id}' already has an outcome for action '{action_id}'")]
    DuplicateOutcome { run_id: Uuid, action_id: Uuid },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<db::DbError> for StoreError {
    fn from(err: db::DbError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(format!("serialisation failed: {err}"))
    }
}
