//! Persistence boundary of the execution core.
//!
//! The worker, scheduler and trigger endpoints talk to storage only through
//! [`RunStore`]; [`PgStore`] backs it with Postgres and [`MemoryStore`] keeps
//! everything in process.

mod memory;
mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use actions::ActionOutcome;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::{Run, RunState, StoreError, Workflow};

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or replace a workflow definition.
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError>;

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError>;

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError>;

    /// Workflows in `ActiveRecurring` state.
    async fn list_recurring_workflows(&self) -> Result<Vec<Workflow>, StoreError>;

    /// Create a run of `workflow_id` in `NotStarted`.
    async fn create_run(
        &self,
        workflow_id: Uuid,
        trigger_input: HashMap<String, String>,
    ) -> Result<Run, StoreError>;

    /// The run with its outcomes in dispatch order.
    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError>;

    /// Move the run from `NotStarted` to `Running`.
    ///
    /// Returns `false` when the run was not in `NotStarted`, meaning another
    /// worker owns it or it already finished.
    async fn try_start_run(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Move the run to a terminal state.
    ///
    /// # Errors
    /// [`StoreError::InvalidTransition`] if the run is already terminal.
    async fn finish_run(
        &self,
        id: Uuid,
        state: RunState,
        failure_message: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Record a terminal outcome after those already recorded for the run.
    async fn append_action_outcome(
        &self,
        run_id: Uuid,
        outcome: &ActionOutcome,
    ) -> Result<(), StoreError>;

    /// Runs currently in any of `states`, oldest first.
    async fn list_runs_in_states(&self, states: &[RunState]) -> Result<Vec<Run>, StoreError>;

    /// Put an interrupted run back to `NotStarted`, dropping its outcomes.
    async fn reset_run(&self, id: Uuid) -> Result<(), StoreError>;
}
