use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use actions::{ActionOutcome, OutcomeState, WorkflowState};

use super::RunStore;
use crate::{Run, RunState, StoreError, Workflow};

#[derive(Default)]
struct State {
    workflows: HashMap<Uuid, Workflow>,
    runs: HashMap<Uuid, Run>,
    /// Run ids in creation order.
    run_order: Vec<Uuid>,
}

/// In-process store for tests and one-shot local runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound { entity: "run", id }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        self.lock().workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        self.lock()
            .workflows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "workflow", id })
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let mut workflows: Vec<Workflow> = self.lock().workflows.values().cloned().collect();
        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(workflows)
    }

    async fn list_recurring_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let mut workflows: Vec<Workflow> = self
            .lock()
            .workflows
            .values()
            .filter(|w| w.state == WorkflowState::ActiveRecurring)
            .cloned()
            .collect();
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(workflows)
    }

    async fn create_run(
        &self,
        workflow_id: Uuid,
        trigger_input: HashMap<String, String>,
    ) -> Result<Run, StoreError> {
        let mut state = self.lock();
        if !state.workflows.contains_key(&workflow_id) {
            return Err(StoreError::NotFound {
                entity: "workflow",
                id: workflow_id,
            });
        }

        let run = Run::new(workflow_id, trigger_input);
        state.run_order.push(run.id);
        state.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError> {
        self.lock().runs.get(&id).cloned().ok_or_else(|| run_not_found(id))
    }

    async fn try_start_run(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let run = state.runs.get_mut(&id).ok_or_else(|| run_not_found(id))?;
        if run.state != RunState::NotStarted {
            return Ok(false);
        }
        run.state = RunState::Running;
        run.started_at = Some(Utc::now());
        Ok(true)
    }

    async fn finish_run(
        &self,
        id: Uuid,
        state: RunState,
        failure_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock();
        let run = guard.runs.get_mut(&id).ok_or_else(|| run_not_found(id))?;
        if !state.is_terminal() || !run.state.can_advance_to(state) {
            return Err(StoreError::InvalidTransition { run_id: id, to: state });
        }
        run.state = state;
        run.failure_message = failure_message.map(str::to_owned);
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn append_action_outcome(
        &self,
        run_id: Uuid,
        outcome: &ActionOutcome,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let run = state.runs.get_mut(&run_id).ok_or_else(|| run_not_found(run_id))?;
        if outcome.state == OutcomeState::Pending {
            return Err(StoreError::Backend(format!(
                "outcome for action '{}' is still pending",
                outcome.action_id
            )));
        }
        if run.action_outcomes.iter().any(|o| o.action_id == outcome.action_id) {
            return Err(StoreError::DuplicateOutcome {
                run_id,
                action_id: outcome.action_id,
            });
        }
        run.action_outcomes.push(outcome.clone());
        Ok(())
    }

    async fn list_runs_in_states(&self, states: &[RunState]) -> Result<Vec<Run>, StoreError> {
        let state = self.lock();
        Ok(state
            .run_order
            .iter()
            .filter_map(|id| state.runs.get(id))
            .filter(|run| states.contains(&run.state))
            .cloned()
            .collect())
    }

    async fn reset_run(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.lock();
        let run = state.runs.get_mut(&id).ok_or_else(|| run_not_found(id))?;
        run.state = RunState::NotStarted;
        run.action_outcomes.clear();
        run.failure_message = None;
        run.started_at = None;
        run.finished_at = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_workflow() -> (MemoryStore, Workflow) {
        let store = MemoryStore::new();
        let workflow = Workflow::new("memory", WorkflowState::ActiveExternalTrigger, vec![]);
        store.save_workflow(&workflow).await.unwrap();
        (store, workflow)
    }

    #[tokio::test]
    async fn start_acts_as_a_soft_lock() {
        let (store, workflow) = store_with_workflow().await;
        let run = store.create_run(workflow.id, HashMap::new()).await.unwrap();

        assert!(store.try_start_run(run.id).await.unwrap());
        assert!(!store.try_start_run(run.id).await.unwrap());
        assert_eq!(store.get_run(run.id).await.unwrap().state, RunState::Running);
    }

    #[tokio::test]
    async fn terminal_runs_do_not_regress() {
        let (store, workflow) = store_with_workflow().await;
        let run = store.create_run(workflow.id, HashMap::new()).await.unwrap();
        store.try_start_run(run.id).await.unwrap();
        store.finish_run(run.id, RunState::Success, None).await.unwrap();

        let err = store
            .finish_run(run.id, RunState::FailedWithErrors, Some("late"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(store.get_run(run.id).await.unwrap().state, RunState::Success);
    }

    #[tokio::test]
    async fn second_outcome_for_an_action_is_rejected() {
        let (store, workflow) = store_with_workflow().await;
        let run = store.create_run(workflow.id, HashMap::new()).await.unwrap();
        let mut outcome = ActionOutcome::pending(Uuid::new_v4());
        outcome.finish_with_success("{}").unwrap();

        store.append_action_outcome(run.id, &outcome).await.unwrap();
        let err = store.append_action_outcome(run.id, &outcome).await.unwrap_err();

        assert!(matches!(err, StoreError::DuplicateOutcome { .. }));
        assert_eq!(store.get_run(run.id).await.unwrap().action_outcomes.len(), 1);
    }

    #[tokio::test]
    async fn run_for_unknown_workflow_is_rejected() {
        let store = MemoryStore::new();
        let err = store.create_run(Uuid::new_v4(), HashMap::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "workflow", .. }));
    }
}
