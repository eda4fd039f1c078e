use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use actions::{ActionOutcome, WorkflowState};
use db::models::{ActionOutcomeRow, RunRow, WorkflowRow};
use db::repository::{outcomes, runs, workflows};
use db::{DbError, DbPool};

use super::RunStore;
use crate::{Run, RunState, StoreError, Workflow};

/// [`RunStore`] backed by the Postgres schema in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn load_run(&self, row: RunRow) -> Result<Run, StoreError> {
        let outcome_rows = outcomes::list_outcomes(&self.pool, row.id).await?;
        run_from_row(row, outcome_rows)
    }
}

fn not_found(entity: &'static str, id: Uuid) -> impl FnOnce(DbError) -> StoreError {
    move |err| match err {
        DbError::NotFound => StoreError::NotFound { entity, id },
        other => other.into(),
    }
}

fn state_names(states: &[RunState]) -> Vec<String> {
    states.iter().map(|s| s.as_str().to_owned()).collect()
}

fn workflow_from_row(row: WorkflowRow) -> Result<Workflow, StoreError> {
    let mut workflow: Workflow = serde_json::from_value(row.definition)?;
    // Columns win over whatever the stored definition says.
    workflow.id = row.id;
    workflow.tenant_id = row.tenant_id;
    workflow.name = row.name;
    workflow.state = row.state.parse().map_err(StoreError::Backend)?;
    workflow.cron_expression = row.cron_expression;
    workflow.created_at = row.created_at;
    Ok(workflow)
}

fn run_from_row(row: RunRow, outcome_rows: Vec<ActionOutcomeRow>) -> Result<Run, StoreError> {
    let action_outcomes = outcome_rows
        .into_iter()
        .map(|o| {
            Ok(ActionOutcome {
                action_id: o.action_id,
                state: o.state.parse().map_err(StoreError::Backend)?,
                outcome_json: o.outcome_json,
                error_json: o.error_json,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(Run {
        id: row.id,
        workflow_id: row.workflow_id,
        state: row.state.parse().map_err(StoreError::Backend)?,
        trigger_input: serde_json::from_value(row.trigger_input)?,
        action_outcomes,
        failure_message: row.failure_message,
        created_at: row.created_at,
        started_at: row.started_at,
        finished_at: row.finished_at,
    })
}

#[async_trait]
impl RunStore for PgStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let definition = serde_json::to_value(workflow)?;
        workflows::upsert_workflow(
            &self.pool,
            workflow.id,
            workflow.tenant_id,
            &workflow.name,
            &workflow.state.to_string(),
            workflow.cron_expression.as_deref(),
            definition,
            workflow.created_at,
        )
        .await?;
        Ok(())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        let row = workflows::get_workflow(&self.pool, id)
            .await
            .map_err(not_found("workflow", id))?;
        workflow_from_row(row)
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        workflows::list_workflows(&self.pool)
            .await?
            .into_iter()
            .map(workflow_from_row)
            .collect()
    }

    async fn list_recurring_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let state = WorkflowState::ActiveRecurring.to_string();
        workflows::list_workflows_in_state(&self.pool, &state)
            .await?
            .into_iter()
            .map(workflow_from_row)
            .collect()
    }

    async fn create_run(
        &self,
        workflow_id: Uuid,
        trigger_input: HashMap<String, String>,
    ) -> Result<Run, StoreError> {
        // Surface a missing workflow as NotFound rather than an FK violation.
        workflows::get_workflow(&self.pool, workflow_id)
            .await
            .map_err(not_found("workflow", workflow_id))?;

        let row = runs::create_run(
            &self.pool,
            workflow_id,
            RunState::NotStarted.as_str(),
            serde_json::to_value(&trigger_input)?,
        )
        .await?;
        run_from_row(row, Vec::new())
    }

    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError> {
        let row = runs::get_run(&self.pool, id).await.map_err(not_found("run", id))?;
        self.load_run(row).await
    }

    async fn try_start_run(&self, id: Uuid) -> Result<bool, StoreError> {
        let started = runs::start_run(
            &self.pool,
            id,
            RunState::NotStarted.as_str(),
            RunState::Running.as_str(),
        )
        .await?;
        Ok(started)
    }

    async fn finish_run(
        &self,
        id: Uuid,
        state: RunState,
        failure_message: Option<&str>,
    ) -> Result<(), StoreError> {
        if !state.is_terminal() {
            return Err(StoreError::InvalidTransition { run_id: id, to: state });
        }

        let from = state_names(&RunState::predecessors_of(state));
        let finished =
            runs::finish_run(&self.pool, id, &from, state.as_str(), failure_message).await?;
        if finished {
            return Ok(());
        }

        // Nothing matched: either the run is missing or it is already terminal.
        runs::get_run(&self.pool, id).await.map_err(not_found("run", id))?;
        Err(StoreError::InvalidTransition { run_id: id, to: state })
    }

    async fn append_action_outcome(
        &self,
        run_id: Uuid,
        outcome: &ActionOutcome,
    ) -> Result<(), StoreError> {
        let result = outcomes::append_outcome(
            &self.pool,
            run_id,
            outcome.action_id,
            &outcome.state.to_string(),
            outcome.outcome_json.as_deref(),
            outcome.error_json.as_deref(),
        )
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.is_unique_violation() => Err(StoreError::DuplicateOutcome {
                run_id,
                action_id: outcome.action_id,
            }),
            Err(other) => Err(other.into()),
        }
    }

    async fn list_runs_in_states(&self, states: &[RunState]) -> Result<Vec<Run>, StoreError> {
        let rows = runs::list_runs_in_states(&self.pool, &state_names(states)).await?;
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            result.push(self.load_run(row).await?);
        }
        Ok(result)
    }

    async fn reset_run(&self, id: Uuid) -> Result<(), StoreError> {
        runs::reset_run(&self.pool, id, RunState::NotStarted.as_str())
            .await
            .map_err(not_found("run", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn row_columns_override_stored_definition() {
        let workflow = Workflow::new("stored", WorkflowState::Inactive, vec![]);
        let row = WorkflowRow {
            id: workflow.id,
            tenant_id: workflow.tenant_id,
            name: "renamed".into(),
            state: "active_recurring".into(),
            cron_expression: Some("*/5 * * * *".into()),
            definition: serde_json::to_value(&workflow).unwrap(),
            created_at: workflow.created_at,
            updated_at: Utc::now(),
        };

        let loaded = workflow_from_row(row).unwrap();
        assert_eq!(loaded.name, "renamed");
        assert_eq!(loaded.state, WorkflowState::ActiveRecurring);
        assert_eq!(loaded.cron_expression.as_deref(), Some("*/5 * * * *"));
    }

    #[test]
    fn run_row_maps_outcomes_in_order() {
        let run_id = Uuid::new_v4();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let outcome = |action_id, position, state: &str| ActionOutcomeRow {
            run_id,
            action_id,
            position,
            state: state.into(),
            outcome_json: None,
            error_json: None,
            recorded_at: Utc::now(),
        };
        let row = RunRow {
            id: run_id,
            workflow_id: Uuid::new_v4(),
            state: "running".into(),
            trigger_input: json!({ "email": "a@example.com" }),
            failure_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };

        let run = run_from_row(row, vec![outcome(first, 0, "success"), outcome(second, 1, "failure")])
            .unwrap();

        assert_eq!(run.state, RunState::Running);
        assert_eq!(run.trigger_input["email"], "a@example.com");
        let ids: Vec<Uuid> = run.action_outcomes.iter().map(|o| o.action_id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn unknown_state_string_is_a_backend_error() {
        let row = RunRow {
            id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            state: "paused".into(),
            trigger_input: json!({}),
            failure_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        assert!(matches!(run_from_row(row, vec![]), Err(StoreError::Backend(_))));
    }
}
