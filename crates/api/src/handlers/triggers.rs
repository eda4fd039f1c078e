//! External triggers: an HTTP call with a JSON body or a form submission.
//! Both create a `NotStarted` run and hand its id to the run queue.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Form, Json,
};
use tracing::info;
use uuid::Uuid;

use engine::{Run, WorkflowState};

use crate::{ApiError, AppState};

pub async fn http(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(input): Json<HashMap<String, String>>,
) -> Result<(StatusCode, Json<Run>), ApiError> {
    start_run(&state, id, input).await
}

pub async fn form(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Form(input): Form<HashMap<String, String>>,
) -> Result<(StatusCode, Json<Run>), ApiError> {
    start_run(&state, id, input).await
}

async fn start_run(
    state: &AppState,
    workflow_id: Uuid,
    trigger_input: HashMap<String, String>,
) -> Result<(StatusCode, Json<Run>), ApiError> {
    let workflow = state.store.get_workflow(workflow_id).await?;
    if workflow.state != WorkflowState::ActiveExternalTrigger {
        return Err(ApiError::Conflict(format!(
            "workflow '{workflow_id}' is {} and cannot be triggered externally",
            workflow.state
        )));
    }

    let run = state.store.create_run(workflow_id, trigger_input).await?;
    state.queue.enqueue(run.id)?;
    info!(%workflow_id, run_id = %run.id, "run triggered");

    Ok((StatusCode::ACCEPTED, Json(run)))
}
