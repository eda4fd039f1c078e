use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use engine::scheduler::parse_cron;
use engine::{validate_dag, StoreError, Workflow, WorkflowState};

use crate::{ApiError, AppState};

/// Validate and store a workflow definition. An existing id is replaced.
///
/// `created_at` is stamped here: now for a new id, the stored value when
/// replacing. A client-supplied value is ignored.
pub async fn create(
    State(state): State<AppState>,
    Json(mut workflow): Json<Workflow>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    validate_dag(&workflow)?;

    if workflow.state == WorkflowState::ActiveRecurring {
        let expression = workflow.cron_expression.as_deref().ok_or_else(|| {
            ApiError::BadRequest("recurring workflows need a cron_expression".into())
        })?;
        parse_cron(expression)?;
    }

    workflow.created_at = match state.store.get_workflow(workflow.id).await {
        Ok(existing) => existing.created_at,
        Err(StoreError::NotFound { .. }) => Utc::now(),
        Err(err) => return Err(err.into()),
    };

    state.store.save_workflow(&workflow).await?;
    info!(workflow_id = %workflow.id, name = %workflow.name, "workflow saved");

    Ok((StatusCode::CREATED, Json(workflow)))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Workflow>>, ApiError> {
    Ok(Json(state.store.list_workflows().await?))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Workflow>, ApiError> {
    Ok(Json(state.store.get_workflow(id).await?))
}
