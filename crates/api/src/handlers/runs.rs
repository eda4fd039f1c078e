use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use engine::Run;

use crate::{ApiError, AppState};

/// A run with its outcomes in dispatch order.
pub async fn get(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<Run>, ApiError> {
    Ok(Json(state.store.get_run(id).await?))
}
