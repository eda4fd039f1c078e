//! Workflow persistence.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

const COLUMNS: &str =
    "id, tenant_id, name, state, cron_expression, definition, created_at, updated_at";

/// Insert a workflow, or overwrite its columns and serialized `definition`
/// when the id is already stored.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_workflow(
    pool: &PgPool,
    id: Uuid,
    tenant_id: Uuid,
    name: &str,
    state: &str,
    cron_expression: Option<&str>,
    definition: serde_json::Value,
    created_at: chrono::DateTime<Utc>,
) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        r#"
        INSERT INTO workflows ({COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name,
            state = EXCLUDED.state,
            cron_expression = EXCLUDED.cron_expression,
            definition = EXCLUDED.definition,
            updated_at = EXCLUDED.updated_at
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(tenant_id)
    .bind(name)
    .bind(state)
    .bind(cron_expression)
    .bind(definition)
    .bind(created_at)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// `DbError::NotFound` when no workflow has this id.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    sqlx::query_as::<_, WorkflowRow>(&format!("SELECT {COLUMNS} FROM workflows WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Newest first.
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {COLUMNS} FROM workflows ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Return every workflow whose `state` column equals `state`.
pub async fn list_workflows_in_state(pool: &PgPool, state: &str) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {COLUMNS} FROM workflows WHERE state = $1 ORDER BY created_at ASC"
    ))
    .bind(state)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
