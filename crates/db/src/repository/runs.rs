//! Run persistence.
//!
//! State values are opaque strings here; the engine owns their meaning and
//! passes the allowed predecessor states for every conditional transition.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::RunRow, DbError};

const COLUMNS: &str =
    "id, workflow_id, state, trigger_input, failure_message, created_at, started_at, finished_at";

/// Create a new run record in `state`.
pub async fn create_run(
    pool: &PgPool,
    workflow_id: Uuid,
    state: &str,
    trigger_input: serde_json::Value,
) -> Result<RunRow, DbError> {
    let row = sqlx::query_as::<_, RunRow>(&format!(
        r#"
        INSERT INTO runs (id, workflow_id, state, trigger_input, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(workflow_id)
    .bind(state)
    .bind(trigger_input)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single run by its primary key.
pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<RunRow, DbError> {
    sqlx::query_as::<_, RunRow>(&format!("SELECT {COLUMNS} FROM runs WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Move a run to `to` and stamp `started_at`, but only if it is currently in
/// `from`. Returns `false` when no row matched.
pub async fn start_run(pool: &PgPool, id: Uuid, from: &str, to: &str) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET state = $1, started_at = $2
        WHERE id = $3 AND state = $4
        "#,
    )
    .bind(to)
    .bind(Utc::now())
    .bind(id)
    .bind(from)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Move a run to the terminal state `to`, recording `failure_message` and
/// `finished_at`, if it is currently in one of `from`.
pub async fn finish_run(
    pool: &PgPool,
    id: Uuid,
    from: &[String],
    to: &str,
    failure_message: Option<&str>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET state = $1, failure_message = $2, finished_at = $3
        WHERE id = $4 AND state = ANY($5)
        "#,
    )
    .bind(to)
    .bind(failure_message)
    .bind(Utc::now())
    .bind(id)
    .bind(from)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Put a run back into `to`, discarding its recorded outcomes and timestamps.
pub async fn reset_run(pool: &PgPool, id: Uuid, to: &str) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM action_outcomes WHERE run_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query(
        r#"
        UPDATE runs
        SET state = $1, started_at = NULL, finished_at = NULL, failure_message = NULL
        WHERE id = $2
        "#,
    )
    .bind(to)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(())
}

/// Return every run whose state is one of `states`, oldest first.
pub async fn list_runs_in_states(pool: &PgPool, states: &[String]) -> Result<Vec<RunRow>, DbError> {
    let rows = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {COLUMNS} FROM runs WHERE state = ANY($1) ORDER BY created_at ASC"
    ))
    .bind(states)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
