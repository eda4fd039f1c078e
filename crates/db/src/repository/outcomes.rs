//! Action outcome persistence.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ActionOutcomeRow, DbError};

/// Record one action's terminal outcome at the next dispatch position.
///
/// The `(run_id, action_id)` primary key rejects a second outcome for the
/// same action within a run.
pub async fn append_outcome(
    pool: &PgPool,
    run_id: Uuid,
    action_id: Uuid,
    state: &str,
    outcome_json: Option<&str>,
    error_json: Option<&str>,
) -> Result<ActionOutcomeRow, DbError> {
    let row = sqlx::query_as::<_, ActionOutcomeRow>(
        r#"
        INSERT INTO action_outcomes
            (run_id, action_id, position, state, outcome_json, error_json, recorded_at)
        VALUES (
            $1, $2,
            (SELECT COUNT(*)::INTEGER FROM action_outcomes WHERE run_id = $1),
            $3, $4, $5, $6
        )
        RETURNING run_id, action_id, position, state, outcome_json, error_json, recorded_at
        "#,
    )
    .bind(run_id)
    .bind(action_id)
    .bind(state)
    .bind(outcome_json)
    .bind(error_json)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// All outcomes of a run in dispatch order.
pub async fn list_outcomes(pool: &PgPool, run_id: Uuid) -> Result<Vec<ActionOutcomeRow>, DbError> {
    let rows = sqlx::query_as::<_, ActionOutcomeRow>(
        r#"
        SELECT run_id, action_id, position, state, outcome_json, error_json, recorded_at
        FROM action_outcomes
        WHERE run_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
