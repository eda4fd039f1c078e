//! Rows of the `workflows`, `runs` and `action_outcomes` tables.
//!
//! States are stored as their snake_case names; `engine::store::postgres`
//! parses them back into `RunState` and `OutcomeState`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub state: String,
    pub cron_expression: Option<String>,
    /// Full JSON workflow definition (actions, dependencies, trigger, …)
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

/// A persisted run row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub state: String,
    /// JSON object of string → string.
    pub trigger_input: serde_json::Value,
    pub failure_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// action_outcomes
// ---------------------------------------------------------------------------

/// A persisted action outcome row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActionOutcomeRow {
    pub run_id: Uuid,
    pub action_id: Uuid,
    /// Dispatch position within the run, starting at 0.
    pub position: i32,
    pub state: String,
    pub outcome_json: Option<String>,
    pub error_json: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
