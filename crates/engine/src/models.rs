//! Run model — one execution instance of a workflow.
//!
//! Workflow and action types live in the `actions` crate and are re-exported
//! from the crate root.

use std::collections::HashMap;
use std::fmt;

use actions::ActionOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// Lifecycle of a run. Moves forward only; the single exception is the
/// startup rescue, which puts an interrupted `Running` run back to
/// `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Success,
    FailedWithErrors,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Success => "success",
            Self::FailedWithErrors => "failed_with_errors",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::FailedWithErrors)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::Success | Self::FailedWithErrors => 2,
        }
    }

    /// Whether a normal (non-rescue) transition from `self` to `next` is allowed.
    pub fn can_advance_to(&self, next: RunState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// States from which `next` can be reached.
    pub fn predecessors_of(next: RunState) -> Vec<RunState> {
        [Self::NotStarted, Self::Running]
            .into_iter()
            .filter(|from| from.can_advance_to(next))
            .collect()
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed_with_errors" => Ok(Self::FailedWithErrors),
            other => Err(format!("unknown run state: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub state: RunState,
    pub trigger_input: HashMap<String, String>,
    /// Outcomes in dispatch order; at most one per action.
    pub action_outcomes: Vec<ActionOutcome>,
    pub failure_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    /// A fresh run in `NotStarted`.
    pub fn new(workflow_id: Uuid, trigger_input: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            state: RunState::NotStarted,
            trigger_input,
            action_outcomes: Vec::new(),
            failure_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}
