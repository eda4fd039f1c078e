//! Parameter resolution — turns a [`ParameterReference`] into a concrete value.
//!
//! Resolution is side-effect free: no network, no storage. A `None` result is
//! not an error by itself; each processor decides whether it is fatal, usually
//! through [`resolve_required`].

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ActionProcessingContext;
use crate::ActionError;

/// Provenance of a value an action consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterReference {
    /// A literal written into the workflow definition.
    Static { value: String },
    /// A key of the run's trigger input (case-sensitive).
    TriggerInput { key: String },
    /// The payload of an earlier action's successful outcome.
    ActionOutcome { action_id: Uuid },
}

impl ParameterReference {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Static { value: value.into() }
    }

    pub fn trigger(key: impl Into<String>) -> Self {
        Self::TriggerInput { key: key.into() }
    }

    pub fn outcome_of(action_id: Uuid) -> Self {
        Self::ActionOutcome { action_id }
    }
}

impl fmt::Display for ParameterReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static { .. } => write!(f, "static value"),
            Self::TriggerInput { key } => write!(f, "trigger input '{key}'"),
            Self::ActionOutcome { action_id } => write!(f, "outcome of action {action_id}"),
        }
    }
}

/// Resolve `reference` against the run context.
///
/// An `ActionOutcome` reference matches the outcome whose `action_id` equals
/// the referenced id, and yields its payload only when that outcome succeeded.
pub fn resolve(reference: &ParameterReference, ctx: &ActionProcessingContext) -> Option<String> {
    match reference {
        ParameterReference::Static { value } => Some(value.clone()),
        ParameterReference::TriggerInput { key } => ctx.execution.trigger_input.get(key).cloned(),
        ParameterReference::ActionOutcome { action_id } => ctx
            .outcome_for(*action_id)
            .filter(|outcome| outcome.is_success())
            .and_then(|outcome| outcome.outcome_json.clone()),
    }
}

/// Resolve a parameter the caller cannot do without.
///
/// # Errors
/// [`ActionError::MissingParameter`] naming `parameter` and the reference.
pub fn resolve_required(
    parameter: &str,
    reference: &ParameterReference,
    ctx: &ActionProcessingContext,
) -> Result<String, ActionError> {
    resolve(reference, ctx).ok_or_else(|| ActionError::MissingParameter {
        parameter: parameter.to_owned(),
        source_description: reference.to_string(),
    })
}

/// Resolve an optional parameter; an absent reference and an unresolved one
/// both yield `None`.
pub fn resolve_optional(
    reference: Option<&ParameterReference>,
    ctx: &ActionProcessingContext,
) -> Option<String> {
    reference.and_then(|r| resolve(r, ctx))
}
