//! Action-level error types.

use thiserror::Error;

use crate::models::ActionType;

/// Why an action finished with `Failure`.
///
/// A processor returning `Err` *is* the failure outcome; the executor records
/// `to_string()` as the outcome's message.
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// A required parameter did not resolve.
    #[error("missing required parameter '{parameter}' (from {source_description})")]
    MissingParameter {
        parameter: String,
        source_description: String,
    },

    /// The action's input resolved but is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An external dependency (registrar, HTTP endpoint, mailer, …) failed.
    #[error("external call failed: {0}")]
    External(String),

    /// A polled job did not reach a terminal state before the ceiling.
    #[error("{0}")]
    TimedOut(String),

    /// The operation was cancelled; the caller must stop as well.
    #[error("{0}")]
    Cancelled(String),

    /// No processor is registered for the action's type.
    #[error("no processor registered for action type '{0}'")]
    NoProcessor(ActionType),

    /// The processor panicked.
    #[error("processor panicked: {0}")]
    Panicked(String),
}

impl ActionError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Errors raised by a registrar transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registrar responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed registrar response: {0}")]
    Decode(#[from] serde_json::Error),
}
