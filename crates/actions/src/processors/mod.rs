//! Built-in processors.
//!
//! Processors whose work is owned by an outside system (mail delivery,
//! credential signing) take that system as a trait object.

pub mod credential;
pub mod did;
pub mod email;
pub mod http_call;
pub mod validate;

pub use credential::{CredentialService, IssueCredentialProcessor, VerifyCredentialProcessor};
pub use did::DidProcessor;
pub use email::{EmailMessage, Mailer, SendEmailProcessor};
pub use http_call::HttpCallProcessor;
pub use validate::ValidateRulesProcessor;

use crate::models::{Action, ActionType};
use crate::ActionError;

/// Error for an action whose payload does not match the processor it was
/// routed to.
pub(crate) fn unexpected_input(expected: ActionType, action: &Action) -> ActionError {
    ActionError::InvalidInput(format!(
        "expected {expected} input, got {}",
        action.action_type()
    ))
}
