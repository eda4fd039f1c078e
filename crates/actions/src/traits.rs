//! The `ActionProcessor` trait — the contract every processor must fulfil.

use async_trait::async_trait;

use crate::models::{Action, ActionProcessingContext, ActionType};
use crate::ActionError;

/// Handles every action of a single [`ActionType`].
///
/// Contract:
/// - resolve all of the action's parameter references before acting;
/// - `Ok(payload)` becomes a `Success` outcome carrying `payload`;
/// - `Err(e)` becomes a `Failure` outcome carrying `e.to_string()`;
/// - expected problems (missing parameter, malformed input, external error)
///   are returned as `Err`, never raised as a panic.
#[async_trait]
pub trait ActionProcessor: Send + Sync {
    fn action_type(&self) -> ActionType;

    async fn process(
        &self,
        action: &Action,
        ctx: &ActionProcessingContext,
    ) -> Result<String, ActionError>;
}
