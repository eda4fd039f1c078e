//! `MockProcessor` — a test double for `ActionProcessor`.
//!
//! Useful in unit and integration tests where a real processor is either
//! unavailable or irrelevant.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Action, ActionProcessingContext, ActionType};
use crate::resolver::resolve;
use crate::{ActionError, ActionProcessor, ParameterReference};

/// Behaviour injected into `MockProcessor` at construction time.
pub enum MockBehaviour {
    /// Succeed with a fixed payload.
    Succeed(String),
    /// Fail with an `External` error.
    Fail(String),
    /// Resolve the reference; succeed with its value or fail when it is absent.
    Echo(ParameterReference),
    /// Panic inside `process`.
    Panic(String),
    /// Wait for the run's cancellation token, then report cancellation.
    AwaitCancel,
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub action_id: Uuid,
    /// Ids of the outcomes visible to the processor at call time.
    pub visible_outcomes: Vec<Uuid>,
}

/// A mock processor that records every call it receives and returns a
/// programmer-specified result.
pub struct MockProcessor {
    action_type: ActionType,
    behaviour: MockBehaviour,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockProcessor {
    fn with_behaviour(action_type: ActionType, behaviour: MockBehaviour) -> Self {
        Self {
            action_type,
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock that always succeeds with `payload`.
    pub fn succeeding(action_type: ActionType, payload: impl Into<String>) -> Self {
        Self::with_behaviour(action_type, MockBehaviour::Succeed(payload.into()))
    }

    /// A mock that always fails with `message`.
    pub fn failing(action_type: ActionType, message: impl Into<String>) -> Self {
        Self::with_behaviour(action_type, MockBehaviour::Fail(message.into()))
    }

    /// A mock that succeeds with the resolved value of `reference`.
    pub fn echoing(action_type: ActionType, reference: ParameterReference) -> Self {
        Self::with_behaviour(action_type, MockBehaviour::Echo(reference))
    }

    /// A mock that panics with `message`.
    pub fn panicking(action_type: ActionType, message: impl Into<String>) -> Self {
        Self::with_behaviour(action_type, MockBehaviour::Panic(message.into()))
    }

    /// A mock that blocks until the run is cancelled.
    pub fn awaiting_cancel(action_type: ActionType) -> Self {
        Self::with_behaviour(action_type, MockBehaviour::AwaitCancel)
    }

    fn recorded(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of times this processor has been invoked.
    pub fn call_count(&self) -> usize {
        self.recorded().len()
    }

    /// Action ids in invocation order.
    pub fn called_actions(&self) -> Vec<Uuid> {
        self.recorded().iter().map(|c| c.action_id).collect()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.recorded().clone()
    }
}

#[async_trait]
impl ActionProcessor for MockProcessor {
    fn action_type(&self) -> ActionType {
        self.action_type
    }

    async fn process(
        &self,
        action: &Action,
        ctx: &ActionProcessingContext,
    ) -> Result<String, ActionError> {
        self.recorded().push(MockCall {
            action_id: action.id,
            visible_outcomes: ctx.outcomes.iter().map(|o| o.action_id).collect(),
        });

        match &self.behaviour {
            MockBehaviour::Succeed(payload) => Ok(payload.clone()),
            MockBehaviour::Fail(message) => Err(ActionError::External(message.clone())),
            MockBehaviour::Echo(reference) => {
                resolve(reference, ctx).ok_or_else(|| ActionError::MissingParameter {
                    parameter: "value".into(),
                    source_description: reference.to_string(),
                })
            }
            MockBehaviour::Panic(message) => panic!("{message}"),
            MockBehaviour::AwaitCancel => {
                ctx.cancel.cancelled().await;
                Err(ActionError::Cancelled(format!(
                    "action {} cancelled",
                    action.id
                )))
            }
        }
    }
}
