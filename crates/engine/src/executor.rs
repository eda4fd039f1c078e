//! Action graph executor.
//!
//! `ActionGraphExecutor` runs one workflow for one run:
//! 1. Validates the action graph; an invalid graph fails the run before any
//!    action is dispatched.
//! 2. Repeatedly dispatches the first declared action whose `run_after`
//!    predecessors all have an outcome. Upstream *completion* gates
//!    execution, not upstream success.
//! 3. Records each processor result as that action's outcome and makes it
//!    visible to later actions.
//! 4. Converts processor panics and missing registrations into `Failure`
//!    outcomes; one action's crash never aborts the run.
//! 5. Derives the run state: `Success` iff every outcome succeeded.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use actions::{
    Action, ActionError, ActionOutcome, ActionProcessingContext, ExecutionContext,
    ProcessorRegistry,
};

use crate::dag::validate_dag;
use crate::{EngineError, RunState, Workflow};

// ---------------------------------------------------------------------------
// Output of a completed execution
// ---------------------------------------------------------------------------

/// The result of running every action of a workflow once.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// `Success` or `FailedWithErrors`.
    pub state: RunState,
    /// One outcome per dispatched action, in dispatch order.
    pub outcomes: Vec<ActionOutcome>,
    /// Aggregated message when `state` is `FailedWithErrors`.
    pub failure_message: Option<String>,
}

impl RunReport {
    fn invalid_graph(err: &EngineError) -> Self {
        Self {
            state: RunState::FailedWithErrors,
            outcomes: Vec::new(),
            failure_message: Some(format!("invalid workflow graph: {err}")),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionGraphExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator that runs a single workflow execution.
pub struct ActionGraphExecutor {
    registry: ProcessorRegistry,
}

impl ActionGraphExecutor {
    pub fn new(registry: ProcessorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Execute every action of `workflow` exactly once.
    ///
    /// # Errors
    /// Only [`EngineError::Cancelled`] (when `cancel` fires or a processor
    /// reports cancellation) and outcome bookkeeping errors escape; action
    /// failures are reported through the returned [`RunReport`].
    #[instrument(
        skip(self, workflow, execution, cancel),
        fields(workflow_id = %workflow.id, correlation_id = %execution.correlation_id)
    )]
    pub async fn execute(
        &self,
        workflow: Arc<Workflow>,
        execution: ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<RunReport, EngineError> {
        // ------------------------------------------------------------------
        // Validate the action graph.
        // ------------------------------------------------------------------
        if let Err(err) = validate_dag(&workflow) {
            error!(error = %err, "refusing to execute invalid workflow graph");
            return Ok(RunReport::invalid_graph(&err));
        }

        info!("executing {} actions", workflow.actions.len());

        let mut ctx = ActionProcessingContext::new(execution, workflow.clone(), cancel);

        // ------------------------------------------------------------------
        // Dispatch eligible actions one at a time.
        // ------------------------------------------------------------------
        while let Some(action) = next_eligible(&workflow, &ctx.outcomes) {
            if ctx.cancel.is_cancelled() {
                warn!("execution cancelled before dispatching {}", action.label());
                return Err(EngineError::Cancelled);
            }

            let (outcome, cancelled) = self.dispatch(action, &ctx).await?;
            ctx.outcomes.push(outcome);

            if cancelled {
                warn!("action {} was cancelled, aborting run", action.label());
                return Err(EngineError::Cancelled);
            }
        }

        Ok(summarise(&workflow, ctx.outcomes))
    }

    /// Run one action's processor and record its result.
    ///
    /// Returns the finished outcome and whether the processor reported
    /// cancellation.
    async fn dispatch(
        &self,
        action: &Action,
        ctx: &ActionProcessingContext,
    ) -> Result<(ActionOutcome, bool), EngineError> {
        let mut outcome = ActionOutcome::pending(action.id);
        let action_type = action.action_type();

        let result = match self.registry.get(action_type) {
            None => Err(ActionError::NoProcessor(action_type)),
            Some(processor) => AssertUnwindSafe(processor.process(action, ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(ActionError::Panicked(panic_message(panic.as_ref())))),
        };

        let cancelled = matches!(&result, Err(e) if e.is_cancellation());
        match result {
            Ok(payload) => {
                info!(action_id = %action.id, %action_type, "action succeeded");
                outcome.finish_with_success(payload)?;
            }
            Err(err) => {
                warn!(action_id = %action.id, %action_type, error = %err, "action failed");
                outcome.finish_with_failure(err.to_string())?;
            }
        }

        Ok((outcome, cancelled))
    }
}

/// The first declared action without an outcome whose predecessors all have one.
fn next_eligible<'w>(workflow: &'w Workflow, outcomes: &[ActionOutcome]) -> Option<&'w Action> {
    let has_outcome = |id: &uuid::Uuid| outcomes.iter().any(|o| o.action_id == *id);

    workflow
        .actions
        .iter()
        .find(|action| !has_outcome(&action.id) && action.run_after.iter().all(has_outcome))
}

fn summarise(workflow: &Workflow, outcomes: Vec<ActionOutcome>) -> RunReport {
    let failures: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| {
            let label = workflow
                .action(o.action_id)
                .map(Action::label)
                .unwrap_or_else(|| o.action_id.to_string());
            let message = o.failure_message().unwrap_or_else(|| "no message".into());
            format!("{label}: {message}")
        })
        .collect();

    if failures.is_empty() {
        info!("all {} actions succeeded", outcomes.len());
        return RunReport {
            state: RunState::Success,
            outcomes,
            failure_message: None,
        };
    }

    let message = format!(
        "{} of {} actions failed: {}",
        failures.len(),
        outcomes.len(),
        failures.join("; ")
    );
    warn!(%message, "run finished with errors");

    RunReport {
        state: RunState::FailedWithErrors,
        outcomes,
        failure_message: Some(message),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
