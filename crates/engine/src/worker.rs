//! Workflow processing worker.
//!
//! On startup [`WorkflowWorker::recover`] puts interrupted runs back on the
//! queue. In steady state [`WorkflowWorker::run`] dequeues run ids, claims
//! each run through the `NotStarted -> Running` transition, executes it and
//! persists the result. A failure or panic while handling one run marks that
//! run `FailedWithErrors` and the loop moves on.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use actions::ExecutionContext;
use queue::{QueueError, RunQueue};

use crate::executor::{panic_message, ActionGraphExecutor};
use crate::store::RunStore;
use crate::{EngineError, RunState};

/// Number of concurrent worker loops.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

#[derive(Clone)]
pub struct WorkflowWorker {
    store: Arc<dyn RunStore>,
    queue: RunQueue,
    executor: Arc<ActionGraphExecutor>,
}

impl WorkflowWorker {
    pub fn new(store: Arc<dyn RunStore>, queue: RunQueue, executor: Arc<ActionGraphExecutor>) -> Self {
        Self {
            store,
            queue,
            executor,
        }
    }

    /// Startup rescue: reset every `Running` run to `NotStarted` and enqueue
    /// every unfinished run once.
    ///
    /// A run found in `Running` was interrupted with unknown progress, so it
    /// restarts from scratch and its side effects may repeat.
    ///
    /// Returns the number of runs enqueued.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let pending = self
            .store
            .list_runs_in_states(&[RunState::NotStarted, RunState::Running])
            .await?;

        for run in &pending {
            if run.state == RunState::Running {
                warn!(run_id = %run.id, "resetting interrupted run");
                self.store.reset_run(run.id).await?;
            }
            self.queue.enqueue(run.id)?;
        }

        info!("re-enqueued {} unfinished runs", pending.len());
        Ok(pending.len())
    }

    /// Process runs until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("worker loop started");

        loop {
            let run_id = match self.queue.dequeue(&cancel).await {
                Ok(run_id) => run_id,
                Err(QueueError::Cancelled) => break,
                Err(QueueError::Closed) => {
                    error!("run queue closed, stopping worker");
                    break;
                }
            };

            self.handle(run_id, &cancel).await;
        }

        info!("worker loop stopped");
    }

    /// Process one run, isolating the loop from its failures.
    async fn handle(&self, run_id: Uuid, cancel: &CancellationToken) {
        let result = AssertUnwindSafe(self.process_run(run_id, cancel.clone()))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(Some(state))) => info!(%run_id, %state, "run finished"),
            Ok(Ok(None)) => debug!(%run_id, "run already claimed, skipping"),
            Ok(Err(EngineError::Cancelled)) => {
                warn!(%run_id, "run interrupted by shutdown; it will be rescued on restart");
            }
            Ok(Err(err)) => self.fail_run(run_id, &err.to_string()).await,
            Err(panic) => {
                let message = format!("worker panicked: {}", panic_message(panic.as_ref()));
                self.fail_run(run_id, &message).await;
            }
        }
    }

    /// Claim, execute and persist one run.
    ///
    /// Returns `Ok(None)` when the run was not in `NotStarted`, meaning
    /// another worker owns it or it is already finished.
    #[instrument(skip(self, cancel))]
    pub async fn process_run(
        &self,
        run_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<Option<RunState>, EngineError> {
        if !self.store.try_start_run(run_id).await? {
            return Ok(None);
        }

        let run = self.store.get_run(run_id).await?;
        let workflow = self.store.get_workflow(run.workflow_id).await?;

        let execution = ExecutionContext {
            correlation_id: run.id,
            trigger_input: run.trigger_input,
        };
        let report = self
            .executor
            .execute(Arc::new(workflow), execution, cancel)
            .await?;

        for outcome in &report.outcomes {
            self.store.append_action_outcome(run_id, outcome).await?;
        }
        self.store
            .finish_run(run_id, report.state, report.failure_message.as_deref())
            .await?;

        Ok(Some(report.state))
    }

    async fn fail_run(&self, run_id: Uuid, message: &str) {
        error!(%run_id, error = %message, "run failed");
        if let Err(err) = self
            .store
            .finish_run(run_id, RunState::FailedWithErrors, Some(message))
            .await
        {
            error!(%run_id, error = %err, "could not record run failure");
        }
    }
}
