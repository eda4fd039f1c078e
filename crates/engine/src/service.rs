//! Process-lifetime owner of the worker loops and the scheduler loop.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use queue::RunQueue;

use crate::executor::ActionGraphExecutor;
use crate::scheduler::{RecurringScheduler, SchedulerConfig};
use crate::store::RunStore;
use crate::worker::{WorkerConfig, WorkflowWorker};
use crate::EngineError;

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
}

/// Running background tasks of the engine.
///
/// Built with [`EngineService::start`] once per process and stopped with
/// [`EngineService::shutdown`], which cancels every loop and waits for them.
pub struct EngineService {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl EngineService {
    /// Rescue interrupted runs, then spawn the worker loops and the scheduler.
    ///
    /// `cancel` is the shared shutdown signal; it is also threaded into every
    /// run the workers execute.
    pub async fn start(
        config: EngineConfig,
        store: Arc<dyn RunStore>,
        queue: RunQueue,
        executor: Arc<ActionGraphExecutor>,
        cancel: CancellationToken,
    ) -> Result<Self, EngineError> {
        let worker = WorkflowWorker::new(store.clone(), queue.clone(), executor);
        worker.recover().await?;

        let mut tasks = JoinSet::new();
        let concurrency = config.worker.concurrency.max(1);
        for _ in 0..concurrency {
            let worker = worker.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { worker.run(cancel).await });
        }

        let scheduler = RecurringScheduler::new(store, queue, config.scheduler);
        {
            let cancel = cancel.clone();
            tasks.spawn(async move { scheduler.run(cancel).await });
        }

        info!(concurrency, "engine started");
        Ok(Self { cancel, tasks })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal every loop to stop and wait until they have.
    pub async fn shutdown(mut self) {
        info!("shutting down engine");
        self.cancel.cancel();

        while let Some(result) = self.tasks.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "engine task ended abnormally");
            }
        }
        info!("engine stopped");
    }
}
