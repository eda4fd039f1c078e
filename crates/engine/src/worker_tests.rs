//! Scenario tests for the processing worker: startup rescue, the soft lock,
//! per-run fault isolation and shutdown behaviour. Runs against `MemoryStore`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use actions::mock::MockProcessor;
use actions::models::ValidateRulesInput;
use actions::{
    Action, ActionInput, ActionOutcome, ActionType, ProcessorRegistry, Workflow, WorkflowState,
};
use queue::RunQueue;

use crate::executor::ActionGraphExecutor;
use crate::store::{MemoryStore, RunStore};
use crate::service::{EngineConfig, EngineService};
use crate::worker::{WorkerConfig, WorkflowWorker};
use crate::{Run, RunState, StoreError};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn validation_action() -> Action {
    Action::new(ActionInput::ValidateRules(ValidateRulesInput { rules: vec![] }))
}

fn two_step_workflow() -> Workflow {
    let a = validation_action();
    let b = validation_action().after(a.id);
    Workflow::new("two-step", WorkflowState::ActiveExternalTrigger, vec![a, b])
}

struct Harness {
    store: Arc<MemoryStore>,
    queue: RunQueue,
    worker: WorkflowWorker,
    processor: Arc<MockProcessor>,
}

fn harness_with(store: Arc<dyn RunStore>, memory: Arc<MemoryStore>, processor: MockProcessor) -> Harness {
    let processor = Arc::new(processor);
    let executor = Arc::new(ActionGraphExecutor::new(
        ProcessorRegistry::new().with(processor.clone()),
    ));
    let queue = RunQueue::new();
    let worker = WorkflowWorker::new(store, queue.clone(), executor);
    Harness {
        store: memory,
        queue,
        worker,
        processor,
    }
}

fn harness(processor: MockProcessor) -> Harness {
    let store = Arc::new(MemoryStore::new());
    harness_with(store.clone(), store, processor)
}

async fn wait_until_terminal(store: &MemoryStore, run_ids: &[Uuid]) {
    for _ in 0..200 {
        let mut done = true;
        for id in run_ids {
            done &= store.get_run(*id).await.unwrap().state.is_terminal();
        }
        if done {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("runs did not finish in time");
}

// ============================================================
// Startup rescue
// ============================================================

#[tokio::test]
async fn recover_resets_running_runs_and_enqueues_unfinished_ones_once() {
    let h = harness(MockProcessor::succeeding(ActionType::ValidateRules, "{}"));
    let workflow = two_step_workflow();
    h.store.save_workflow(&workflow).await.unwrap();

    let waiting = h.store.create_run(workflow.id, HashMap::new()).await.unwrap();
    let interrupted = h.store.create_run(workflow.id, HashMap::new()).await.unwrap();
    let finished = h.store.create_run(workflow.id, HashMap::new()).await.unwrap();

    h.store.try_start_run(interrupted.id).await.unwrap();
    let mut partial = ActionOutcome::pending(workflow.actions[0].id);
    partial.finish_with_success("{}").unwrap();
    h.store.append_action_outcome(interrupted.id, &partial).await.unwrap();

    h.store.try_start_run(finished.id).await.unwrap();
    h.store.finish_run(finished.id, RunState::Success, None).await.unwrap();

    assert_eq!(h.worker.recover().await.unwrap(), 2);
    assert_eq!(h.queue.len(), 2);

    let rescued = h.store.get_run(interrupted.id).await.unwrap();
    assert_eq!(rescued.state, RunState::NotStarted);
    assert!(rescued.action_outcomes.is_empty());
    assert!(rescued.started_at.is_none());

    let cancel = CancellationToken::new();
    let mut queued = vec![
        h.queue.dequeue(&cancel).await.unwrap(),
        h.queue.dequeue(&cancel).await.unwrap(),
    ];
    queued.sort();
    let mut expected = vec![waiting.id, interrupted.id];
    expected.sort();
    assert_eq!(queued, expected);
    assert!(h.queue.is_empty());
}

// ============================================================
// Per-run processing
// ============================================================

#[tokio::test]
async fn process_run_persists_outcomes_and_final_state() {
    let h = harness(MockProcessor::succeeding(ActionType::ValidateRules, "{\"ok\":true}"));
    let workflow = two_step_workflow();
    h.store.save_workflow(&workflow).await.unwrap();
    let run = h.store.create_run(workflow.id, HashMap::new()).await.unwrap();

    let state = h.worker.process_run(run.id, CancellationToken::new()).await.unwrap();

    assert_eq!(state, Some(RunState::Success));
    let stored = h.store.get_run(run.id).await.unwrap();
    assert_eq!(stored.state, RunState::Success);
    assert!(stored.started_at.is_some() && stored.finished_at.is_some());
    let ids: Vec<Uuid> = stored.action_outcomes.iter().map(|o| o.action_id).collect();
    assert_eq!(ids, vec![workflow.actions[0].id, workflow.actions[1].id]);
}

#[tokio::test]
async fn failed_actions_finish_the_run_with_errors() {
    let h = harness(MockProcessor::failing(ActionType::ValidateRules, "nope"));
    let workflow = two_step_workflow();
    h.store.save_workflow(&workflow).await.unwrap();
    let run = h.store.create_run(workflow.id, HashMap::new()).await.unwrap();

    h.worker.process_run(run.id, CancellationToken::new()).await.unwrap();

    let stored = h.store.get_run(run.id).await.unwrap();
    assert_eq!(stored.state, RunState::FailedWithErrors);
    assert!(stored.failure_message.unwrap().starts_with("2 of 2 actions failed"));
}

#[tokio::test]
async fn run_claimed_elsewhere_is_skipped() {
    let h = harness(MockProcessor::succeeding(ActionType::ValidateRules, "{}"));
    let workflow = two_step_workflow();
    h.store.save_workflow(&workflow).await.unwrap();
    let run = h.store.create_run(workflow.id, HashMap::new()).await.unwrap();
    assert!(h.store.try_start_run(run.id).await.unwrap());

    let state = h.worker.process_run(run.id, CancellationToken::new()).await.unwrap();

    assert_eq!(state, None);
    assert_eq!(h.processor.call_count(), 0);
    assert_eq!(h.store.get_run(run.id).await.unwrap().state, RunState::Running);
}

// ============================================================
// Worker loop
// ============================================================

async fn run_worker_until_terminal(h: &Harness, run_ids: &[Uuid]) {
    let cancel = CancellationToken::new();
    let task = {
        let worker = h.worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(cancel).await })
    };

    wait_until_terminal(&h.store, run_ids).await;
    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn loop_isolates_a_broken_run_from_the_next_one() {
    let memory = Arc::new(MemoryStore::new());
    let workflow = two_step_workflow();
    let vanished = two_step_workflow();
    memory.save_workflow(&workflow).await.unwrap();
    memory.save_workflow(&vanished).await.unwrap();
    let orphan = memory.create_run(vanished.id, HashMap::new()).await.unwrap();
    let healthy = memory.create_run(workflow.id, HashMap::new()).await.unwrap();

    let store = Arc::new(FaultyStore {
        inner: memory.clone(),
        missing_workflow: Some(vanished.id),
        panic_on_run: None,
    });
    let h = harness_with(store, memory, MockProcessor::succeeding(ActionType::ValidateRules, "{}"));
    h.queue.enqueue(orphan.id).unwrap();
    h.queue.enqueue(healthy.id).unwrap();

    run_worker_until_terminal(&h, &[orphan.id, healthy.id]).await;

    let orphan = h.store.get_run(orphan.id).await.unwrap();
    assert_eq!(orphan.state, RunState::FailedWithErrors);
    assert!(orphan.failure_message.unwrap().contains("not found"));
    assert_eq!(h.store.get_run(healthy.id).await.unwrap().state, RunState::Success);
}

#[tokio::test]
async fn panic_while_handling_a_run_fails_only_that_run() {
    let memory = Arc::new(MemoryStore::new());
    let workflow = two_step_workflow();
    memory.save_workflow(&workflow).await.unwrap();
    let cursed = memory.create_run(workflow.id, HashMap::new()).await.unwrap();
    let fine = memory.create_run(workflow.id, HashMap::new()).await.unwrap();

    let store = Arc::new(FaultyStore {
        inner: memory.clone(),
        missing_workflow: None,
        panic_on_run: Some(cursed.id),
    });
    let h = harness_with(store, memory, MockProcessor::succeeding(ActionType::ValidateRules, "{}"));
    h.queue.enqueue(cursed.id).unwrap();
    h.queue.enqueue(fine.id).unwrap();

    run_worker_until_terminal(&h, &[cursed.id, fine.id]).await;

    let cursed = h.store.get_run(cursed.id).await.unwrap();
    assert_eq!(cursed.state, RunState::FailedWithErrors);
    assert!(cursed.failure_message.unwrap().contains("store exploded"));
    assert_eq!(h.store.get_run(fine.id).await.unwrap().state, RunState::Success);
}

#[tokio::test(start_paused = true)]
async fn shutdown_mid_run_leaves_it_for_the_next_startup() {
    let h = harness(MockProcessor::awaiting_cancel(ActionType::ValidateRules));
    let workflow = two_step_workflow();
    h.store.save_workflow(&workflow).await.unwrap();
    let run = h.store.create_run(workflow.id, HashMap::new()).await.unwrap();
    h.queue.enqueue(run.id).unwrap();

    let cancel = CancellationToken::new();
    let task = {
        let worker = h.worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.run(cancel).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(h.processor.call_count(), 1);
    assert_eq!(h.store.get_run(run.id).await.unwrap().state, RunState::Running);

    // Next process start.
    assert_eq!(h.worker.recover().await.unwrap(), 1);
    let rescued = h.store.get_run(run.id).await.unwrap();
    assert_eq!(rescued.state, RunState::NotStarted);
    assert!(rescued.action_outcomes.is_empty());
    assert_eq!(h.queue.len(), 1);
}

// ---------------------------------------------------------------------------
// Faulty store
// ---------------------------------------------------------------------------

/// Delegates to a `MemoryStore`, except that one workflow can be reported as
/// missing and loading one run can panic.
struct FaultyStore {
    inner: Arc<MemoryStore>,
    missing_workflow: Option<Uuid>,
    panic_on_run: Option<Uuid>,
}

#[async_trait]
impl RunStore for FaultyStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        self.inner.save_workflow(workflow).await
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        if self.missing_workflow == Some(id) {
            return Err(StoreError::NotFound { entity: "workflow", id });
        }
        self.inner.get_workflow(id).await
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        self.inner.list_workflows().await
    }

    async fn list_recurring_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        self.inner.list_recurring_workflows().await
    }

    async fn create_run(
        &self,
        workflow_id: Uuid,
        trigger_input: HashMap<String, String>,
    ) -> Result<Run, StoreError> {
        self.inner.create_run(workflow_id, trigger_input).await
    }

    async fn get_run(&self, id: Uuid) -> Result<Run, StoreError> {
        if self.panic_on_run == Some(id) {
            panic!("store exploded");
        }
        self.inner.get_run(id).await
    }

    async fn try_start_run(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.try_start_run(id).await
    }

    async fn finish_run(
        &self,
        id: Uuid,
        state: RunState,
        failure_message: Option<&str>,
    ) -> Result<(), StoreError> {
        self.inner.finish_run(id, state, failure_message).await
    }

    async fn append_action_outcome(
        &self,
        run_id: Uuid,
        outcome: &ActionOutcome,
    ) -> Result<(), StoreError> {
        self.inner.append_action_outcome(run_id, outcome).await
    }

    async fn list_runs_in_states(&self, states: &[RunState]) -> Result<Vec<Run>, StoreError> {
        self.inner.list_runs_in_states(states).await
    }

    async fn reset_run(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.reset_run(id).await
    }
}

// ============================================================
// Engine service lifetime
// ============================================================

#[tokio::test]
async fn engine_service_rescues_then_runs_and_stops_its_loops() {
    let store = Arc::new(MemoryStore::new());
    let processor = Arc::new(MockProcessor::succeeding(ActionType::ValidateRules, "{}"));
    let executor = Arc::new(ActionGraphExecutor::new(
        ProcessorRegistry::new().with(processor.clone()),
    ));
    let queue = RunQueue::new();

    let workflow = two_step_workflow();
    store.save_workflow(&workflow).await.unwrap();
    let interrupted = store.create_run(workflow.id, HashMap::new()).await.unwrap();
    store.try_start_run(interrupted.id).await.unwrap();

    let config = EngineConfig {
        worker: WorkerConfig { concurrency: 2 },
        ..EngineConfig::default()
    };
    let service = EngineService::start(
        config,
        store.clone(),
        queue.clone(),
        executor,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    wait_until_terminal(&store, &[interrupted.id]).await;
    service.shutdown().await;

    let rescued = store.get_run(interrupted.id).await.unwrap();
    assert_eq!(rescued.state, RunState::Success);
    assert_eq!(rescued.action_outcomes.len(), 2);
    // Rescued and enqueued once, so each action ran exactly once.
    assert_eq!(processor.call_count(), 2);
    assert!(queue.is_empty());

    // Loops are gone: a run enqueued after shutdown stays untouched.
    let late = store.create_run(workflow.id, HashMap::new()).await.unwrap();
    queue.enqueue(late.id).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.get_run(late.id).await.unwrap().state, RunState::NotStarted);
    assert_eq!(processor.call_count(), 2);
}
