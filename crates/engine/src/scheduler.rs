//! Recurring trigger scheduler.
//!
//! Every tick, each `ActiveRecurring` workflow whose cron expression has an
//! occurrence in `(now - tick, now]` gets one new run, which is enqueued.
//! Consecutive ticks cover adjacent windows, so an occurrence is scheduled
//! once. A tick that fires late leaves a gap and the occurrences inside it
//! are missed; the window always follows the wall clock.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use cron::Schedule;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use queue::RunQueue;

use crate::store::RunStore;
use crate::{EngineError, Workflow};

pub const DEFAULT_TICK: Duration = Duration::from_secs(30);

/// Trigger input key carrying the occurrence a scheduled run was created for.
pub const SCHEDULED_AT_KEY: &str = "scheduled_at";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick: DEFAULT_TICK }
    }
}

/// Parse a cron expression.
///
/// Five-field expressions (`min hour dom month dow`) are accepted and run at
/// second zero; six and seven field expressions start with seconds.
pub fn parse_cron(expression: &str) -> Result<Schedule, EngineError> {
    let trimmed = expression.trim();
    let normalised = match trimmed.split_whitespace().count() {
        5 => format!("0 {trimmed}"),
        _ => trimmed.to_owned(),
    };

    Schedule::from_str(&normalised).map_err(|err| EngineError::Cron {
        expression: expression.to_owned(),
        message: err.to_string(),
    })
}

/// The first occurrence of `schedule` in `(now - window, now]`, if any.
pub fn occurrence_in_window(
    schedule: &Schedule,
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> Option<DateTime<Utc>> {
    schedule
        .after(&(now - window))
        .next()
        .filter(|occurrence| *occurrence <= now)
}

pub struct RecurringScheduler {
    store: Arc<dyn RunStore>,
    queue: RunQueue,
    config: SchedulerConfig,
}

impl RecurringScheduler {
    pub fn new(store: Arc<dyn RunStore>, queue: RunQueue, config: SchedulerConfig) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// Scan once per tick until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(tick = ?self.config.tick, "scheduler started");

        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.scan(Utc::now()).await {
                        error!(error = %err, "scheduler scan failed");
                    }
                }
            }
        }

        info!("scheduler stopped");
    }

    /// Create and enqueue a run for every recurring workflow due in the window
    /// ending at `now`. Returns the ids of the created runs.
    ///
    /// A workflow with a missing or invalid expression is skipped.
    #[instrument(skip(self))]
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, EngineError> {
        let window = match chrono::Duration::from_std(self.config.tick) {
            Ok(window) => window,
            Err(err) => {
                error!(tick = ?self.config.tick, error = %err, "scheduler tick out of range, skipping scan");
                return Ok(Vec::new());
            }
        };
        let workflows = self.store.list_recurring_workflows().await?;
        let mut created = Vec::new();

        for workflow in &workflows {
            let Some(occurrence) = due_occurrence(workflow, now, window) else {
                continue;
            };

            match self.schedule(workflow, occurrence).await {
                Ok(run_id) => created.push(run_id),
                Err(err) => {
                    error!(workflow_id = %workflow.id, error = %err, "could not schedule run");
                }
            }
        }

        debug!("scanned {} recurring workflows, created {} runs", workflows.len(), created.len());
        Ok(created)
    }

    async fn schedule(
        &self,
        workflow: &Workflow,
        occurrence: DateTime<Utc>,
    ) -> Result<Uuid, EngineError> {
        let trigger_input = HashMap::from([(
            SCHEDULED_AT_KEY.to_owned(),
            occurrence.to_rfc3339_opts(SecondsFormat::Secs, true),
        )]);

        let run = self.store.create_run(workflow.id, trigger_input).await?;
        self.queue.enqueue(run.id)?;

        info!(workflow_id = %workflow.id, run_id = %run.id, %occurrence, "scheduled run");
        Ok(run.id)
    }
}

fn due_occurrence(
    workflow: &Workflow,
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> Option<DateTime<Utc>> {
    let Some(expression) = workflow.cron_expression.as_deref() else {
        warn!(workflow_id = %workflow.id, "recurring workflow has no cron expression, skipping");
        return None;
    };

    match parse_cron(expression) {
        Ok(schedule) => occurrence_in_window(&schedule, now, window),
        Err(err) => {
            warn!(workflow_id = %workflow.id, error = %err, "skipping workflow");
            None
        }
    }
}
