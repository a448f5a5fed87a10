//! Scheduler driver: the periodic trigger that pulls bounded batches of
//! work from the status queues and the event index, and hands each user to
//! the generation or adjustment workflow as an independent background task.
//!
//! The driver itself is single-threaded per invocation and never awaits
//! the per-user work it spawns; concurrency comes from the spawned tasks,
//! not shared-memory parallelism.

pub mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use nutriq_kv::{KvStore, keys};

use crate::events::Dispatcher;
use crate::status::{self, PlanStatus, queue};
use crate::workflow::PlanWorkflow;

use metrics::{STAGE_ADJUSTMENT, STAGE_EVENTS, STAGE_GENERATION, StageMetrics};

/// Tuning knobs for one scheduler invocation.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Users pulled from the pending queue per tick.
    pub generation_batch: usize,
    /// Events consumed from the index per tick.
    pub event_batch: usize,
    /// Principle adjustments triggered per tick.
    pub adjustment_batch: usize,
    /// Users whose last activity is older than this are skipped.
    pub inactivity_cutoff: chrono::Duration,
    /// Minimum gap between two adjustments for the same user.
    pub adjustment_interval: chrono::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            generation_batch: 5,
            event_batch: 10,
            adjustment_batch: 5,
            inactivity_cutoff: chrono::Duration::days(30),
            adjustment_interval: chrono::Duration::days(14),
        }
    }
}

/// What one tick accomplished.
#[derive(Debug, Default)]
pub struct TickReport {
    pub generation: StageMetrics,
    pub events: StageMetrics,
    pub adjustment: StageMetrics,
    handles: Vec<JoinHandle<()>>,
}

impl TickReport {
    pub fn total_processed(&self) -> u64 {
        self.generation.processed + self.events.processed + self.adjustment.processed
    }

    /// Await the background tasks this tick spawned. Production callers
    /// drop the report instead; the tasks keep running detached.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "scheduler background task panicked");
            }
        }
    }
}

/// The periodic driver.
pub struct Scheduler {
    kv: Arc<dyn KvStore>,
    workflow: Arc<dyn PlanWorkflow>,
    dispatcher: Dispatcher,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        kv: Arc<dyn KvStore>,
        workflow: Arc<dyn PlanWorkflow>,
        config: SchedulerConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&kv), Arc::clone(&workflow));
        Self {
            kv,
            workflow,
            dispatcher,
            config,
        }
    }

    /// Run one invocation: generation batch, event dispatch, adjustment
    /// batch, then metrics. Each stage's failure is caught so the later
    /// stages still run and whatever partial metrics were gathered are
    /// still written.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut report = TickReport::default();

        match self.generation_stage().await {
            Ok((stage, mut handles)) => {
                report.generation = stage;
                report.handles.append(&mut handles);
            }
            Err(e) => tracing::error!(error = %e, "generation stage failed"),
        }

        match self.event_stage().await {
            Ok((stage, mut handles)) => {
                report.events = stage;
                report.handles.append(&mut handles);
            }
            Err(e) => tracing::error!(error = %e, "event dispatch stage failed"),
        }

        match self.adjustment_stage(now).await {
            Ok((stage, mut handles)) => {
                report.adjustment = stage;
                report.handles.append(&mut handles);
            }
            Err(e) => tracing::error!(error = %e, "adjustment stage failed"),
        }

        metrics::accumulate(
            self.kv.as_ref(),
            now.date_naive(),
            &[
                (STAGE_GENERATION, report.generation),
                (STAGE_EVENTS, report.events),
                (STAGE_ADJUSTMENT, report.adjustment),
            ],
        )
        .await?;

        tracing::info!(
            generation = report.generation.processed,
            events = report.events.processed,
            adjustment = report.adjustment.processed,
            "scheduler tick complete"
        );
        Ok(report)
    }

    /// Tick on a fixed interval until cancelled.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) -> Result<()> {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        tracing::error!(error = %e, "scheduler tick failed");
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("scheduler run loop cancelled");
                    return Ok(());
                }
            }
        }
    }

    /// Stage 1: pull users from the pending queue and start generation.
    ///
    /// Users without questionnaire answers cannot be generated; they are
    /// parked in `pending_inputs` (an explicit terminal-until-resubmission
    /// state), never silently dropped. A store failure on one user puts
    /// that user and the rest of the dequeued batch back in the queue and
    /// ends the stage; already-started users keep running.
    async fn generation_stage(&self) -> Result<(StageMetrics, Vec<JoinHandle<()>>)> {
        let started = Instant::now();
        let users = queue::dequeue_batch(
            self.kv.as_ref(),
            keys::PENDING_PLAN_USERS,
            self.config.generation_batch,
        )
        .await?;

        let mut handles = Vec::new();
        let mut processed = 0u64;

        let mut users = users.into_iter();
        while let Some(user_id) = users.next() {
            match self.start_generation(&user_id).await {
                Ok(Some(handle)) => {
                    processed += 1;
                    handles.push(handle);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        user_id = %user_id,
                        error = %e,
                        "generation stage aborted mid-batch, requeueing the remainder"
                    );
                    for user in std::iter::once(user_id).chain(users) {
                        if let Err(re) =
                            queue::requeue(self.kv.as_ref(), keys::PENDING_PLAN_USERS, &user).await
                        {
                            tracing::error!(user_id = %user, error = %re, "requeue failed");
                        }
                    }
                    break;
                }
            }
        }

        Ok((
            StageMetrics {
                processed,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            handles,
        ))
    }

    /// Start plan generation for one dequeued user. Returns the spawned
    /// task handle, or `None` when the user was parked instead.
    async fn start_generation(&self, user_id: &str) -> Result<Option<JoinHandle<()>>> {
        let has_questionnaire = self.kv.get(&keys::questionnaire(user_id)).await?.is_some();
        if !has_questionnaire {
            tracing::warn!(user_id = %user_id, "questionnaire missing, parking user");
            status::set_status_with_message(
                self.kv.as_ref(),
                user_id,
                PlanStatus::PendingInputs,
                Some("questionnaire answers missing".to_string()),
            )
            .await?;
            return Ok(None);
        }

        status::set_status(self.kv.as_ref(), user_id, PlanStatus::Processing).await?;

        let kv = Arc::clone(&self.kv);
        let workflow = Arc::clone(&self.workflow);
        let user_id = user_id.to_string();
        Ok(Some(tokio::spawn(async move {
            if let Err(e) = workflow.process_plan(&user_id).await {
                tracing::error!(user_id = %user_id, error = %e, "plan generation failed");
                let _ = status::set_status_with_message(
                    kv.as_ref(),
                    &user_id,
                    PlanStatus::Error,
                    Some(format!("plan generation failed: {e:#}")),
                )
                .await;
            }
        })))
    }

    /// Stage 2: one dispatch pass over the event index.
    async fn event_stage(&self) -> Result<(StageMetrics, Vec<JoinHandle<()>>)> {
        let started = Instant::now();
        let batch = self.dispatcher.dispatch(self.config.event_batch).await?;
        let processed = batch.processed as u64;
        Ok((
            StageMetrics {
                processed,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            batch.into_handles(),
        ))
    }

    /// Stage 3: trigger principle adjustments for due, active users.
    ///
    /// Inactive users and users adjusted recently are requeued without
    /// consuming adjustment budget. At most one full pass over the queue's
    /// initial length, so requeued users cannot be examined twice in one
    /// tick.
    async fn adjustment_stage(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(StageMetrics, Vec<JoinHandle<()>>)> {
        let started = Instant::now();
        let queue_len = queue::read_queue(self.kv.as_ref(), keys::READY_PLAN_USERS)
            .await?
            .len();

        let mut handles = Vec::new();
        let mut triggered = 0u64;
        let mut examined = 0usize;

        while examined < queue_len && (triggered as usize) < self.config.adjustment_batch {
            let mut taken =
                queue::dequeue_batch(self.kv.as_ref(), keys::READY_PLAN_USERS, 1).await?;
            let Some(user_id) = taken.pop() else {
                break;
            };
            examined += 1;

            // Ready users always stay in the ready queue.
            queue::requeue(self.kv.as_ref(), keys::READY_PLAN_USERS, &user_id).await?;

            if !self.is_active(&user_id, now).await? {
                tracing::debug!(user_id = %user_id, "inactive user, skipping adjustment");
                continue;
            }
            if !self.adjustment_due(&user_id, now).await? {
                continue;
            }

            self.kv
                .put(&keys::last_adjustment(&user_id), &now.to_rfc3339())
                .await?;
            triggered += 1;

            let workflow = Arc::clone(&self.workflow);
            handles.push(tokio::spawn(async move {
                if let Err(e) = workflow.adjust_principles(&user_id).await {
                    // The plan stays ready; adjustment is retried on a
                    // later tick once the interval elapses again.
                    tracing::error!(user_id = %user_id, error = %e, "principle adjustment failed");
                }
            }));
        }

        Ok((
            StageMetrics {
                processed: triggered,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            handles,
        ))
    }

    /// A user is active when their last-activity stamp is within the
    /// cutoff. Users without a stamp (fresh signups) count as active.
    async fn is_active(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        match read_timestamp(self.kv.as_ref(), &keys::last_active(user_id)).await? {
            Some(last_active) => Ok(now - last_active <= self.config.inactivity_cutoff),
            None => Ok(true),
        }
    }

    /// Whether enough time has passed since the user's last adjustment.
    async fn adjustment_due(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        match read_timestamp(self.kv.as_ref(), &keys::last_adjustment(user_id)).await? {
            Some(last) => Ok(now - last >= self.config.adjustment_interval),
            None => Ok(true),
        }
    }
}

/// Parse an RFC 3339 timestamp value; unparsable stamps count as absent.
async fn read_timestamp(kv: &dyn KvStore, key: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = kv.get(key).await? else {
        return Ok(None);
    };
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "ignoring unparsable timestamp");
            Ok(None)
        }
    }
}
