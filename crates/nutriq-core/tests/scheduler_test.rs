//! Integration tests driving whole scheduler ticks against the in-memory
//! store with a recording workflow double.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use nutriq_core::events::{self, EventType};
use nutriq_core::scheduler::metrics::{STAGE_GENERATION, get_queue_metrics};
use nutriq_core::scheduler::{Scheduler, SchedulerConfig};
use nutriq_core::status::{self, PlanStatus, queue};
use nutriq_kv::{KvStore, keys};
use nutriq_test_utils::{RecordingWorkflow, memory_kv, seed_last_active, seed_questionnaire};

fn scheduler(
    kv: &Arc<dyn KvStore>,
    workflow: &Arc<RecordingWorkflow>,
    config: SchedulerConfig,
) -> Scheduler {
    Scheduler::new(
        Arc::clone(kv),
        Arc::clone(workflow) as Arc<dyn nutriq_core::workflow::PlanWorkflow>,
        config,
    )
}

#[tokio::test]
async fn generation_stage_is_bounded_and_starts_processing() {
    let kv = memory_kv();
    let workflow = RecordingWorkflow::new();
    for user in ["u1", "u2", "u3", "u4"] {
        seed_questionnaire(kv.as_ref(), user).await.unwrap();
        status::set_status(kv.as_ref(), user, PlanStatus::Pending)
            .await
            .unwrap();
    }

    let config = SchedulerConfig {
        generation_batch: 2,
        ..SchedulerConfig::default()
    };
    let driver = scheduler(&kv, &workflow, config);

    let report = driver.tick(Utc::now()).await.unwrap();
    assert_eq!(report.generation.processed, 2);
    report.join().await;

    let mut generated = workflow.users_for("process_plan");
    generated.sort();
    assert_eq!(generated, vec!["u1", "u2"]);
    let remaining = queue::read_queue(kv.as_ref(), keys::PENDING_PLAN_USERS)
        .await
        .unwrap();
    assert_eq!(remaining, vec!["u3", "u4"]);

    for user in ["u1", "u2"] {
        let record = status::get_status(kv.as_ref(), user).await.unwrap().unwrap();
        assert_eq!(record.status, PlanStatus::Processing);
    }
}

#[tokio::test]
async fn users_without_questionnaire_are_parked_not_dropped() {
    let kv = memory_kv();
    let workflow = RecordingWorkflow::new();

    seed_questionnaire(kv.as_ref(), "ready_user").await.unwrap();
    status::set_status(kv.as_ref(), "bare_user", PlanStatus::Pending)
        .await
        .unwrap();
    status::set_status(kv.as_ref(), "ready_user", PlanStatus::Pending)
        .await
        .unwrap();

    let driver = scheduler(&kv, &workflow, SchedulerConfig::default());
    let report = driver.tick(Utc::now()).await.unwrap();
    report.join().await;

    // Only the seeded user counts as processed.
    assert_eq!(workflow.users_for("process_plan"), vec!["ready_user"]);

    let parked = status::get_status(kv.as_ref(), "bare_user")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(parked.status, PlanStatus::PendingInputs);
    assert_eq!(
        parked.message.as_deref(),
        Some("questionnaire answers missing")
    );
    // Parked users sit in neither queue until inputs arrive.
    assert!(
        queue::read_queue(kv.as_ref(), keys::PENDING_PLAN_USERS)
            .await
            .unwrap()
            .is_empty()
    );
}

/// Store wrapper that fails every `get` of one configured key.
struct FaultyKeyKv {
    inner: Arc<dyn KvStore>,
    fail_key: String,
}

#[async_trait::async_trait]
impl KvStore for FaultyKeyKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        if key == self.fail_key {
            anyhow::bail!("simulated store failure for {key}");
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.inner.list(prefix).await
    }
}

#[tokio::test]
async fn store_failure_mid_batch_requeues_the_unprocessed_users() {
    let inner = memory_kv();
    let workflow = RecordingWorkflow::new();
    for user in ["u1", "u2", "u3"] {
        seed_questionnaire(inner.as_ref(), user).await.unwrap();
        status::set_status(inner.as_ref(), user, PlanStatus::Pending)
            .await
            .unwrap();
    }

    // u2's questionnaire read fails; u3 was already dequeued and must not
    // be lost.
    let kv: Arc<dyn KvStore> = Arc::new(FaultyKeyKv {
        inner: Arc::clone(&inner),
        fail_key: keys::questionnaire("u2"),
    });
    let driver = scheduler(&kv, &workflow, SchedulerConfig::default());

    let report = driver.tick(Utc::now()).await.unwrap();
    assert_eq!(report.generation.processed, 1);
    report.join().await;

    assert_eq!(workflow.users_for("process_plan"), vec!["u1"]);
    let pending = queue::read_queue(kv.as_ref(), keys::PENDING_PLAN_USERS)
        .await
        .unwrap();
    assert_eq!(pending, vec!["u2", "u3"]);
}

#[tokio::test]
async fn failed_generation_moves_user_to_error() {
    let kv = memory_kv();
    let workflow = RecordingWorkflow::new();
    workflow.fail_process();

    seed_questionnaire(kv.as_ref(), "alice").await.unwrap();
    status::set_status(kv.as_ref(), "alice", PlanStatus::Pending)
        .await
        .unwrap();

    let driver = scheduler(&kv, &workflow, SchedulerConfig::default());
    driver.tick(Utc::now()).await.unwrap().join().await;

    let record = status::get_status(kv.as_ref(), "alice").await.unwrap().unwrap();
    assert_eq!(record.status, PlanStatus::Error);
    assert!(record.message.unwrap().contains("plan generation failed"));
}

#[tokio::test]
async fn tick_dispatches_queued_events() {
    let kv = memory_kv();
    let workflow = RecordingWorkflow::new();
    events::enqueue(
        kv.as_ref(),
        EventType::UpdateProfile,
        "alice",
        json!({"weight_kg": 77}),
    )
    .await
    .unwrap();

    let driver = scheduler(&kv, &workflow, SchedulerConfig::default());
    let report = driver.tick(Utc::now()).await.unwrap();
    assert_eq!(report.events.processed, 1);
    report.join().await;

    assert!(events::read_index(kv.as_ref()).await.unwrap().is_empty());
}

#[tokio::test]
async fn adjustment_skips_inactive_users_but_keeps_them_queued() {
    let kv = memory_kv();
    let workflow = RecordingWorkflow::new();
    let now = Utc::now();

    status::set_status(kv.as_ref(), "dormant", PlanStatus::Ready)
        .await
        .unwrap();
    status::set_status(kv.as_ref(), "active", PlanStatus::Ready)
        .await
        .unwrap();
    seed_last_active(kv.as_ref(), "dormant", now - Duration::days(45))
        .await
        .unwrap();
    seed_last_active(kv.as_ref(), "active", now - Duration::days(2))
        .await
        .unwrap();

    let driver = scheduler(&kv, &workflow, SchedulerConfig::default());
    let report = driver.tick(now).await.unwrap();
    assert_eq!(report.adjustment.processed, 1);
    report.join().await;

    assert_eq!(workflow.users_for("adjust_principles"), vec!["active"]);

    // Both users remain ready; inactivity is not an eviction.
    let ready = queue::read_queue(kv.as_ref(), keys::READY_PLAN_USERS)
        .await
        .unwrap();
    assert_eq!(ready.len(), 2);
    assert!(ready.contains(&"dormant".to_string()));
}

#[tokio::test]
async fn adjustment_respects_the_minimum_interval() {
    let kv = memory_kv();
    let workflow = RecordingWorkflow::new();
    let now = Utc::now();

    status::set_status(kv.as_ref(), "alice", PlanStatus::Ready)
        .await
        .unwrap();
    seed_last_active(kv.as_ref(), "alice", now).await.unwrap();

    let driver = scheduler(&kv, &workflow, SchedulerConfig::default());

    // First tick triggers and stamps last_adjustment.
    let report = driver.tick(now).await.unwrap();
    assert_eq!(report.adjustment.processed, 1);
    report.join().await;

    // A tick the next day is inside the 14-day interval.
    let report = driver.tick(now + Duration::days(1)).await.unwrap();
    assert_eq!(report.adjustment.processed, 0);
    report.join().await;

    // Past the interval the user is due again.
    let report = driver.tick(now + Duration::days(15)).await.unwrap();
    assert_eq!(report.adjustment.processed, 1);
    report.join().await;

    assert_eq!(workflow.count("adjust_principles"), 2);
}

#[tokio::test]
async fn adjustment_examines_the_queue_at_most_once_per_tick() {
    let kv = memory_kv();
    let workflow = RecordingWorkflow::new();
    let now = Utc::now();

    // Three users, none due for adjustment.
    for user in ["u1", "u2", "u3"] {
        status::set_status(kv.as_ref(), user, PlanStatus::Ready)
            .await
            .unwrap();
        kv.put(&keys::last_adjustment(user), &now.to_rfc3339())
            .await
            .unwrap();
    }

    let driver = scheduler(&kv, &workflow, SchedulerConfig::default());
    let report = driver.tick(now).await.unwrap();
    assert_eq!(report.adjustment.processed, 0);
    report.join().await;

    // Nobody was adjusted and the queue is intact.
    assert_eq!(workflow.count("adjust_principles"), 0);
    assert_eq!(
        queue::read_queue(kv.as_ref(), keys::READY_PLAN_USERS)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn failed_adjustment_leaves_the_plan_ready() {
    let kv = memory_kv();
    let workflow = RecordingWorkflow::new();
    workflow.fail_adjust();
    let now = Utc::now();

    status::set_status(kv.as_ref(), "alice", PlanStatus::Ready)
        .await
        .unwrap();

    let driver = scheduler(&kv, &workflow, SchedulerConfig::default());
    driver.tick(now).await.unwrap().join().await;

    let record = status::get_status(kv.as_ref(), "alice").await.unwrap().unwrap();
    assert_eq!(record.status, PlanStatus::Ready);
    assert_eq!(
        queue::read_queue(kv.as_ref(), keys::READY_PLAN_USERS)
            .await
            .unwrap(),
        vec!["alice".to_string()]
    );
}

#[tokio::test]
async fn metrics_accumulate_across_ticks_and_skip_idle_runs() {
    let kv = memory_kv();
    let workflow = RecordingWorkflow::new();
    let now = Utc::now();

    for user in ["u1", "u2"] {
        seed_questionnaire(kv.as_ref(), user).await.unwrap();
        status::set_status(kv.as_ref(), user, PlanStatus::Pending)
            .await
            .unwrap();
    }

    let config = SchedulerConfig {
        generation_batch: 1,
        ..SchedulerConfig::default()
    };
    let driver = scheduler(&kv, &workflow, config);

    driver.tick(now).await.unwrap().join().await;
    driver.tick(now).await.unwrap().join().await;

    let daily = get_queue_metrics(kv.as_ref(), now.date_naive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(daily.stages[STAGE_GENERATION].processed, 2);
    assert_eq!(daily.total_processed(), 2);

    // An idle day writes no record at all.
    let idle_day = (now + Duration::days(90)).date_naive();
    driver.tick(now + Duration::days(90)).await.unwrap().join().await;
    assert!(
        get_queue_metrics(kv.as_ref(), idle_day)
            .await
            .unwrap()
            .is_none()
    );
}
