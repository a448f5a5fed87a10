//! Event dispatcher: consumes pointers from the global index and routes
//! each record to its handler, one background task per user.
//!
//! Delivery is at-most-once by design: the pointer and record are removed
//! *before* the handler runs, so a crashing handler loses the event rather
//! than replaying it. An unrecoverable handler error is logged and surfaced
//! through the user's plan status, never retried automatically.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use nutriq_kv::{KvStore, get_json, keys, put_json};

use crate::status::{self, PlanStatus};
use crate::workflow::PlanWorkflow;

use super::{EventRecord, EventType, read_index, write_index};

/// Routes consumed events to the plan workflows and the store.
pub struct Dispatcher {
    kv: Arc<dyn KvStore>,
    workflow: Arc<dyn PlanWorkflow>,
}

/// One dispatch pass: how many events were consumed, plus the handles of
/// the spawned handler tasks so tests can await them deterministically.
pub struct DispatchBatch {
    pub processed: usize,
    handles: Vec<JoinHandle<()>>,
}

impl DispatchBatch {
    /// Await all spawned handlers. Production callers are free to drop the
    /// batch instead; the tasks keep running detached.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "event handler task panicked");
            }
        }
    }

    /// Surrender the spawned handler task handles.
    pub fn into_handles(self) -> Vec<JoinHandle<()>> {
        self.handles
    }
}

impl Dispatcher {
    pub fn new(kv: Arc<dyn KvStore>, workflow: Arc<dyn PlanWorkflow>) -> Self {
        Self { kv, workflow }
    }

    /// Consume up to `max_items` events from the index.
    ///
    /// The index remainder is written back before any handler runs, so a
    /// second dispatcher pass never sees the same pointers. Per pointer:
    /// load the record, delete it (and the planMod sentinel), then hand the
    /// record to its handler. Handlers for a given user run sequentially in
    /// index order inside a single spawned task; users never share a task,
    /// so one user's slow handler cannot stall another's. Pointers whose
    /// record has vanished are skipped with a warning but still count as
    /// consumed.
    pub async fn dispatch(&self, max_items: usize) -> Result<DispatchBatch> {
        let mut index = read_index(self.kv.as_ref()).await?;
        if index.is_empty() || max_items == 0 {
            return Ok(DispatchBatch {
                processed: 0,
                handles: Vec::new(),
            });
        }

        let take = max_items.min(index.len());
        let remainder = index.split_off(take);
        write_index(self.kv.as_ref(), &remainder).await?;

        let mut per_user: Vec<(String, Vec<EventRecord>)> = Vec::new();
        let mut processed = 0;

        for pointer in index {
            let record: Option<EventRecord> = get_json(self.kv.as_ref(), &pointer.key).await?;
            let Some(record) = record else {
                tracing::warn!(key = %pointer.key, "event record missing, skipping pointer");
                processed += 1;
                continue;
            };

            // Consume before processing (at-most-once).
            self.kv.delete(&pointer.key).await?;
            if record.event_type == EventType::PlanMod {
                // Hand the payload to the generation layer, then clear the
                // sentinel so a new planMod may be accepted.
                put_json(
                    self.kv.as_ref(),
                    &keys::plan_mod_request(&record.user_id),
                    &record.payload,
                )
                .await?;
                self.kv.delete(&keys::pending_plan_mod(&record.user_id)).await?;
            }
            processed += 1;

            match per_user.iter_mut().find(|(user, _)| *user == record.user_id) {
                Some((_, records)) => records.push(record),
                None => per_user.push((record.user_id.clone(), vec![record])),
            }
        }

        let mut handles = Vec::with_capacity(per_user.len());
        for (user_id, records) in per_user {
            let kv = Arc::clone(&self.kv);
            let workflow = Arc::clone(&self.workflow);
            handles.push(tokio::spawn(async move {
                for record in records {
                    let event_type = record.event_type;
                    if let Err(e) = handle_event(kv.as_ref(), workflow.as_ref(), record).await {
                        tracing::error!(
                            user_id = %user_id,
                            event_type = %event_type,
                            error = %e,
                            "event handler failed (not retried)"
                        );
                        let _ = status::set_status_with_message(
                            kv.as_ref(),
                            &user_id,
                            PlanStatus::Error,
                            Some(format!("{event_type} handling failed: {e:#}")),
                        )
                        .await;
                    }
                }
            }));
        }

        tracing::debug!(processed, "event dispatch pass complete");
        Ok(DispatchBatch { processed, handles })
    }
}

/// Route one consumed event to its handler.
async fn handle_event(
    kv: &dyn KvStore,
    workflow: &dyn PlanWorkflow,
    record: EventRecord,
) -> Result<()> {
    match record.event_type {
        EventType::PlanMod => {
            // Regenerate the plan with the stashed modification request.
            workflow
                .process_plan(&record.user_id)
                .await
                .with_context(|| format!("plan regeneration failed for {}", record.user_id))
        }
        EventType::TestResult => {
            ingest_test_result(kv, &record.user_id, record.payload).await?;
            workflow
                .adjust_principles(&record.user_id)
                .await
                .with_context(|| format!("principle adjustment failed for {}", record.user_id))
        }
        EventType::UpdateProfile => patch_profile(kv, &record.user_id, record.payload).await,
    }
}

/// Append a test-result payload to the user's history.
async fn ingest_test_result(kv: &dyn KvStore, user_id: &str, payload: Value) -> Result<()> {
    let key = keys::test_results(user_id);
    let mut results: Vec<Value> = get_json(kv, &key).await?.unwrap_or_default();
    results.push(payload);
    put_json(kv, &key, &results).await
}

/// Shallow-merge a patch object into the user's profile.
async fn patch_profile(kv: &dyn KvStore, user_id: &str, patch: Value) -> Result<()> {
    let key = keys::profile(user_id);
    let mut profile: Map<String, Value> = get_json(kv, &key).await?.unwrap_or_default();
    match patch {
        Value::Object(fields) => {
            for (name, value) in fields {
                profile.insert(name, value);
            }
        }
        other => anyhow::bail!("profile patch must be an object, got {other}"),
    }
    put_json(kv, &key, &profile).await
}
