//! Event-sourced mutation queue.
//!
//! Asynchronous user-triggered changes (plan edits, test results, profile
//! updates) are appended as durable EventRecords and referenced from a
//! single global index list. Plan modifications carry an extra guarantee:
//! at most one unresolved planMod per user, enforced by an O(1) sentinel
//! key rather than a scan.

pub mod dispatch;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use nutriq_kv::{KvStore, get_json, keys, put_json};

use crate::status::{self, PlanStatus};

pub use dispatch::{DispatchBatch, Dispatcher};

/// Kinds of asynchronous mutation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "planMod")]
    PlanMod,
    #[serde(rename = "testResult")]
    TestResult,
    #[serde(rename = "updateProfile")]
    UpdateProfile,
}

impl EventType {
    /// Wire name, also embedded in record keys.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::PlanMod => "planMod",
            EventType::TestResult => "testResult",
            EventType::UpdateProfile => "updateProfile",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planMod" => Some(EventType::PlanMod),
            "testResult" => Some(EventType::TestResult),
            "updateProfile" => Some(EventType::UpdateProfile),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable record of one pending mutation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Creation time, Unix milliseconds.
    #[serde(rename = "createdTimestamp")]
    pub created_ts: i64,
    pub payload: Value,
}

/// Lightweight pointer stored in the global `events_queue` index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPointer {
    pub key: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Outcome of an enqueue attempt. A rejected duplicate is non-fatal:
/// `success` is false and no queue mutation happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EnqueueOutcome {
    fn accepted() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Append a mutation request for a user.
///
/// For `planMod` the per-user sentinel is checked first; if a modification
/// is already in flight the call returns a rejection with no side effects.
/// An accepted `planMod` claims the sentinel (holding the payload) before
/// the record is written, then flips the user's status to
/// `pending_modification`, which places them in the pending queue for
/// regeneration.
pub async fn enqueue(
    kv: &dyn KvStore,
    event_type: EventType,
    user_id: &str,
    payload: Value,
) -> Result<EnqueueOutcome> {
    if event_type == EventType::PlanMod {
        let sentinel = keys::pending_plan_mod(user_id);
        if kv.get(&sentinel).await?.is_some() {
            tracing::info!(user_id = %user_id, "rejected duplicate planMod request");
            return Ok(EnqueueOutcome::rejected(
                "a plan modification is already pending for this user",
            ));
        }
        // Claim the sentinel before any other write. The store has no
        // compare-and-set, so a duplicate racing inside the single
        // check-to-claim gap can still slip through; keeping the gap to
        // one write is the accepted trade-off.
        put_json(kv, &sentinel, &payload).await?;
    }

    let created_ts = Utc::now().timestamp_millis();
    let record_key = keys::event_record(event_type.as_str(), user_id, created_ts);
    let record = EventRecord {
        event_type,
        user_id: user_id.to_string(),
        created_ts,
        payload,
    };
    put_json(kv, &record_key, &record).await?;

    if event_type == EventType::PlanMod {
        status::set_status(kv, user_id, PlanStatus::PendingModification).await?;
    }

    // Append the pointer, deduplicating by record key.
    let mut index = read_index(kv).await?;
    if !index.iter().any(|p| p.key == record_key) {
        index.push(EventPointer {
            key: record_key.clone(),
            event_type,
            user_id: user_id.to_string(),
        });
        write_index(kv, &index).await?;
    }

    tracing::info!(
        user_id = %user_id,
        event_type = %event_type,
        key = %record_key,
        "event enqueued"
    );
    Ok(EnqueueOutcome::accepted())
}

/// HTTP-facing wrapper: enqueue a plan modification request.
pub async fn enqueue_plan_mod(
    kv: &dyn KvStore,
    user_id: &str,
    payload: Value,
) -> Result<EnqueueOutcome> {
    enqueue(kv, EventType::PlanMod, user_id, payload).await
}

/// Read the global event index. Absent key means an empty queue.
pub async fn read_index(kv: &dyn KvStore) -> Result<Vec<EventPointer>> {
    Ok(get_json::<Vec<EventPointer>>(kv, keys::EVENTS_QUEUE)
        .await?
        .unwrap_or_default())
}

/// Overwrite the global event index.
pub async fn write_index(kv: &dyn KvStore, index: &[EventPointer]) -> Result<()> {
    put_json(kv, keys::EVENTS_QUEUE, &index).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for ty in [
            EventType::PlanMod,
            EventType::TestResult,
            EventType::UpdateProfile,
        ] {
            assert_eq!(EventType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(EventType::parse("unknown"), None);
    }

    #[test]
    fn record_serializes_with_wire_field_names() {
        let record = EventRecord {
            event_type: EventType::TestResult,
            user_id: "u1".to_string(),
            created_ts: 123,
            payload: serde_json::json!({"hdl": 60}),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "testResult");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["createdTimestamp"], 123);
    }
}
