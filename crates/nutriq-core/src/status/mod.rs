//! Plan status state machine and the queue-membership rules it drives.
//!
//! Each user has one status key, overwritten on every transition and never
//! deleted. Two global list keys (`pending_plan_users`, `ready_plan_users`)
//! act as work queues; the invariant is that a user appears in at most one
//! of them, and only when their status says so.

pub mod queue;

use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nutriq_kv::{KvStore, keys, put_json};

/// Lifecycle state of a user's nutrition plan.
///
/// Queue membership per state:
///
/// ```text
/// pending               -> pending_plan_users only
/// pending_modification  -> pending_plan_users only (awaiting regeneration
///                          with the staged planMod payload)
/// ready                 -> ready_plan_users only
/// pending_inputs        -> neither (cannot enqueue: required inputs missing)
/// processing            -> neither
/// error                 -> neither
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    PendingInputs,
    Pending,
    Processing,
    PendingModification,
    Ready,
    Error,
}

impl PlanStatus {
    /// Whether this state places the user in the pending work queue.
    pub fn in_pending_queue(self) -> bool {
        matches!(self, PlanStatus::Pending | PlanStatus::PendingModification)
    }

    /// Whether this state places the user in the ready queue.
    pub fn in_ready_queue(self) -> bool {
        self == PlanStatus::Ready
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::PendingInputs => "pending_inputs",
            PlanStatus::Pending => "pending",
            PlanStatus::Processing => "processing",
            PlanStatus::PendingModification => "pending_modification",
            PlanStatus::Ready => "ready",
            PlanStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Stored status record: the state plus optional operator-facing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: PlanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Write a user's status and enforce queue exclusivity for the new state.
///
/// The queue updates are read-whole/write-whole and not atomic with the
/// status write; two callers racing on the same queue key can lose an
/// update. That risk is accepted (no locks exist); `queue::reconcile_queues`
/// re-derives membership from the status keys to self-heal.
pub async fn set_status(kv: &dyn KvStore, user_id: &str, status: PlanStatus) -> Result<()> {
    set_status_with_message(kv, user_id, status, None).await
}

/// Like [`set_status`] but records an operator-facing message.
pub async fn set_status_with_message(
    kv: &dyn KvStore,
    user_id: &str,
    status: PlanStatus,
    message: Option<String>,
) -> Result<()> {
    let record = StatusRecord {
        status,
        message,
        updated_at: Utc::now(),
    };
    put_json(kv, &keys::plan_status(user_id), &record).await?;

    queue::set_membership(
        kv,
        keys::PENDING_PLAN_USERS,
        user_id,
        status.in_pending_queue(),
    )
    .await?;
    queue::set_membership(kv, keys::READY_PLAN_USERS, user_id, status.in_ready_queue()).await?;

    tracing::debug!(user_id = %user_id, status = %status, "plan status updated");
    Ok(())
}

/// Read a user's status record.
///
/// Tolerates legacy values that stored the bare status string instead of a
/// JSON record.
pub async fn get_status(kv: &dyn KvStore, user_id: &str) -> Result<Option<StatusRecord>> {
    let Some(raw) = kv.get(&keys::plan_status(user_id)).await? else {
        return Ok(None);
    };
    if let Ok(record) = serde_json::from_str::<StatusRecord>(&raw) {
        return Ok(Some(record));
    }
    let status: PlanStatus = serde_json::from_value(serde_json::Value::String(raw.clone()))
        .map_err(|_| anyhow::anyhow!("unrecognized plan status value {raw:?} for {user_id}"))?;
    Ok(Some(StatusRecord {
        status,
        message: None,
        updated_at: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_are_snake_case() {
        assert_eq!(PlanStatus::PendingInputs.to_string(), "pending_inputs");
        assert_eq!(
            serde_json::to_string(&PlanStatus::PendingModification).unwrap(),
            r#""pending_modification""#
        );
        let parsed: PlanStatus = serde_json::from_str(r#""ready""#).unwrap();
        assert_eq!(parsed, PlanStatus::Ready);
    }

    #[test]
    fn queue_membership_follows_the_state_table() {
        for status in [
            PlanStatus::PendingInputs,
            PlanStatus::Processing,
            PlanStatus::Error,
        ] {
            assert!(!status.in_pending_queue());
            assert!(!status.in_ready_queue());
        }
        for status in [PlanStatus::Pending, PlanStatus::PendingModification] {
            assert!(status.in_pending_queue());
            assert!(!status.in_ready_queue());
        }
        assert!(PlanStatus::Ready.in_ready_queue());
        assert!(!PlanStatus::Ready.in_pending_queue());
    }
}
