//! Work queue operations over JSON-array list keys.
//!
//! The store has no partial-update primitive, so every mutation reads the
//! whole list, rewrites it, and writes it back. Lists are semantically
//! sets: duplicates must not accumulate.

use std::collections::BTreeSet;

use anyhow::Result;

use nutriq_kv::{KvStore, get_json, keys, put_json};

/// Read a queue list key. An absent key is an empty queue.
pub async fn read_queue(kv: &dyn KvStore, queue_key: &str) -> Result<Vec<String>> {
    Ok(get_json::<Vec<String>>(kv, queue_key).await?.unwrap_or_default())
}

/// Overwrite a queue list key.
pub async fn write_queue(kv: &dyn KvStore, queue_key: &str, users: &[String]) -> Result<()> {
    put_json(kv, queue_key, &users).await
}

/// Ensure `user_id` is present exactly once (or absent) in a queue.
///
/// Writes only when membership actually changes, to keep the lost-update
/// window on the shared list key as small as possible.
pub async fn set_membership(
    kv: &dyn KvStore,
    queue_key: &str,
    user_id: &str,
    present: bool,
) -> Result<()> {
    let queue = read_queue(kv, queue_key).await?;
    let occurrences = queue.iter().filter(|u| *u == user_id).count();

    let changed = if present {
        occurrences != 1
    } else {
        occurrences != 0
    };
    if !changed {
        return Ok(());
    }

    let mut updated: Vec<String> = queue.into_iter().filter(|u| u != user_id).collect();
    if present {
        updated.push(user_id.to_string());
    }
    write_queue(kv, queue_key, &updated).await
}

/// Append `user_id` if not already queued.
///
/// Used to put back items that were dequeued but not fully processed;
/// silently dropping them is a defect.
pub async fn requeue(kv: &dyn KvStore, queue_key: &str, user_id: &str) -> Result<()> {
    set_membership(kv, queue_key, user_id, true).await
}

/// Take up to `max_items` from the head of a queue.
///
/// Reads the list, splits off a prefix of `min(max_items, len)`, rewrites
/// the remainder, and returns the taken slice. Bounds per-invocation work
/// regardless of backlog size.
pub async fn dequeue_batch(
    kv: &dyn KvStore,
    queue_key: &str,
    max_items: usize,
) -> Result<Vec<String>> {
    let mut queue = read_queue(kv, queue_key).await?;
    if queue.is_empty() || max_items == 0 {
        return Ok(Vec::new());
    }

    let take = max_items.min(queue.len());
    let remainder = queue.split_off(take);
    write_queue(kv, queue_key, &remainder).await?;
    Ok(queue)
}

/// Result of a queue reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub pending_added: usize,
    pub pending_removed: usize,
    pub ready_added: usize,
    pub ready_removed: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.pending_added + self.pending_removed + self.ready_added + self.ready_removed > 0
    }
}

/// Re-derive both work queues from the per-user status keys.
///
/// Incremental list edits lose updates under concurrent writers; the
/// status keys are the source of truth, so membership can always be
/// recomputed from a `plan_status_` scan. Existing relative order is
/// preserved for users that stay; newly discovered users are appended in
/// key order.
pub async fn reconcile_queues(kv: &dyn KvStore) -> Result<ReconcileReport> {
    let mut should_be_pending = Vec::new();
    let mut should_be_ready = Vec::new();

    for key in kv.list(keys::PLAN_STATUS_PREFIX).await? {
        let Some(user_id) = keys::user_from_status_key(&key) else {
            continue;
        };
        let Some(record) = super::get_status(kv, user_id).await? else {
            continue;
        };
        if record.status.in_pending_queue() {
            should_be_pending.push(user_id.to_string());
        } else if record.status.in_ready_queue() {
            should_be_ready.push(user_id.to_string());
        }
    }

    let mut report = ReconcileReport::default();
    let (pa, pr) =
        reconcile_one(kv, keys::PENDING_PLAN_USERS, &should_be_pending).await?;
    report.pending_added = pa;
    report.pending_removed = pr;
    let (ra, rr) = reconcile_one(kv, keys::READY_PLAN_USERS, &should_be_ready).await?;
    report.ready_added = ra;
    report.ready_removed = rr;

    if report.changed() {
        tracing::info!(
            pending_added = report.pending_added,
            pending_removed = report.pending_removed,
            ready_added = report.ready_added,
            ready_removed = report.ready_removed,
            "work queues reconciled"
        );
    }
    Ok(report)
}

/// Rewrite one queue to exactly match the desired membership.
async fn reconcile_one(
    kv: &dyn KvStore,
    queue_key: &str,
    desired: &[String],
) -> Result<(usize, usize)> {
    let current = read_queue(kv, queue_key).await?;
    let desired_set: BTreeSet<&String> = desired.iter().collect();

    let mut updated = Vec::with_capacity(desired.len());
    let mut seen = BTreeSet::new();
    for user in &current {
        if desired_set.contains(user) && seen.insert(user.clone()) {
            updated.push(user.clone());
        }
    }
    let removed = current.len() - updated.len();

    let mut added = 0;
    for user in desired {
        if seen.insert(user.clone()) {
            updated.push(user.clone());
            added += 1;
        }
    }

    if removed > 0 || added > 0 {
        write_queue(kv, queue_key, &updated).await?;
    }
    Ok((added, removed))
}
