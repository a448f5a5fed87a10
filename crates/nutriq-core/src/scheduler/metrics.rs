//! Daily scheduler metrics, accumulated across runs.
//!
//! One record per calendar day, keyed `queue_metrics_<YYYY-MM-DD>`.
//! Counts and durations are added to whatever the day already holds (the
//! record is not overwritten), and a run in which no stage did any work
//! writes nothing, so storage is not cluttered with all-zero entries.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use nutriq_kv::{KvStore, get_json, keys, put_json};

/// Stage names used in the daily record.
pub const STAGE_GENERATION: &str = "plan_generation";
pub const STAGE_EVENTS: &str = "event_dispatch";
pub const STAGE_ADJUSTMENT: &str = "principle_adjustment";

/// Work done by one scheduler stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub processed: u64,
    pub duration_ms: u64,
}

/// Accumulated metrics for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub stages: BTreeMap<String, StageMetrics>,
}

impl DailyMetrics {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            stages: BTreeMap::new(),
        }
    }

    pub fn total_processed(&self) -> u64 {
        self.stages.values().map(|s| s.processed).sum()
    }
}

/// Add one run's stage results into the day's record.
///
/// Skipped entirely when every stage processed zero items.
pub async fn accumulate(
    kv: &dyn KvStore,
    date: NaiveDate,
    updates: &[(&str, StageMetrics)],
) -> Result<()> {
    if updates.iter().all(|(_, m)| m.processed == 0) {
        return Ok(());
    }

    let key = keys::queue_metrics(&date.to_string());
    let mut daily: DailyMetrics = get_json(kv, &key)
        .await?
        .unwrap_or_else(|| DailyMetrics::empty(date));

    for (stage, update) in updates {
        let entry = daily.stages.entry((*stage).to_string()).or_default();
        entry.processed += update.processed;
        entry.duration_ms += update.duration_ms;
    }

    put_json(kv, &key, &daily).await
}

/// Read the metrics record for a day, if any run did work that day.
pub async fn get_queue_metrics(kv: &dyn KvStore, date: NaiveDate) -> Result<Option<DailyMetrics>> {
    get_json(kv, &keys::queue_metrics(&date.to_string())).await
}
