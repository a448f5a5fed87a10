//! `nutriq metrics` command: show accumulated daily scheduler metrics.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};

use nutriq_core::scheduler::metrics::get_queue_metrics;
use nutriq_kv::KvStore;

/// Show the metrics record for a day (defaults to today, UTC).
pub async fn run_metrics(kv: &dyn KvStore, date_str: Option<&str>) -> Result<()> {
    let date = match date_str {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date {s:?} (expected YYYY-MM-DD)"))?,
        None => Utc::now().date_naive(),
    };

    let Some(daily) = get_queue_metrics(kv, date).await? else {
        println!("No work was recorded on {date}.");
        return Ok(());
    };

    println!("Metrics for {date}:");
    println!("{:<24} {:>10} {:>14}", "STAGE", "PROCESSED", "DURATION (ms)");
    for (stage, metrics) in &daily.stages {
        println!(
            "{:<24} {:>10} {:>14}",
            stage, metrics.processed, metrics.duration_ms
        );
    }
    println!();
    println!("Total processed: {}", daily.total_processed());
    Ok(())
}
