//! `nutriq status` command: show per-user plan status or a fleet summary.

use anyhow::Result;
use chrono::SecondsFormat;

use nutriq_core::plan;
use nutriq_core::status::{self, queue};
use nutriq_kv::{KvStore, keys};

/// Run the status command.
///
/// When `user_id` is `Some`, shows detailed status for that user.
/// When `None`, lists every user with a status key, plus queue depths.
pub async fn run_status(kv: &dyn KvStore, user_id: Option<&str>) -> Result<()> {
    match user_id {
        Some(user_id) => run_user_status(kv, user_id).await,
        None => run_fleet_status(kv).await,
    }
}

/// Show detailed status for a single user.
async fn run_user_status(kv: &dyn KvStore, user_id: &str) -> Result<()> {
    let Some(record) = status::get_status(kv, user_id).await? else {
        println!("No status recorded for {user_id}.");
        return Ok(());
    };

    println!("User: {user_id}");
    println!("Status: {}", record.status);
    println!(
        "Updated: {}",
        record.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    if let Some(message) = &record.message {
        println!("Message: {message}");
    }

    if let Some(diagnostic) = plan::get_plan_diagnostic(kv, user_id).await? {
        println!(
            "Last rejected plan was missing: {}",
            diagnostic.missing.join(", ")
        );
    }
    if let Some(document) = plan::get_final_plan(kv, user_id).await? {
        println!();
        println!(
            "Live plan ({} days, generated {}):",
            document.days.len(),
            document
                .generated_at
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        if let Some(calories) = document.macros.calories {
            println!("  calories: {calories}");
        }
        for (label, value) in [
            ("protein", document.macros.protein_grams),
            ("carbs", document.macros.carbs_grams),
            ("fat", document.macros.fat_grams),
            ("fiber", document.macros.fiber_grams),
        ] {
            if let Some(grams) = value {
                println!("  {label}: {grams:.0} g");
            }
        }
    }

    Ok(())
}

/// List every user with a status, plus queue depths.
async fn run_fleet_status(kv: &dyn KvStore) -> Result<()> {
    let status_keys = kv.list(keys::PLAN_STATUS_PREFIX).await?;

    if status_keys.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    println!("{:<30} {:<22} {}", "USER", "STATUS", "MESSAGE");
    println!("{}", "-".repeat(72));
    for key in &status_keys {
        let Some(user_id) = keys::user_from_status_key(key) else {
            continue;
        };
        let Some(record) = status::get_status(kv, user_id).await? else {
            continue;
        };
        println!(
            "{:<30} {:<22} {}",
            user_id,
            record.status.to_string(),
            record.message.as_deref().unwrap_or("")
        );
    }

    let pending = queue::read_queue(kv, keys::PENDING_PLAN_USERS).await?;
    let ready = queue::read_queue(kv, keys::READY_PLAN_USERS).await?;
    println!();
    println!("Queues: pending={} ready={}", pending.len(), ready.len());

    Ok(())
}
