//! `nutriq run` and `nutriq tick` commands: drive the scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use nutriq_core::scheduler::Scheduler;

/// Run one scheduler invocation and report what it did.
pub async fn run_tick(scheduler: &Scheduler) -> Result<()> {
    let report = scheduler.tick(Utc::now()).await?;
    println!(
        "Tick complete: generation={} events={} adjustments={}",
        report.generation.processed, report.events.processed, report.adjustment.processed
    );
    report.join().await;
    Ok(())
}

/// Run the scheduler loop until interrupted.
pub async fn run_loop(scheduler: &Scheduler, interval_secs: u64) -> Result<()> {
    let interval = Duration::from_secs(interval_secs.max(1));
    println!("Scheduler running every {}s. Ctrl+C to stop.", interval.as_secs());

    // Graceful shutdown: first signal cancels, second force-exits.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);

    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\nShutting down after the current tick (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    scheduler.run(interval, cancel).await?;
    println!("Scheduler stopped.");
    Ok(())
}
