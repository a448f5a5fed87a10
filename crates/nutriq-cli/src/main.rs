mod config;
mod enqueue_cmd;
mod metrics_cmd;
mod run_cmd;
mod status_cmd;
mod workflow;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use nutriq_core::scheduler::Scheduler;
use nutriq_core::status::queue;
use nutriq_kv::{KvStore, SqliteKv};

use config::NutriqConfig;
use workflow::CommandWorkflow;

#[derive(Parser)]
#[command(name = "nutriq", about = "Coordinator for AI-generated nutrition plans")]
struct Cli {
    /// Database file path (overrides NUTRIQ_DB_PATH env var)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a nutriq config file
    Init {
        /// SQLite database file path
        #[arg(long)]
        db_path: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Run one scheduler invocation
    Tick,
    /// Run the scheduler loop until interrupted
    Run {
        /// Seconds between ticks (overrides config file)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Show plan status (omit user_id to list all users)
    Status {
        /// User to show status for
        user_id: Option<String>,
    },
    /// Enqueue a mutation event for a user
    Enqueue {
        /// User the event applies to
        user_id: String,
        /// Event type: planMod, testResult, or updateProfile
        event_type: String,
        /// JSON payload (defaults to an empty object)
        #[arg(default_value = "")]
        payload: String,
    },
    /// Show daily scheduler metrics
    Metrics {
        /// Date to report on, YYYY-MM-DD (defaults to today)
        date: Option<String>,
    },
    /// Re-derive the work queues from the per-user status keys
    Reconcile,
}

/// Execute the `nutriq init` command: write config file.
fn cmd_init(db_path: Option<&str>, force: bool) -> Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let db_path = db_path
        .map(String::from)
        .unwrap_or_else(|| nutriq_kv::KvConfig::default_path().display().to_string());

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            path: db_path.clone(),
        },
        scheduler: config::SchedulerSection::default(),
        workflow: config::WorkflowSection::default(),
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.path = {db_path}");
    println!();
    println!("Next: set [workflow] process_command and adjust_command, then run `nutriq run`.");
    Ok(())
}

/// Open the SQLite store behind the trait object the core crate uses.
async fn open_store(resolved: &NutriqConfig) -> Result<Arc<dyn KvStore>> {
    let store = SqliteKv::connect(&resolved.kv_config.db_path).await?;
    Ok(Arc::new(store))
}

/// Build the scheduler from resolved config.
fn build_scheduler(kv: Arc<dyn KvStore>, resolved: &NutriqConfig) -> Scheduler {
    let workflow = CommandWorkflow::new(
        resolved.workflow.process_command.clone(),
        resolved.workflow.adjust_command.clone(),
        resolved.kv_config.db_path.clone(),
    );
    Scheduler::new(kv, Arc::new(workflow), resolved.scheduler.to_scheduler_config())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_path, force } => {
            cmd_init(db_path.as_deref(), force)?;
        }
        Commands::Tick => {
            let resolved = NutriqConfig::resolve(cli.db_path.as_deref())?;
            let kv = open_store(&resolved).await?;
            let scheduler = build_scheduler(Arc::clone(&kv), &resolved);
            run_cmd::run_tick(&scheduler).await?;
        }
        Commands::Run { interval } => {
            let resolved = NutriqConfig::resolve(cli.db_path.as_deref())?;
            let kv = open_store(&resolved).await?;
            let scheduler = build_scheduler(Arc::clone(&kv), &resolved);
            let interval_secs = interval.unwrap_or(resolved.scheduler.interval_secs);
            run_cmd::run_loop(&scheduler, interval_secs).await?;
        }
        Commands::Status { user_id } => {
            let resolved = NutriqConfig::resolve(cli.db_path.as_deref())?;
            let kv = open_store(&resolved).await?;
            status_cmd::run_status(kv.as_ref(), user_id.as_deref()).await?;
        }
        Commands::Enqueue {
            user_id,
            event_type,
            payload,
        } => {
            let resolved = NutriqConfig::resolve(cli.db_path.as_deref())?;
            let kv = open_store(&resolved).await?;
            enqueue_cmd::run_enqueue(kv.as_ref(), &user_id, &event_type, &payload).await?;
        }
        Commands::Metrics { date } => {
            let resolved = NutriqConfig::resolve(cli.db_path.as_deref())?;
            let kv = open_store(&resolved).await?;
            metrics_cmd::run_metrics(kv.as_ref(), date.as_deref()).await?;
        }
        Commands::Reconcile => {
            let resolved = NutriqConfig::resolve(cli.db_path.as_deref())?;
            let kv = open_store(&resolved).await?;
            let report = queue::reconcile_queues(kv.as_ref()).await?;
            if report.changed() {
                println!(
                    "Queues reconciled: pending +{}/-{}, ready +{}/-{}",
                    report.pending_added,
                    report.pending_removed,
                    report.ready_added,
                    report.ready_removed
                );
            } else {
                println!("Queues already consistent.");
            }
        }
    }

    Ok(())
}
