//! Configuration file management for nutriq.
//!
//! Provides a TOML-based config file at `~/.config/nutriq/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use nutriq_core::scheduler::SchedulerConfig;
use nutriq_kv::KvConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Path to the SQLite database file.
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Seconds between scheduler ticks in `nutriq run`.
    pub interval_secs: u64,
    pub generation_batch: usize,
    pub event_batch: usize,
    pub adjustment_batch: usize,
    pub inactivity_cutoff_days: i64,
    pub adjustment_interval_days: i64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            interval_secs: 300,
            generation_batch: defaults.generation_batch,
            event_batch: defaults.event_batch,
            adjustment_batch: defaults.adjustment_batch,
            inactivity_cutoff_days: defaults.inactivity_cutoff.num_days(),
            adjustment_interval_days: defaults.adjustment_interval.num_days(),
        }
    }
}

impl SchedulerSection {
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            generation_batch: self.generation_batch,
            event_batch: self.event_batch,
            adjustment_batch: self.adjustment_batch,
            inactivity_cutoff: chrono::Duration::days(self.inactivity_cutoff_days),
            adjustment_interval: chrono::Duration::days(self.adjustment_interval_days),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    /// Command run as `<process_command> <user_id>` to generate a plan.
    pub process_command: Option<String>,
    /// Command run as `<adjust_command> <user_id>` to adjust principles.
    pub adjust_command: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the nutriq config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/nutriq` or `~/.config/nutriq`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("nutriq");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("nutriq")
}

/// Return the path to the nutriq config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct NutriqConfig {
    pub kv_config: KvConfig,
    pub scheduler: SchedulerSection,
    pub workflow: WorkflowSection,
}

impl NutriqConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    ///
    /// - DB path: `cli_db_path` > `NUTRIQ_DB_PATH` env > `config_file.database.path` > XDG data dir
    /// - Scheduler and workflow sections come from the config file when present.
    pub fn resolve(cli_db_path: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let kv_config = if let Some(path) = cli_db_path {
            KvConfig::new(path)
        } else if let Ok(path) = std::env::var("NUTRIQ_DB_PATH") {
            KvConfig::new(path)
        } else if let Some(ref cfg) = file_config {
            KvConfig::new(&cfg.database.path)
        } else {
            KvConfig::new(KvConfig::default_path())
        };

        let (scheduler, workflow) = match file_config {
            Some(cfg) => (cfg.scheduler, cfg.workflow),
            None => (SchedulerSection::default(), WorkflowSection::default()),
        };

        Ok(Self {
            kv_config,
            scheduler,
            workflow,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
