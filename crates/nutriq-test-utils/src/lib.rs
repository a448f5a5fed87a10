//! Shared test utilities for nutriq integration tests.
//!
//! Provides an in-memory store factory, seeding helpers for the common key
//! shapes, meal JSON builders, and a recording workflow that stands in for
//! the external generation layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use nutriq_core::workflow::PlanWorkflow;
use nutriq_kv::{KvStore, MemoryKv, keys};

/// Fresh in-memory store behind the trait object the crate's call sites use.
pub fn memory_kv() -> Arc<dyn KvStore> {
    Arc::new(MemoryKv::new())
}

/// Seed questionnaire answers so the generation stage accepts the user.
pub async fn seed_questionnaire(kv: &dyn KvStore, user_id: &str) -> Result<()> {
    kv.put(
        &keys::questionnaire(user_id),
        &json!({"goal": "maintain", "meals_per_day": 3}).to_string(),
    )
    .await
}

/// Seed a profile carrying complete body metrics.
pub async fn seed_profile(kv: &dyn KvStore, user_id: &str) -> Result<()> {
    kv.put(
        &keys::profile(user_id),
        &json!({"weight_kg": 80, "height_cm": 180, "age": 30}).to_string(),
    )
    .await
}

/// Stamp the user's last activity.
pub async fn seed_last_active(
    kv: &dyn KvStore,
    user_id: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    kv.put(&keys::last_active(user_id), &at.to_rfc3339()).await
}

/// A meal object with the three core macro gram fields.
pub fn meal(protein: f64, carbs: f64, fat: f64) -> Value {
    json!({
        "protein_grams": protein,
        "carbs_grams": carbs,
        "fat_grams": fat,
    })
}

/// A meal object with explicit calories as well.
pub fn meal_with_calories(calories: f64, protein: f64, carbs: f64, fat: f64) -> Value {
    json!({
        "calories": calories,
        "protein_grams": protein,
        "carbs_grams": carbs,
        "fat_grams": fat,
    })
}

/// Workflow double that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingWorkflow {
    calls: Mutex<Vec<(String, String)>>,
    fail_process: AtomicBool,
    fail_adjust: AtomicBool,
}

impl RecordingWorkflow {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subsequent `process_plan` calls fail.
    pub fn fail_process(&self) {
        self.fail_process.store(true, Ordering::SeqCst);
    }

    /// Make subsequent `adjust_principles` calls fail.
    pub fn fail_adjust(&self) {
        self.fail_adjust.store(true, Ordering::SeqCst);
    }

    /// All recorded `(operation, user_id)` pairs, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    /// How many times `operation` was invoked.
    pub fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|(op, _)| op == operation).count()
    }

    /// Users for which `operation` was invoked, in call order.
    pub fn users_for(&self, operation: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, user)| user)
            .collect()
    }

    fn record(&self, operation: &str, user_id: &str) {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push((operation.to_string(), user_id.to_string()));
    }
}

#[async_trait]
impl PlanWorkflow for RecordingWorkflow {
    async fn process_plan(&self, user_id: &str) -> Result<()> {
        self.record("process_plan", user_id);
        if self.fail_process.load(Ordering::SeqCst) {
            anyhow::bail!("simulated generation failure");
        }
        Ok(())
    }

    async fn adjust_principles(&self, user_id: &str) -> Result<()> {
        self.record("adjust_principles", user_id);
        if self.fail_adjust.load(Ordering::SeqCst) {
            anyhow::bail!("simulated adjustment failure");
        }
        Ok(())
    }
}
