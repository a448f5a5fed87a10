//! `nutriq enqueue` command: append a mutation event for a user.

use anyhow::{Context, Result};

use nutriq_core::events::{self, EventType};
use nutriq_kv::KvStore;

/// Parse and enqueue one event. `payload` is a JSON document; an empty
/// string enqueues an empty object.
pub async fn run_enqueue(
    kv: &dyn KvStore,
    user_id: &str,
    event_type_str: &str,
    payload: &str,
) -> Result<()> {
    let event_type = EventType::parse(event_type_str).with_context(|| {
        format!("unknown event type {event_type_str:?} (expected planMod, testResult, or updateProfile)")
    })?;

    let payload = if payload.trim().is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(payload).context("payload is not valid JSON")?
    };

    let outcome = events::enqueue(kv, event_type, user_id, payload).await?;
    if outcome.success {
        println!("Enqueued {event_type} event for {user_id}.");
    } else {
        println!(
            "Rejected: {}",
            outcome.message.as_deref().unwrap_or("duplicate request")
        );
        std::process::exit(1);
    }
    Ok(())
}
