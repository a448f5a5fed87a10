//! Key schema for the coordinator's slice of the store.
//!
//! Every key the coordinator reads or writes is built here so the schema
//! lives in one place. User ids are opaque strings minted by the (external)
//! auth layer.

/// Global work queue of users awaiting plan generation.
pub const PENDING_PLAN_USERS: &str = "pending_plan_users";

/// Global work queue of users with a ready plan (principle adjustment pool).
pub const READY_PLAN_USERS: &str = "ready_plan_users";

/// Global index of pending event records.
pub const EVENTS_QUEUE: &str = "events_queue";

/// Prefix shared by all per-user plan status keys.
pub const PLAN_STATUS_PREFIX: &str = "plan_status_";

/// Per-user plan lifecycle status record.
pub fn plan_status(user_id: &str) -> String {
    format!("{PLAN_STATUS_PREFIX}{user_id}")
}

/// Durable event record. `millis` is the creation timestamp in Unix
/// milliseconds; together with the type and user it makes the key unique
/// for any realistic enqueue rate.
pub fn event_record(event_type: &str, user_id: &str, millis: i64) -> String {
    format!("event_{event_type}_{user_id}_{millis}")
}

/// Sentinel for an in-flight plan modification. Presence means "a planMod
/// event is unresolved for this user"; the value carries the payload.
pub fn pending_plan_mod(user_id: &str) -> String {
    format!("pending_plan_mod_{user_id}")
}

/// Payload handed off to the generation layer when a planMod is consumed.
pub fn plan_mod_request(user_id: &str) -> String {
    format!("plan_mod_request_{user_id}")
}

/// The live, published plan document.
pub fn final_plan(user_id: &str) -> String {
    format!("{user_id}_final_plan")
}

/// Diagnostic record written when a candidate plan fails reconciliation.
pub fn plan_error(user_id: &str) -> String {
    format!("plan_error_{user_id}")
}

/// Questionnaire answers (written by the HTTP layer; generation input).
pub fn questionnaire(user_id: &str) -> String {
    format!("questionnaire_{user_id}")
}

/// User profile, including body metrics used for fallback estimation.
pub fn profile(user_id: &str) -> String {
    format!("profile_{user_id}")
}

/// Accumulated list of ingested test-result payloads.
pub fn test_results(user_id: &str) -> String {
    format!("test_results_{user_id}")
}

/// RFC 3339 timestamp of the user's last activity.
pub fn last_active(user_id: &str) -> String {
    format!("last_active_{user_id}")
}

/// RFC 3339 timestamp of the last principle adjustment for the user.
pub fn last_adjustment(user_id: &str) -> String {
    format!("last_adjustment_{user_id}")
}

/// Daily scheduler metrics record, keyed by ISO date (YYYY-MM-DD).
pub fn queue_metrics(date: &str) -> String {
    format!("queue_metrics_{date}")
}

/// Extract the user id from a `plan_status_<userId>` key name.
pub fn user_from_status_key(key: &str) -> Option<&str> {
    key.strip_prefix(PLAN_STATUS_PREFIX)
}
