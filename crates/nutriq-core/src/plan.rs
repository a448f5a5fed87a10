//! Plan documents and the publication gate.
//!
//! A candidate plan may only overwrite the live `<userId>_final_plan` when
//! the reconciliation engine produced a complete macro set. Anything less
//! leaves the live plan untouched, persists a diagnostic for the operator,
//! and parks the user in `error`.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use nutriq_kv::{KvStore, get_json, keys, put_json};

use crate::error::CoordinatorError;
use crate::macros::{MacroSet, reconcile_plan};
use crate::status::{self, PlanStatus};

/// The generated weekly menu plus its reconciled macro totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    /// Day name -> ordered meal objects.
    pub days: BTreeMap<String, Vec<Value>>,
    /// Per-day macro totals; always complete for a persisted plan.
    pub macros: MacroSet,
    pub generated_at: DateTime<Utc>,
}

/// Diagnostic persisted when a candidate plan fails reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDiagnostic {
    pub user_id: String,
    pub missing: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Validate a candidate plan and, if complete, publish it.
///
/// On success the plan document is written, any stale diagnostic is
/// cleared, and the user's status moves to `ready`. On incomplete macros
/// the live plan is left as-is, a diagnostic is written under
/// `plan_error_<userId>`, and the status moves to `error`.
pub async fn finalize_plan(
    kv: &dyn KvStore,
    user_id: &str,
    days: BTreeMap<String, Vec<Value>>,
    index: Option<&Map<String, Value>>,
) -> Result<MacroSet, CoordinatorError> {
    match reconcile_plan(&days, index) {
        Ok(macros) => {
            let document = PlanDocument {
                days,
                macros: macros.clone(),
                generated_at: Utc::now(),
            };
            put_json(kv, &keys::final_plan(user_id), &document).await?;
            kv.delete(&keys::plan_error(user_id)).await?;
            status::set_status(kv, user_id, PlanStatus::Ready).await?;
            tracing::info!(user_id = %user_id, "plan published");
            Ok(macros)
        }
        Err(CoordinatorError::IncompleteMacros { missing }) => {
            let diagnostic = PlanDiagnostic {
                user_id: user_id.to_string(),
                missing: missing.clone(),
                recorded_at: Utc::now(),
            };
            put_json(kv, &keys::plan_error(user_id), &diagnostic).await?;
            status::set_status_with_message(
                kv,
                user_id,
                PlanStatus::Error,
                Some("generated plan had incomplete macros".to_string()),
            )
            .await?;
            tracing::warn!(
                user_id = %user_id,
                missing = ?missing,
                "candidate plan rejected: incomplete macros"
            );
            Err(CoordinatorError::IncompleteMacros { missing })
        }
        Err(other) => Err(other),
    }
}

/// Read the live plan document, if any.
pub async fn get_final_plan(kv: &dyn KvStore, user_id: &str) -> Result<Option<PlanDocument>> {
    get_json(kv, &keys::final_plan(user_id)).await
}

/// Read the latest reconciliation diagnostic, if any.
pub async fn get_plan_diagnostic(
    kv: &dyn KvStore,
    user_id: &str,
) -> Result<Option<PlanDiagnostic>> {
    get_json(kv, &keys::plan_error(user_id)).await
}
