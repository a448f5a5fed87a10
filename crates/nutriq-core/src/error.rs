//! Typed error taxonomy for the coordinator.
//!
//! Orchestration-level code uses `anyhow::Result`; these variants exist for
//! the failures callers branch on or surface to users. A lost read-modify-
//! write on a queue key is deliberately *not* an error: it cannot be
//! detected synchronously and is healed by the periodic queue
//! reconciliation sweep instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Required upstream data is absent. Surfaced synchronously with the
    /// exact list of missing fields; never silently defaulted.
    #[error("missing prerequisite data: {}", missing.join(", "))]
    MissingPrerequisite {
        missing: Vec<String>,
        /// Human-readable guidance on how to supply each missing field.
        instructions: Vec<String>,
    },

    /// Reconciliation could not produce a complete macro set. The candidate
    /// plan must not overwrite the live plan.
    #[error("incomplete macro set: missing {}", missing.join(", "))]
    IncompleteMacros { missing: Vec<String> },

    /// A provider call (model layer, mail) kept failing transiently until
    /// the attempt cap was reached.
    #[error("provider call failed after {attempts} attempt(s)")]
    TransientProviderFailure {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// A key-value store operation failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl CoordinatorError {
    /// The missing-field list, for the variants that carry one.
    pub fn missing_fields(&self) -> &[String] {
        match self {
            Self::MissingPrerequisite { missing, .. } => missing,
            Self::IncompleteMacros { missing } => missing,
            _ => &[],
        }
    }
}
