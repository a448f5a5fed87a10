//! The `PlanWorkflow` trait -- the narrow interface to the external
//! generation and adjustment layer.
//!
//! The language-model invocation machinery (prompt templating, network
//! calls) lives outside this crate. Implementors read their inputs from
//! the store, write `<userId>_final_plan` through the reconciliation gate,
//! and transition the user's status. The trait is object-safe so the
//! scheduler and dispatcher can hold `Arc<dyn PlanWorkflow>`.

pub mod retry;

use anyhow::Result;
use async_trait::async_trait;

pub use retry::{ProviderError, RetryPolicy, call_with_retry};

/// Adapter interface to the plan generation / principle adjustment layer.
#[async_trait]
pub trait PlanWorkflow: Send + Sync {
    /// Generate (or regenerate) a user's plan. Idempotent: reads inputs
    /// from the store, writes the final plan, and transitions status.
    async fn process_plan(&self, user_id: &str) -> Result<()>;

    /// Re-adjust an existing ready plan's principles for a user.
    async fn adjust_principles(&self, user_id: &str) -> Result<()>;
}

// Compile-time assertion: PlanWorkflow must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn PlanWorkflow) {}
};
