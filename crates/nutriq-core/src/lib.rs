//! Core coordination logic for AI-backed nutrition plan generation.
//!
//! Three tightly coupled pieces: the per-user plan status state machine and
//! its work queues, the event-sourced mutation queue with its dispatcher,
//! and the macro reconciliation engine that gates what may be published as
//! a ready plan. A periodic scheduler driver ties them together.

pub mod error;
pub mod events;
pub mod macros;
pub mod plan;
pub mod scheduler;
pub mod status;
pub mod workflow;

pub use error::CoordinatorError;
