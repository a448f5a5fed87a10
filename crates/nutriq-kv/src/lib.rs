//! Key-value storage abstraction for the nutriq coordinator.
//!
//! The target environment offers a plain key-value store: get, put, delete,
//! and list-by-prefix. No multi-key transactions, no locks, no conditional
//! writes. Everything above this crate treats list-shaped values as
//! read-whole/write-whole and every read as a stale snapshot.

pub mod config;
pub mod keys;
pub mod sqlite;
pub mod store;

pub use config::KvConfig;
pub use sqlite::SqliteKv;
pub use store::{KvStore, MemoryKv, get_json, put_json};
