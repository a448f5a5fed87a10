//! The `KvStore` trait -- the storage seam every other component consumes.
//!
//! The trait is intentionally object-safe so call sites can hold
//! `Arc<dyn KvStore>` and tests can swap the SQLite backend for the
//! in-memory one.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Minimal key-value contract: get, put, delete, list-by-prefix.
///
/// `list` returns key names only, in lexicographic order. There is no
/// compare-and-swap and no multi-key atomicity; concurrent writers to the
/// same key can lose updates, and callers are expected to tolerate that.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, overwriting any existing value.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all key names starting with `prefix`, lexicographically sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

// Compile-time assertion: KvStore must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn KvStore) {}
};

/// Deserialize the JSON value stored under `key`.
///
/// Returns `Ok(None)` when the key is absent; a present but unparsable
/// value is an error (the store holds only values this crate wrote).
pub async fn get_json<T: DeserializeOwned>(kv: &dyn KvStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = kv.get(key).await? else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse JSON stored under key {key}"))?;
    Ok(Some(value))
}

/// Serialize `value` to JSON and store it under `key`.
pub async fn put_json<T: Serialize>(kv: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .with_context(|| format!("failed to serialize value for key {key}"))?;
    kv.put(key, &raw).await
}

/// In-memory backend over a `BTreeMap`. Used by tests and embedders that
/// do not need durability. The map is ordered so `list` comes out sorted
/// for free.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("kv mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .expect("kv mutex poisoned")
            .get(key)
            .cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .expect("kv mutex poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().expect("kv mutex poisoned").remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().expect("kv mutex poisoned");
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[tokio::test]
    async fn memory_kv_round_trip() {
        let kv = MemoryKv::new();
        kv.put("a", "1").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("1"));

        kv.put("a", "2").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("2"));

        kv.delete("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
        // Deleting an absent key is fine.
        kv.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn memory_kv_list_by_prefix() {
        let kv = MemoryKv::new();
        kv.put("plan_status_u1", "x").await.unwrap();
        kv.put("plan_status_u2", "x").await.unwrap();
        kv.put("profile_u1", "x").await.unwrap();

        let keys = kv.list("plan_status_").await.unwrap();
        assert_eq!(keys, vec!["plan_status_u1", "plan_status_u2"]);
        assert!(kv.list("missing_").await.unwrap().is_empty());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        n: u32,
    }

    #[tokio::test]
    async fn json_helpers_round_trip() {
        let kv = MemoryKv::new();
        assert_eq!(get_json::<Sample>(&kv, "p").await.unwrap(), None);

        put_json(&kv, "p", &Sample { n: 7 }).await.unwrap();
        assert_eq!(
            get_json::<Sample>(&kv, "p").await.unwrap(),
            Some(Sample { n: 7 })
        );
    }

    #[tokio::test]
    async fn json_helper_rejects_garbage() {
        let kv = MemoryKv::new();
        kv.put("p", "not-json").await.unwrap();
        assert!(get_json::<Sample>(&kv, "p").await.is_err());
    }
}
