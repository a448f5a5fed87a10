//! SQLite-backed `KvStore`.
//!
//! A single `kv(key, value)` table stands in for the hosted key-value
//! service in local deployments and integration tests. The backend keeps
//! the same weak contract as the hosted store: single-key operations only,
//! last-writer-wins.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::store::KvStore;

/// SQLite-backed key-value store.
#[derive(Debug, Clone)]
pub struct SqliteKv {
    pool: SqlitePool,
}

impl SqliteKv {
    /// Open (creating if missing) the database at `path` and ensure the
    /// `kv` table exists.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database at {}", path.display()))?;

        sqlx::query("CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&pool)
            .await
            .context("failed to create kv table")?;

        info!(path = %path.display(), "opened sqlite kv store");
        Ok(Self { pool })
    }

    /// Build a store over an existing pool (the table must already exist).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Escape LIKE wildcards in `prefix` so it matches literally.
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to get key {key}"))?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to put key {key}"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete key {key}"))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}%", escape_like(prefix));
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM kv WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key ASC",
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list keys with prefix {prefix}"))?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_handles_wildcards() {
        assert_eq!(escape_like("plain_prefix"), "plain\\_prefix");
        assert_eq!(escape_like("a%b"), "a\\%b");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("abc"), "abc");
    }
}
