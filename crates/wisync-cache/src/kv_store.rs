//! SQLite implementation of IKeyValueStore
//!
//! One row per key in `kv_store`. Values are opaque text; `updated_at` is
//! stored as RFC 3339 so it sorts and parses with chrono.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use wisync_core::ports::IKeyValueStore;

use crate::CacheError;

/// Key-value adapter over the `kv_store` table
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// When `key` was last written, if it exists
    pub async fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, CacheError> {
        let raw: Option<String> = sqlx::query_scalar("SELECT updated_at FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| CacheError::CorruptValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        })
        .transpose()
    }

    /// Removes `key`; returns whether it existed
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        tracing::trace!(key, "Deleted key");
        Ok(result.rows_affected() > 0)
    }

    /// All stored keys, sorted
    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let rows = sqlx::query("SELECT key FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("key")).collect())
    }
}

#[async_trait::async_trait]
impl IKeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let updated_at = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(&updated_at)
        .execute(&self.pool)
        .await?;

        tracing::trace!(key, bytes = value.len(), "Stored value");
        Ok(())
    }
}
