//! Durable key-value store port (driven/secondary port)
//!
//! Used for exactly one key holding the serialized pending change snapshot.
//! Values are opaque strings; serialization is the caller's concern.

/// Port trait for small durable settings-style values
#[async_trait::async_trait]
pub trait IKeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` if the key was never set
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}
