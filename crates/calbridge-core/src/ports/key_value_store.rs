//! Persistent key-value port (driven/secondary port)
//!
//! Holds identity maps, connection times, the active-pair list and stats.
//! Values are JSON documents; the engine owns their shape.

/// Port trait for durable engine state
///
/// ## Implementation Notes
///
/// - `set` must not return before the value is durable.
/// - A missing key is `Ok(None)`, never an error.
#[async_trait::async_trait]
pub trait IKeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>>;

    async fn set(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()>;

    /// Removes a key. Removing a missing key succeeds.
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}
