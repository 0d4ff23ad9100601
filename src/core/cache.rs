use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A byte-oriented key-value collection with optional per-entry expiry.
///
/// Failures inside an implementation are logged and treated as a miss; a
/// cache must never fail the caller.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    async fn put(&self, key: &[u8], value: &[u8], ttl: Option<Duration>);
    async fn remove(&self, key: &[u8]);
}

/// Hands out named collections, either persisted to disk or kept in memory.
pub trait Store: Send + Sync {
    fn get_collection(&self, name: &str, persist: bool) -> Arc<dyn KeyValueCollection>;
}
