mod memory;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub use memory::InMemoryStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur at the key-value layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key {0} holds a value of the wrong type")]
    WrongType(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Atomic key-value primitives shared by every match and lobby.
///
/// Each primitive is atomic on its own; the engine must not assume multi-key
/// atomicity. The two exceptions are [`hset_if_eq`](KeyValueStore::hset_if_eq)
/// and [`set_nx`](KeyValueStore::set_nx), which model server-side scripted
/// transactions and are the only way to make a read-then-write decision
/// exactly once across racing callers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn hset(&self, key: &str, entries: &[(&str, String)]) -> StoreResult<()>;

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<()>;

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool>;

    async fn hlen(&self, key: &str) -> StoreResult<usize>;

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64>;

    /// Guarded multi-field write: if `field` currently equals `expected`,
    /// apply all `updates` atomically and return `true`; otherwise leave the
    /// hash untouched and return `false`. A missing key or field never
    /// matches.
    async fn hset_if_eq(
        &self,
        key: &str,
        field: &str,
        expected: &str,
        updates: &[(&str, String)],
    ) -> StoreResult<bool>;

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<()>;

    async fn srem(&self, key: &str, member: &str) -> StoreResult<()>;

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Set `key` only if it is absent, optionally with a TTL. Returns `true`
    /// if this call claimed the key.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<bool>;

    async fn del(&self, keys: &[&str]) -> StoreResult<()>;

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()>;
}
