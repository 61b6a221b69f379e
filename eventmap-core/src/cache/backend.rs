use async_trait::async_trait;

use crate::error::EventMapResult;

/// A raw key-value backend. Keys arrive fully prefixed and values are
/// already serialized; TTLs are whole seconds, `None` meaning "never expires".
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> EventMapResult<Option<String>>;

    /// One slot per key, in key order.
    async fn mget(&self, keys: &[String]) -> EventMapResult<Vec<Option<String>>>;

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> EventMapResult<()>;

    /// No atomicity across entries: a failure may leave some written.
    async fn mset(&self, entries: &[(String, String)], ttl_secs: Option<u64>)
    -> EventMapResult<()>;
}
