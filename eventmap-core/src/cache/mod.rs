//! Key-value cache with TTLs, key prefixes and batch operations.
//!
//! [`CacheStore`] wraps an optional [`CacheBackend`]. Without a backend
//! (no credentials configured) every read misses and every write is dropped.
//! Backend failures are logged and handled the same way, so callers never see
//! a cache error.

mod backend;
mod memory;
mod rest;

pub use backend::CacheBackend;
pub use memory::MemoryBackend;
pub use rest::RestBackend;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{CacheConfig, CacheKind};
use crate::constants::DEFAULT_CACHE_TTL_SECS;

/// Expiry policy for a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ttl {
    /// The store's default (30 days unless configured otherwise)
    #[default]
    Default,
    Never,
    Seconds(u64),
}

impl Ttl {
    /// `None` and non-positive values mean "never expires".
    pub fn from_seconds(secs: Option<i64>) -> Self {
        match secs {
            Some(secs) if secs > 0 => Ttl::Seconds(secs.unsigned_abs()),
            _ => Ttl::Never,
        }
    }

    fn as_secs(self, default_secs: u64) -> Option<u64> {
        let secs = match self {
            Ttl::Default => default_secs,
            Ttl::Never => 0,
            Ttl::Seconds(secs) => secs,
        };
        (secs > 0).then_some(secs)
    }
}

#[derive(Clone)]
pub struct CacheStore {
    backend: Option<Arc<dyn CacheBackend>>,
    namespace: String,
    default_ttl_secs: u64,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        CacheStore {
            backend: Some(backend),
            namespace: String::new(),
            default_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }

    /// A store that never holds anything.
    pub fn disabled() -> Self {
        CacheStore {
            backend: None,
            namespace: String::new(),
            default_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }

    /// Build from configuration. Missing credentials yield a disabled store.
    pub fn from_config(config: &CacheConfig) -> Self {
        let store = match config.kind {
            CacheKind::Disabled => Self::disabled(),
            CacheKind::Memory => Self::new(Arc::new(MemoryBackend::new())),
            CacheKind::Auto | CacheKind::Rest => match config.credentials() {
                Some((url, token)) => match RestBackend::new(url, token) {
                    Ok(backend) => Self::new(Arc::new(backend)),
                    Err(e) => {
                        tracing::warn!(error = %e, "could not build cache client, caching disabled");
                        Self::disabled()
                    }
                },
                None => {
                    if config.kind == CacheKind::Rest {
                        tracing::warn!("cache url/token not configured, caching disabled");
                    } else {
                        tracing::debug!("no cache credentials, caching disabled");
                    }
                    Self::disabled()
                }
            },
        };

        store
            .with_namespace(&config.namespace)
            .with_default_ttl(config.default_ttl_secs)
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn with_default_ttl(mut self, secs: u64) -> Self {
        self.default_ttl_secs = secs;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    fn full_key(&self, key: &str, prefix: Option<&str>) -> String {
        [self.namespace.as_str(), prefix.unwrap_or_default(), key]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(":")
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str, prefix: Option<&str>) -> Option<T> {
        let backend = self.backend.as_ref()?;
        if key.is_empty() {
            return None;
        }

        let full_key = self.full_key(key, prefix);
        match backend.get(&full_key).await {
            Ok(raw) => raw.and_then(|raw| decode(&full_key, &raw)),
            Err(e) => {
                tracing::warn!(backend = backend.name(), key = %full_key, error = %e, "cache get failed");
                None
            }
        }
    }

    /// Values are JSON-encoded. A value that encodes to `null` is not written.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        prefix: Option<&str>,
        ttl: Ttl,
    ) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if key.is_empty() {
            return;
        }
        let Some(raw) = encode(value) else {
            return;
        };

        let full_key = self.full_key(key, prefix);
        let ttl_secs = ttl.as_secs(self.default_ttl_secs);
        if let Err(e) = backend.set(&full_key, &raw, ttl_secs).await {
            tracing::warn!(backend = backend.name(), key = %full_key, error = %e, "cache set failed");
        }
    }

    /// One slot per key, in key order. `None` for an empty key list or a
    /// disabled store; a failing backend reads as all misses.
    pub async fn mget<T: DeserializeOwned>(
        &self,
        keys: &[String],
        prefix: Option<&str>,
    ) -> Option<Vec<Option<T>>> {
        if keys.is_empty() {
            return None;
        }
        let backend = self.backend.as_ref()?;

        let lookups: Vec<(usize, String)> = keys
            .iter()
            .enumerate()
            .filter(|(_, key)| !key.is_empty())
            .map(|(i, key)| (i, self.full_key(key, prefix)))
            .collect();

        let mut slots: Vec<Option<T>> = keys.iter().map(|_| None).collect();
        if lookups.is_empty() {
            return Some(slots);
        }

        let full_keys: Vec<String> = lookups.iter().map(|(_, key)| key.clone()).collect();
        match backend.mget(&full_keys).await {
            Ok(values) => {
                for ((index, full_key), raw) in lookups.iter().zip(values) {
                    if let Some(slot) = slots.get_mut(*index) {
                        *slot = raw.and_then(|raw| decode(full_key, &raw));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(backend = backend.name(), keys = full_keys.len(), error = %e, "cache mget failed");
            }
        }
        tracing::debug!(
            requested = keys.len(),
            hits = slots.iter().filter(|s| s.is_some()).count(),
            "cache mget"
        );
        Some(slots)
    }

    /// Pairs `keys[i]` with `values[i]`. Empty keys and `null` values are
    /// skipped; on a length mismatch only the common prefix is written.
    pub async fn mset<T: Serialize>(
        &self,
        keys: &[String],
        values: &[T],
        prefix: Option<&str>,
        ttl: Ttl,
    ) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if keys.len() != values.len() {
            tracing::warn!(
                keys = keys.len(),
                values = values.len(),
                "cache mset called with mismatched lengths"
            );
        }

        let entries: Vec<(String, String)> = keys
            .iter()
            .zip(values)
            .filter(|(key, _)| !key.is_empty())
            .filter_map(|(key, value)| Some((self.full_key(key, prefix), encode(value)?)))
            .collect();
        if entries.is_empty() {
            return;
        }

        let ttl_secs = ttl.as_secs(self.default_ttl_secs);
        if let Err(e) = backend.mset(&entries, ttl_secs).await {
            tracing::warn!(backend = backend.name(), entries = entries.len(), error = %e, "cache mset failed");
        }
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Option<String> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Null) => None,
        Ok(json) => Some(json.to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "could not serialize cache value");
            None
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(key, error = %e, "ignoring undecodable cache entry");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EventMapError, EventMapResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Duration;

    fn memory_store() -> (CacheStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::new(backend.clone()).with_namespace("test");
        (store, backend)
    }

    /// Counts calls and always fails.
    #[derive(Default)]
    struct BrokenBackend {
        calls: AtomicUsize,
    }

    impl BrokenBackend {
        fn fail<T>(&self) -> EventMapResult<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EventMapError::Cache("connection refused".into()))
        }
    }

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn get(&self, _key: &str) -> EventMapResult<Option<String>> {
            self.fail()
        }
        async fn mget(&self, _keys: &[String]) -> EventMapResult<Vec<Option<String>>> {
            self.fail()
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Option<u64>) -> EventMapResult<()> {
            self.fail()
        }
        async fn mset(&self, _e: &[(String, String)], _ttl: Option<u64>) -> EventMapResult<()> {
            self.fail()
        }
    }

    #[tokio::test]
    async fn test_set_then_get_with_prefix() {
        let (store, _) = memory_store();
        store.set("key", "value", Some("p"), Ttl::Default).await;
        assert_eq!(store.get::<String>("key", Some("p")).await.as_deref(), Some("value"));
        assert_eq!(store.get::<String>("key", None).await, None);
        assert_eq!(store.get::<String>("key", Some("other")).await, None);
    }

    #[tokio::test]
    async fn test_disabled_store_is_a_no_op() {
        let store = CacheStore::disabled();
        store.set("key", "value", Some("p"), Ttl::Default).await;
        assert_eq!(store.get::<String>("key", Some("p")).await, None);
        assert!(store.mget::<String>(&["key".into()], Some("p")).await.is_none());
        store.mset(&["key".to_string()], &["v"], None, Ttl::Never).await;
    }

    #[tokio::test]
    async fn test_empty_inputs_skip_the_backend() {
        let backend = Arc::new(BrokenBackend::default());
        let store = CacheStore::new(backend.clone());

        assert_eq!(store.get::<String>("", None).await, None);
        store.set("", "v", None, Ttl::Default).await;
        store.set("k", &Option::<String>::None, None, Ttl::Default).await;
        assert!(store.mget::<String>(&[], None).await.is_none());
        store.mset::<String>(&[], &[], None, Ttl::Default).await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_errors_read_as_misses() {
        let backend = Arc::new(BrokenBackend::default());
        let store = CacheStore::new(backend.clone());

        assert_eq!(store.get::<String>("k", None).await, None);
        let slots = store.mget::<String>(&["a".into(), "b".into()], None).await;
        assert_eq!(slots, Some(vec![None, None]));
        store.set("k", "v", None, Ttl::Default).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_mget_mset_round_trip_with_gaps() {
        let (store, _) = memory_store();
        let keys = vec!["a".to_string(), "b".to_string()];
        store.mset(&keys, &[1, 2], Some("n"), Ttl::Default).await;

        let slots = store
            .mget::<i32>(&["b".into(), "".into(), "z".into(), "a".into()], Some("n"))
            .await;
        assert_eq!(slots, Some(vec![Some(2), None, None, Some(1)]));
    }

    #[tokio::test]
    async fn test_mset_mismatched_lengths_writes_common_prefix() {
        let (store, backend) = memory_store();
        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        store.mset(&keys, &["x"], None, Ttl::Default).await;
        assert_eq!(backend.len().await, 1);
        assert_eq!(store.get::<String>("a", None).await.as_deref(), Some("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_policies() {
        let (store, _) = memory_store();
        let store = store.with_default_ttl(100);
        store.set("default", "1", None, Ttl::Default).await;
        store.set("short", "2", None, Ttl::Seconds(10)).await;
        store.set("never", "3", None, Ttl::from_seconds(Some(-1))).await;
        store.set("null", "4", None, Ttl::from_seconds(None)).await;

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(store.get::<String>("short", None).await, None);
        assert!(store.get::<String>("default", None).await.is_some());

        tokio::time::advance(Duration::from_secs(1_000_000)).await;
        assert_eq!(store.get::<String>("default", None).await, None);
        assert!(store.get::<String>("never", None).await.is_some());
        assert!(store.get::<String>("null", None).await.is_some());
    }

    #[tokio::test]
    async fn test_max_ttl_is_accepted() {
        let (store, backend) = memory_store();
        store.set("k", "v", None, Ttl::from_seconds(Some(i64::MAX))).await;
        store
            .mset(&["m".to_string()], &["w"], None, Ttl::Seconds(u64::MAX))
            .await;
        assert_eq!(store.get::<String>("k", None).await.as_deref(), Some("v"));
        assert_eq!(backend.len().await, 2);
    }

    #[test]
    fn test_full_key_skips_empty_parts() {
        let store = CacheStore::disabled().with_namespace("ns");
        assert_eq!(store.full_key("k", Some("geo")), "ns:geo:k");
        assert_eq!(store.full_key("k", None), "ns:k");
        assert_eq!(CacheStore::disabled().full_key("k", None), "k");
    }

    #[test]
    fn test_ttl_from_seconds() {
        assert_eq!(Ttl::from_seconds(None), Ttl::Never);
        assert_eq!(Ttl::from_seconds(Some(-1)), Ttl::Never);
        assert_eq!(Ttl::from_seconds(Some(0)), Ttl::Never);
        assert_eq!(Ttl::from_seconds(Some(60)), Ttl::Seconds(60));
        assert_eq!(Ttl::Default.as_secs(30), Some(30));
        assert_eq!(Ttl::Never.as_secs(30), None);
    }
}
