//! In-process cache backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use super::backend::CacheBackend;
use crate::error::EventMapResult;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// A map behind a mutex, with lazy expiry on read.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) entry count.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().await.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// A TTL too large to represent as an instant never expires.
    fn entry(value: &str, ttl_secs: Option<u64>) -> Entry {
        Entry {
            value: value.to_string(),
            expires_at: ttl_secs
                .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs))),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> EventMapResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn mget(&self, keys: &[String]) -> EventMapResult<Vec<Option<String>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => values.push(Some(entry.value.clone())),
                Some(_) => {
                    entries.remove(key);
                    values.push(None);
                }
                None => values.push(None),
            }
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> EventMapResult<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Self::entry(value, ttl_secs));
        Ok(())
    }

    async fn mset(
        &self,
        entries: &[(String, String)],
        ttl_secs: Option<u64>,
    ) -> EventMapResult<()> {
        let mut map = self.entries.lock().await;
        for (key, value) in entries {
            map.insert(key.clone(), Self::entry(value, ttl_secs));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let backend = MemoryBackend::new();
        backend.set("short", "1", Some(10)).await.unwrap();
        backend.set("forever", "2", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(backend.get("short").await.unwrap().as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(backend.get("short").await.unwrap(), None);
        assert_eq!(backend.get("forever").await.unwrap().as_deref(), Some("2"));
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mget_evicts_expired_entries() {
        let backend = MemoryBackend::new();
        backend
            .mset(&[("old".into(), "1".into()), ("new".into(), "2".into())], Some(10))
            .await
            .unwrap();
        backend.set("keep", "3", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        let values = backend.mget(&["old".into(), "keep".into()]).await.unwrap();
        assert_eq!(values, vec![None, Some("3".into())]);

        let entries = backend.entries.lock().await;
        assert!(!entries.contains_key("old"));
        // Not read, so still stored
        assert!(entries.contains_key("new"));
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let backend = MemoryBackend::new();
        backend.set("k", "v", Some(u64::MAX)).await.unwrap();
        backend
            .mset(&[("m".into(), "w".into())], Some(i64::MAX as u64))
            .await
            .unwrap();

        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(backend.entries.lock().await.values().all(|e| e.expires_at.is_none()));
    }

    #[tokio::test]
    async fn test_mget_preserves_key_order() {
        let backend = MemoryBackend::new();
        backend
            .mset(&[("a".into(), "1".into()), ("c".into(), "3".into())], None)
            .await
            .unwrap();
        let values = backend
            .mget(&["c".into(), "b".into(), "a".into()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("3".into()), None, Some("1".into())]);
    }
}
