use std::collections::HashMap;
use std::sync::Arc;

use super::{FetchParams, SourceAdapter, SourceDescriptor, SourceFetch};
use crate::error::{EventMapError, EventMapResult};

/// Split `"<prefix>:<rest>"` at the first colon. Without a colon the whole
/// id is the prefix.
pub fn split_source_id(source_id: &str) -> (&str, &str) {
    source_id.split_once(':').unwrap_or((source_id, ""))
}

/// Maps source-type prefixes to adapters.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
    /// Prefixes in registration order, for listing
    order: Vec<String>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its descriptor's prefix. A prefix that is
    /// already taken keeps its first adapter; returns whether this one was added.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> bool {
        let prefix = adapter.descriptor().prefix.clone();
        if prefix.is_empty() || prefix.contains(':') {
            tracing::warn!(prefix = %prefix, "refusing to register source with invalid prefix");
            return false;
        }
        if self.adapters.contains_key(&prefix) {
            tracing::warn!(prefix = %prefix, "source prefix already registered, ignoring duplicate");
            return false;
        }

        tracing::debug!(prefix = %prefix, name = %adapter.descriptor().display_name, "registered source");
        self.order.push(prefix.clone());
        self.adapters.insert(prefix, adapter);
        true
    }

    /// The adapter for a (single, non-composite) source id.
    pub fn resolve(&self, source_id: &str) -> Option<Arc<dyn SourceAdapter>> {
        let (prefix, _) = split_source_id(source_id.trim());
        self.adapters.get(prefix).cloned()
    }

    pub fn descriptors(&self) -> Vec<&SourceDescriptor> {
        self.order
            .iter()
            .filter_map(|prefix| self.adapters.get(prefix))
            .map(|adapter| adapter.descriptor())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Fetch one source. Unknown prefixes fail with
    /// [`EventMapError::UnsupportedSource`] before any upstream call.
    pub async fn fetch(&self, source_id: &str, params: &FetchParams) -> EventMapResult<SourceFetch> {
        let (prefix, rest) = split_source_id(source_id.trim());
        let adapter = self
            .adapters
            .get(prefix)
            .ok_or_else(|| EventMapError::UnsupportedSource(prefix.to_string()))?;
        adapter.fetch(rest, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubAdapter {
        descriptor: SourceDescriptor,
        calls: AtomicUsize,
    }

    impl StubAdapter {
        fn new(prefix: &str, name: &str) -> Arc<Self> {
            Arc::new(StubAdapter {
                descriptor: SourceDescriptor::new(prefix, name, None),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn descriptor(&self) -> &SourceDescriptor {
            &self.descriptor
        }

        async fn fetch(&self, id: &str, _params: &FetchParams) -> EventMapResult<SourceFetch> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut fetch = SourceFetch::default();
            fetch.metadata.title = Some(id.to_string());
            Ok(fetch)
        }
    }

    #[test]
    fn test_split_on_first_colon_only() {
        assert_eq!(split_source_id("ical:https://x.com/a.ics"), ("ical", "https://x.com/a.ics"));
        assert_eq!(split_source_id("google"), ("google", ""));
    }

    #[test]
    fn test_duplicate_prefix_keeps_first() {
        let mut registry = SourceRegistry::new();
        assert!(registry.register(StubAdapter::new("stub", "First")));
        assert!(!registry.register(StubAdapter::new("stub", "Second")));

        let names: Vec<_> = registry.descriptors().iter().map(|d| d.display_name.clone()).collect();
        assert_eq!(names, vec!["First"]);
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let mut registry = SourceRegistry::new();
        assert!(!registry.register(StubAdapter::new("", "Empty")));
        assert!(!registry.register(StubAdapter::new("a:b", "Colon")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_is_exact_match() {
        let mut registry = SourceRegistry::new();
        registry.register(StubAdapter::new("ical", "iCal"));
        assert!(registry.resolve("ical:https://x").is_some());
        assert!(registry.resolve("ICAL:https://x").is_none());
        assert!(registry.resolve("icalx:https://x").is_none());
    }

    #[tokio::test]
    async fn test_fetch_passes_rest_and_rejects_unknown() {
        let stub = StubAdapter::new("stub", "Stub");
        let mut registry = SourceRegistry::new();
        registry.register(stub.clone());

        let fetch = registry.fetch("stub:cal:42", &FetchParams::default()).await.unwrap();
        assert_eq!(fetch.metadata.title.as_deref(), Some("cal:42"));

        let err = registry.fetch("nope:1", &FetchParams::default()).await.unwrap_err();
        assert!(matches!(err, EventMapError::UnsupportedSource(p) if p == "nope"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }
}
