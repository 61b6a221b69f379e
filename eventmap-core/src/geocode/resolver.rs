use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use super::Geocoder;
use crate::cache::{CacheStore, Ttl};
use crate::config::GeocoderConfig;
use crate::constants::{
    DEFAULT_GEOCODE_CONCURRENCY, DEFAULT_GEOCODE_TIMEOUT, GEOCODE_CACHE_PREFIX,
    GEOCODE_FAILURE_TTL_SECS, GEOCODE_NOT_FOUND_TTL_SECS, GEOCODE_RESOLVED_TTL_SECS,
};
use crate::event::{LocationStatus, ResolvedLocation};

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Per-lookup limit; a lookup that takes longer counts as a failure
    pub timeout: Duration,
    pub concurrency: usize,
    pub resolved_ttl: Ttl,
    pub not_found_ttl: Ttl,
    pub failure_ttl: Ttl,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        ResolverOptions {
            timeout: DEFAULT_GEOCODE_TIMEOUT,
            concurrency: DEFAULT_GEOCODE_CONCURRENCY,
            resolved_ttl: Ttl::Seconds(GEOCODE_RESOLVED_TTL_SECS),
            not_found_ttl: Ttl::Seconds(GEOCODE_NOT_FOUND_TTL_SECS),
            failure_ttl: Ttl::Seconds(GEOCODE_FAILURE_TTL_SECS),
        }
    }
}

impl From<&GeocoderConfig> for ResolverOptions {
    fn from(config: &GeocoderConfig) -> Self {
        ResolverOptions {
            timeout: config.timeout(),
            concurrency: config.concurrency.max(1),
            resolved_ttl: class_ttl(config.resolved_ttl_secs, GEOCODE_RESOLVED_TTL_SECS),
            not_found_ttl: class_ttl(config.not_found_ttl_secs, GEOCODE_NOT_FOUND_TTL_SECS),
            failure_ttl: class_ttl(config.failure_ttl_secs, GEOCODE_FAILURE_TTL_SECS),
        }
    }
}

/// A configured 0 falls back to the class default instead of never expiring.
fn class_ttl(secs: u64, default_secs: u64) -> Ttl {
    Ttl::Seconds(if secs == 0 { default_secs } else { secs })
}

/// How one upstream lookup ended; decides the cache TTL.
enum Outcome {
    Found(ResolvedLocation),
    NotFound(ResolvedLocation),
    Failed(ResolvedLocation),
}

/// Resolves location texts through the cache, then the geocoder.
#[derive(Clone)]
pub struct GeocodeResolver {
    cache: CacheStore,
    geocoder: Option<Arc<dyn Geocoder>>,
    options: ResolverOptions,
}

impl GeocodeResolver {
    pub fn new(cache: CacheStore, geocoder: Option<Arc<dyn Geocoder>>) -> Self {
        GeocodeResolver {
            cache,
            geocoder,
            options: ResolverOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn has_geocoder(&self) -> bool {
        self.geocoder.is_some()
    }

    /// One result per unique non-blank text, in first-occurrence order.
    ///
    /// Never fails: cache trouble reads as misses, provider trouble as
    /// `unresolved`, and without a geocoder misses come back `pending`.
    pub async fn resolve_batch(&self, texts: &[String]) -> Vec<ResolvedLocation> {
        let unique = unique_texts(texts);
        if unique.is_empty() {
            return Vec::new();
        }

        let cached: Vec<Option<ResolvedLocation>> = self
            .cache
            .mget(&unique, Some(GEOCODE_CACHE_PREFIX))
            .await
            .unwrap_or_else(|| vec![None; unique.len()]);

        let mut results: Vec<Option<ResolvedLocation>> = cached
            .into_iter()
            .zip(&unique)
            .map(|(hit, text)| hit.filter(|loc| usable_cache_entry(loc, text)))
            .collect();

        let misses: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_none())
            .map(|(i, _)| i)
            .collect();

        tracing::debug!(
            unique = unique.len(),
            cached = unique.len() - misses.len(),
            misses = misses.len(),
            "geocode batch"
        );

        match &self.geocoder {
            None => {
                for i in misses {
                    results[i] = Some(ResolvedLocation::pending(&unique[i]));
                }
            }
            Some(geocoder) => {
                let outcomes: Vec<(usize, Outcome)> = stream::iter(misses)
                    .map(|i| {
                        let text = unique[i].as_str();
                        async move { (i, self.lookup(geocoder.as_ref(), text).await) }
                    })
                    .buffer_unordered(self.options.concurrency.max(1))
                    .collect()
                    .await;

                self.store(&outcomes).await;
                for (i, outcome) in outcomes {
                    let (Outcome::Found(loc) | Outcome::NotFound(loc) | Outcome::Failed(loc)) =
                        outcome;
                    results[i] = Some(loc);
                }
            }
        }

        results
            .into_iter()
            .zip(&unique)
            .map(|(loc, text)| loc.unwrap_or_else(|| ResolvedLocation::unresolved(text)))
            .collect()
    }

    /// Like [`resolve_batch`](Self::resolve_batch), keyed by text.
    pub async fn resolve_map(&self, texts: &[String]) -> HashMap<String, ResolvedLocation> {
        self.resolve_batch(texts)
            .await
            .into_iter()
            .map(|loc| (loc.original_location_text.clone(), loc))
            .collect()
    }

    async fn lookup(&self, geocoder: &dyn Geocoder, text: &str) -> Outcome {
        match tokio::time::timeout(self.options.timeout, geocoder.geocode(text)).await {
            Ok(Ok(Some(hit))) => {
                let loc = ResolvedLocation::resolved(text, hit.formatted_address, hit.lat, hit.lng);
                if loc.is_resolved() {
                    Outcome::Found(loc)
                } else {
                    Outcome::NotFound(loc)
                }
            }
            Ok(Ok(None)) => Outcome::NotFound(ResolvedLocation::unresolved(text)),
            Ok(Err(e)) => {
                tracing::warn!(location = text, error = %e, "geocoding failed");
                Outcome::Failed(ResolvedLocation::unresolved(text))
            }
            Err(_) => {
                tracing::warn!(
                    location = text,
                    timeout_secs = self.options.timeout.as_secs(),
                    "geocoding timed out"
                );
                Outcome::Failed(ResolvedLocation::unresolved(text))
            }
        }
    }

    /// Write lookup outcomes back, one batch per TTL class.
    async fn store(&self, outcomes: &[(usize, Outcome)]) {
        let mut found = (Vec::new(), Vec::new());
        let mut not_found = (Vec::new(), Vec::new());
        let mut failed = (Vec::new(), Vec::new());

        for (_, outcome) in outcomes {
            let ((keys, values), loc) = match outcome {
                Outcome::Found(loc) => (&mut found, loc),
                Outcome::NotFound(loc) => (&mut not_found, loc),
                Outcome::Failed(loc) => (&mut failed, loc),
            };
            keys.push(loc.original_location_text.clone());
            values.push(loc);
        }

        for ((keys, values), ttl) in [
            (found, self.options.resolved_ttl),
            (not_found, self.options.not_found_ttl),
            (failed, self.options.failure_ttl),
        ] {
            if !keys.is_empty() {
                self.cache.mset(&keys, &values, Some(GEOCODE_CACHE_PREFIX), ttl).await;
            }
        }
    }
}

/// Distinct texts with content, in first-occurrence order.
fn unique_texts(texts: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    texts
        .iter()
        .filter(|text| !text.trim().is_empty())
        .filter(|text| seen.insert(text.as_str()))
        .cloned()
        .collect()
}

/// Cached entries must describe the text they were stored under and satisfy
/// the resolved ⇒ finite coordinates rule; pending is never a final answer.
fn usable_cache_entry(loc: &ResolvedLocation, text: &str) -> bool {
    loc.original_location_text == text
        && loc.status != LocationStatus::Pending
        && loc.is_consistent()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use crate::error::{EventMapError, EventMapResult};
    use crate::geocode::GeocodeHit;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn test_zero_config_ttl_uses_class_default() {
        let config = GeocoderConfig {
            resolved_ttl_secs: 0,
            not_found_ttl_secs: 0,
            failure_ttl_secs: 0,
            ..Default::default()
        };
        let options = ResolverOptions::from(&config);
        assert_eq!(options.resolved_ttl, Ttl::Seconds(GEOCODE_RESOLVED_TTL_SECS));
        assert_eq!(options.not_found_ttl, Ttl::Seconds(GEOCODE_NOT_FOUND_TTL_SECS));
        assert_eq!(options.failure_ttl, Ttl::Seconds(GEOCODE_FAILURE_TTL_SECS));

        let custom = GeocoderConfig {
            failure_ttl_secs: 120,
            ..Default::default()
        };
        assert_eq!(ResolverOptions::from(&custom).failure_ttl, Ttl::Seconds(120));
    }

    /// Answers from a fixed table and records every lookup.
    #[derive(Default)]
    struct FakeGeocoder {
        places: HashMap<String, (f64, f64)>,
        failing: HashSet<String>,
        delay: Option<Duration>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeGeocoder {
        fn with_places(places: &[(&str, f64, f64)]) -> Self {
            FakeGeocoder {
                places: places
                    .iter()
                    .map(|(text, lat, lng)| (text.to_string(), (*lat, *lng)))
                    .collect(),
                ..Default::default()
            }
        }

        fn calls_for(&self, text: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|t| *t == text).count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn geocode(&self, text: &str) -> EventMapResult<Option<GeocodeHit>> {
            self.calls.lock().unwrap().push(text.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.contains(text) {
                return Err(EventMapError::Geocode("upstream 500".into()));
            }
            Ok(self.places.get(text).map(|(lat, lng)| GeocodeHit {
                formatted_address: Some(format!("{text} (formatted)")),
                lat: *lat,
                lng: *lng,
            }))
        }
    }

    fn strings(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    fn memory_cache() -> (CacheStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (CacheStore::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_blank_texts_are_excluded() {
        let geocoder = Arc::new(FakeGeocoder::with_places(&[("X", 1.0, 2.0)]));
        let resolver = GeocodeResolver::new(CacheStore::disabled(), Some(geocoder.clone()));

        let results = resolver.resolve_batch(&strings(&["", "  ", "X"])).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].original_location_text, "X");
        assert_eq!(results[0].coordinates(), Some((1.0, 2.0)));
        assert_eq!(geocoder.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_are_looked_up_once() {
        let geocoder = Arc::new(FakeGeocoder::with_places(&[("A", 1.0, 1.0), ("B", 2.0, 2.0)]));
        let resolver = GeocodeResolver::new(CacheStore::disabled(), Some(geocoder.clone()));

        let results = resolver.resolve_batch(&strings(&["A", "A", "B"])).await;
        let texts: Vec<_> = results.iter().map(|r| r.original_location_text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B"]);
        assert_eq!(geocoder.calls_for("A"), 1);
        assert_eq!(geocoder.calls_for("B"), 1);
    }

    #[tokio::test]
    async fn test_second_batch_is_served_from_cache() {
        let (cache, _) = memory_cache();
        let geocoder = Arc::new(FakeGeocoder::with_places(&[("Berlin", 52.52, 13.4)]));
        let resolver = GeocodeResolver::new(cache, Some(geocoder.clone()));

        let texts = strings(&["Berlin", "Atlantis"]);
        let first = resolver.resolve_batch(&texts).await;
        let second = resolver.resolve_batch(&texts).await;

        assert_eq!(first, second);
        assert_eq!(geocoder.total_calls(), 2);
        assert_eq!(second[0].status, LocationStatus::Resolved);
        assert_eq!(second[1].status, LocationStatus::Unresolved);
    }

    #[tokio::test]
    async fn test_failure_is_cached_only_as_unresolved() {
        let (cache, _) = memory_cache();
        let geocoder = Arc::new(FakeGeocoder {
            failing: HashSet::from(["Flaky".to_string()]),
            ..FakeGeocoder::with_places(&[("Flaky", 1.0, 1.0)])
        });
        let resolver = GeocodeResolver::new(cache.clone(), Some(geocoder));

        let results = resolver.resolve_batch(&strings(&["Flaky"])).await;
        assert_eq!(results[0].status, LocationStatus::Unresolved);

        let stored: ResolvedLocation = cache.get("Flaky", Some(GEOCODE_CACHE_PREFIX)).await.unwrap();
        assert_eq!(stored.status, LocationStatus::Unresolved);
        assert!(stored.lat.is_none());
    }

    #[tokio::test]
    async fn test_without_geocoder_misses_are_pending_and_not_written() {
        let (cache, backend) = memory_cache();
        let known = ResolvedLocation::resolved("Paris", None, 48.85, 2.35);
        cache
            .set("Paris", &known, Some(GEOCODE_CACHE_PREFIX), Ttl::Default)
            .await;

        let resolver = GeocodeResolver::new(cache, None);
        let results = resolver.resolve_batch(&strings(&["Paris", "Lyon"])).await;

        assert_eq!(results[0], known);
        assert_eq!(results[1].status, LocationStatus::Pending);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_inconsistent_cache_entry_is_a_miss() {
        let (cache, _) = memory_cache();
        let broken = ResolvedLocation {
            original_location_text: "Rome".into(),
            formatted_address: None,
            lat: None,
            lng: None,
            status: LocationStatus::Resolved,
        };
        cache.set("Rome", &broken, Some(GEOCODE_CACHE_PREFIX), Ttl::Default).await;

        let geocoder = Arc::new(FakeGeocoder::with_places(&[("Rome", 41.9, 12.5)]));
        let resolver = GeocodeResolver::new(cache, Some(geocoder.clone()));
        let results = resolver.resolve_batch(&strings(&["Rome"])).await;

        assert_eq!(geocoder.calls_for("Rome"), 1);
        assert_eq!(results[0].coordinates(), Some((41.9, 12.5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_unresolved() {
        let geocoder = Arc::new(FakeGeocoder {
            delay: Some(Duration::from_secs(60)),
            ..FakeGeocoder::with_places(&[("Slow", 1.0, 1.0)])
        });
        let resolver = GeocodeResolver::new(CacheStore::disabled(), Some(geocoder)).with_options(
            ResolverOptions {
                timeout: Duration::from_secs(10),
                ..ResolverOptions::default()
            },
        );

        let results = resolver.resolve_batch(&strings(&["Slow"])).await;
        assert_eq!(results[0].status, LocationStatus::Unresolved);
    }

    #[tokio::test]
    async fn test_resolve_map_keys_by_text() {
        let geocoder = Arc::new(FakeGeocoder::with_places(&[("A", 1.0, 1.0)]));
        let resolver = GeocodeResolver::new(CacheStore::disabled(), Some(geocoder));
        let map = resolver.resolve_map(&strings(&["A", "B", "A"])).await;
        assert_eq!(map.len(), 2);
        assert!(map["A"].is_resolved());
        assert!(!map["B"].is_resolved());
    }
}
