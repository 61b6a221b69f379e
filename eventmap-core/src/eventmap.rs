//! The assembled engine: sources, cache, geocoding and aggregation.

use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::{Aggregation, Aggregator};
use crate::cache::CacheStore;
use crate::config::AppConfig;
use crate::date_text::DateTextParser;
use crate::error::{AggregateError, EventMapResult};
use crate::event::CanonicalEvent;
use crate::filter::{Bounds, FacetResult, FilterState, compute_facets};
use crate::geocode::{GeocodeResolver, Geocoder, GoogleGeocoder, ResolverOptions};
use crate::source::external::ExternalAdapter;
use crate::source::google::GoogleAdapter;
use crate::source::ical::IcalAdapter;
use crate::source::listing::ListingAdapter;
use crate::source::{FetchParams, SourceDescriptor, SourceRegistry};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EventMap {
    aggregator: Aggregator,
    parser: DateTextParser,
}

impl EventMap {
    /// Load configuration from disk and the environment, then build.
    pub fn load() -> EventMapResult<Self> {
        Self::from_config(&AppConfig::load()?)
    }

    /// Wire everything from configuration. Missing cache credentials or
    /// geocoder key degrade quietly rather than failing.
    pub fn from_config(config: &AppConfig) -> EventMapResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("eventmap/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_TIMEOUT)
            .build()?;
        let parser = DateTextParser::new(config.tz());

        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(GoogleAdapter::new(
            client.clone(),
            config.google.api_key.clone(),
        )));
        registry.register(Arc::new(IcalAdapter::new(client.clone(), parser.timezone())));
        registry.register(Arc::new(ListingAdapter::new(client.clone(), parser)));

        for name in &config.external_providers {
            match ExternalAdapter::discover(name) {
                Ok(adapter) => {
                    registry.register(Arc::new(adapter));
                }
                Err(e) => tracing::warn!(provider = %name, error = %e, "skipping external provider"),
            }
        }

        let geocoder: Option<Arc<dyn Geocoder>> = config
            .geocoder
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .map(|key| {
                let geocoder = GoogleGeocoder::new(client.clone(), key);
                let geocoder = match config.geocoder.endpoint.as_deref() {
                    Some(endpoint) => geocoder.with_endpoint(endpoint),
                    None => geocoder,
                };
                Arc::new(geocoder) as Arc<dyn Geocoder>
            });
        if geocoder.is_none() {
            tracing::debug!("no geocoder api key, locations resolve from cache only");
        }

        let cache = CacheStore::from_config(&config.cache);
        let resolver = GeocodeResolver::new(cache, geocoder)
            .with_options(ResolverOptions::from(&config.geocoder));
        let aggregator = Aggregator::new(Arc::new(registry), resolver)
            .with_concurrency(config.aggregator.concurrency);

        Ok(EventMap { aggregator, parser })
    }

    /// Build around an already assembled aggregator.
    pub fn new(aggregator: Aggregator, parser: DateTextParser) -> Self {
        EventMap { aggregator, parser }
    }

    pub fn sources(&self) -> Vec<&SourceDescriptor> {
        self.aggregator.registry().descriptors()
    }

    pub fn parser(&self) -> &DateTextParser {
        &self.parser
    }

    /// Events and metadata for a composite source id.
    pub async fn fetch(
        &self,
        composite: &str,
        params: &FetchParams,
    ) -> Result<Aggregation, AggregateError> {
        self.aggregator.fetch(composite, params).await
    }

    /// Visible events and hidden counts for a filter state.
    pub fn facets(
        &self,
        events: &[CanonicalEvent],
        state: &FilterState,
        viewport: Option<&Bounds>,
    ) -> FacetResult {
        compute_facets(events, state, viewport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sources_registered_in_order() {
        let map = EventMap::from_config(&AppConfig::default()).unwrap();
        let prefixes: Vec<_> = map.sources().iter().map(|d| d.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["google", "ical", "listing"]);
    }

    #[test]
    fn test_missing_external_provider_is_skipped() {
        let config = AppConfig {
            external_providers: vec!["definitely-not-installed-xyz".into()],
            ..AppConfig::default()
        };
        let map = EventMap::from_config(&config).unwrap();
        assert_eq!(map.sources().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_prefix_reports_prefixes() {
        let map = EventMap::from_config(&AppConfig::default()).unwrap();
        let err = map.fetch("meetup:rust-berlin", &FetchParams::default()).await.unwrap_err();
        assert_eq!(err.prefixes(), ["meetup"]);
    }
}
