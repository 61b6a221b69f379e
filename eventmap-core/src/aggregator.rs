//! Fan-out over a composite source id, merge, then geocode.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::constants::DEFAULT_FETCH_CONCURRENCY;
use crate::error::{AggregateError, EventMapResult, PieceError};
use crate::event::CanonicalEvent;
use crate::geocode::GeocodeResolver;
use crate::source::{FetchParams, FetchStatus, SourceFetch, SourceRegistry, split_source_id};

/// What one successfully fetched piece contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceMetadata {
    pub source_id: String,
    pub source_index: usize,
    pub prefix: String,
    pub display_name: String,
    pub homepage_url: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub status: FetchStatus,
    pub event_count: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateMetadata {
    pub sources: Vec<PieceMetadata>,
    pub errors: Vec<PieceError>,
}

/// The merged result of one aggregation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregation {
    pub events: Vec<CanonicalEvent>,
    pub metadata: AggregateMetadata,
}

/// Split a composite id on commas; pieces are trimmed and blanks dropped.
pub fn split_composite(composite: &str) -> Vec<String> {
    composite
        .split(',')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct Aggregator {
    registry: Arc<SourceRegistry>,
    resolver: GeocodeResolver,
    concurrency: usize,
}

impl Aggregator {
    pub fn new(registry: Arc<SourceRegistry>, resolver: GeocodeResolver) -> Self {
        Aggregator {
            registry,
            resolver,
            concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Fetch every piece of `composite`, merge the results and attach
    /// resolved locations.
    ///
    /// A failing piece is recorded in `metadata.errors` and the rest carry on.
    /// The run only fails when no piece could be fetched at all.
    pub async fn fetch(
        &self,
        composite: &str,
        params: &FetchParams,
    ) -> Result<Aggregation, AggregateError> {
        let pieces = split_composite(composite);
        if pieces.is_empty() {
            return Err(AggregateError::EmptySourceId);
        }

        let prefixes = unique_prefixes(&pieces);
        if pieces.iter().all(|piece| self.registry.resolve(piece).is_none()) {
            tracing::warn!(prefixes = ?prefixes, "no supported source in composite id");
            return Err(AggregateError::UnsupportedSources { prefixes });
        }

        // `buffered` keeps piece order, so merged ids and metadata are deterministic
        let results: Vec<(usize, &String, EventMapResult<SourceFetch>)> =
            stream::iter(pieces.iter().enumerate())
                .map(|(index, piece)| async move {
                    (index, piece, self.registry.fetch(piece, params).await)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut aggregation = Aggregation::default();
        let mut emitted: HashSet<String> = HashSet::new();

        for (index, piece, result) in results {
            let prefix = split_source_id(piece).0.to_string();
            let fetch = match result {
                Ok(fetch) => fetch,
                Err(e) => {
                    tracing::warn!(source = %piece, error = %e, "source piece failed");
                    aggregation.metadata.errors.push(PieceError {
                        source_id: piece.clone(),
                        source_index: index,
                        prefix,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            let descriptor = self.registry.resolve(piece).map(|a| a.descriptor().clone());
            aggregation.metadata.sources.push(PieceMetadata {
                source_id: piece.clone(),
                source_index: index,
                display_name: descriptor
                    .as_ref()
                    .map(|d| d.display_name.clone())
                    .unwrap_or_else(|| prefix.clone()),
                homepage_url: descriptor.and_then(|d| d.homepage_url),
                prefix,
                title: fetch.metadata.title,
                url: fetch.metadata.url,
                status: fetch.metadata.status,
                event_count: fetch.events.len(),
                warnings: fetch.metadata.warnings,
            });

            for mut event in fetch.events {
                event.source_index = index;
                event.id = claim_id(&mut emitted, index, event.id);
                aggregation.events.push(event);
            }
        }

        if aggregation.metadata.sources.is_empty() {
            return Err(AggregateError::AllSourcesFailed {
                prefixes,
                errors: aggregation.metadata.errors,
            });
        }

        aggregation.events.sort_by_key(|event| event.start);
        self.attach_locations(&mut aggregation.events).await;

        tracing::info!(
            pieces = pieces.len(),
            failed = aggregation.metadata.errors.len(),
            events = aggregation.events.len(),
            "aggregated sources"
        );
        Ok(aggregation)
    }

    /// Resolve every distinct location text once and attach the result to all
    /// events carrying exactly that text.
    async fn attach_locations(&self, events: &mut [CanonicalEvent]) {
        let texts: Vec<String> = events.iter().map(|e| e.raw_location_text.clone()).collect();
        let resolved = self.resolver.resolve_map(&texts).await;
        for event in events.iter_mut() {
            if let Some(location) = resolved.get(&event.raw_location_text) {
                event.resolved_location = Some(location.clone());
            }
        }
    }
}

/// Reserve `id` in the merged set. A taken id becomes `<index>:<id>`, with a
/// `#<n>` counter appended if even that is taken.
fn claim_id(emitted: &mut HashSet<String>, index: usize, id: String) -> String {
    if emitted.insert(id.clone()) {
        return id;
    }
    let namespaced = format!("{index}:{id}");
    let mut candidate = namespaced.clone();
    let mut n = 2;
    while !emitted.insert(candidate.clone()) {
        candidate = format!("{namespaced}#{n}");
        n += 1;
    }
    candidate
}

fn unique_prefixes(pieces: &[String]) -> Vec<String> {
    let mut prefixes: Vec<String> = Vec::new();
    for piece in pieces {
        let prefix = split_source_id(piece).0.to_string();
        if !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }
    prefixes
}
