//! Faceted filtering over one event set.
//!
//! Every call to [`FacetFilter::get_visible`] recomputes from scratch. Each
//! hidden count is the number of events in the FULL set that its facet alone
//! rejects, so counts from different facets overlap and do not add up to the
//! number of hidden events. UI chips rely on this, one per facet.

mod bounds;
mod state;

pub use bounds::Bounds;
pub use state::FilterState;

use serde::Serialize;

use crate::date_range::DateRange;
use crate::event::CanonicalEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenCounts {
    pub by_date: usize,
    pub by_search: usize,
    pub by_map: usize,
    pub by_unknown_locations: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetResult {
    pub visible_events: Vec<CanonicalEvent>,
    pub hidden_counts: HiddenCounts,
}

/// Holds an event set and the filters applied to it.
#[derive(Debug, Clone, Default)]
pub struct FacetFilter {
    events: Vec<CanonicalEvent>,
    state: FilterState,
}

impl FacetFilter {
    pub fn new(events: Vec<CanonicalEvent>) -> Self {
        FacetFilter {
            events,
            state: FilterState::default(),
        }
    }

    pub fn events(&self) -> &[CanonicalEvent] {
        &self.events
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Swap in a new event set, keeping the current filters.
    pub fn set_events(&mut self, events: Vec<CanonicalEvent>) {
        self.events = events;
    }

    /// Start a new session: new events, no filters.
    pub fn reset(&mut self, events: Vec<CanonicalEvent>) {
        self.events = events;
        self.state = FilterState::default();
    }

    pub fn clear_filters(&mut self) {
        self.state = FilterState::default();
    }

    pub fn set_date_range(&mut self, range: Option<DateRange>) {
        self.state.date_range = range;
    }

    pub fn set_search_query(&mut self, query: Option<String>) {
        self.state.search_query = query;
    }

    pub fn set_map_bounds(&mut self, bounds: Option<Bounds>) {
        self.state.map_bounds = bounds;
    }

    pub fn set_unknown_locations_only(&mut self, only: bool) {
        self.state.unknown_locations_only = only;
    }

    /// Visible events and per-facet hidden counts. `viewport`, when given,
    /// stands in for the stored map bounds for this call only.
    pub fn get_visible(&self, viewport: Option<&Bounds>) -> FacetResult {
        compute_facets(&self.events, &self.state, viewport)
    }
}

/// Filter `events` by `state` without holding any session.
pub fn compute_facets(
    events: &[CanonicalEvent],
    state: &FilterState,
    viewport: Option<&Bounds>,
) -> FacetResult {
    let date_range = state.active_date_range();
    let needle = state.needle();
    let bounds = viewport.or(state.map_bounds.as_ref());
    let unknown_only = state.unknown_locations_only;

    let mut result = FacetResult::default();
    for event in events {
        let in_date = date_range.is_none_or(|range| date_overlap(event, range));
        let in_search = needle.as_deref().is_none_or(|needle| search_match(event, needle));
        let in_map = bounds.is_none_or(|bounds| bounds_contains(event, bounds));
        let in_unknown = !unknown_only || lacks_location(event);

        let counts = &mut result.hidden_counts;
        counts.by_date += usize::from(!in_date);
        counts.by_search += usize::from(!in_search);
        counts.by_map += usize::from(!in_map);
        counts.by_unknown_locations += usize::from(!in_unknown);

        if in_date && in_search && in_map && in_unknown {
            result.visible_events.push(event.clone());
        }
    }

    tracing::trace!(
        total = events.len(),
        visible = result.visible_events.len(),
        "computed facets"
    );
    result
}

fn date_overlap(event: &CanonicalEvent, range: &DateRange) -> bool {
    range.overlaps(event.start, event.end)
}

/// `needle` is already lowercased.
fn search_match(event: &CanonicalEvent, needle: &str) -> bool {
    [&event.name, &event.raw_location_text, &event.description]
        .into_iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Events without coordinates fall outside every box.
fn bounds_contains(event: &CanonicalEvent, bounds: &Bounds) -> bool {
    event
        .coordinates()
        .is_some_and(|(lat, lng)| bounds.contains(lat, lng))
}

fn lacks_location(event: &CanonicalEvent) -> bool {
    event.coordinates().is_none()
}
