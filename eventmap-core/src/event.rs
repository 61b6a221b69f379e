//! Source-agnostic event types.
//!
//! Adapters convert their upstream records into these types, and everything
//! downstream (aggregation, geocoding, filtering) works exclusively with them.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A normalized event (source-agnostic)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    /// Unique within the source that produced it
    pub id: String,
    pub name: String,
    pub description: String,
    /// http(s) links found in the description
    #[serde(default)]
    pub description_urls: Vec<String>,
    /// Where the event can be viewed upstream
    pub original_url: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// IANA zone the source reported for this event, if any
    pub timezone_hint: Option<String>,
    /// Location exactly as the source wrote it
    pub raw_location_text: String,
    pub resolved_location: Option<ResolvedLocation>,
    /// Position of the producing piece within the composite source id
    #[serde(default)]
    pub source_index: usize,
}

impl CanonicalEvent {
    /// Build an event with the required fields; `end` is clamped so it never
    /// precedes `start`.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        CanonicalEvent {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            description_urls: Vec::new(),
            original_url: None,
            start,
            end: end.max(start),
            timezone_hint: None,
            raw_location_text: String::new(),
            resolved_location: None,
            source_index: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self.description_urls = extract_urls(&self.description);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.raw_location_text = location.into();
        self
    }

    pub fn with_original_url(mut self, url: Option<String>) -> Self {
        self.original_url = url.filter(|u| !u.is_empty());
        self
    }

    pub fn with_timezone_hint(mut self, tz: Option<String>) -> Self {
        self.timezone_hint = tz.filter(|t| !t.is_empty());
        self
    }

    /// Coordinates, if the location was resolved.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.resolved_location.as_ref().and_then(|l| l.coordinates())
    }

    /// Whether [start, end] intersects the given window. Unbounded sides always pass.
    pub fn overlaps(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
        from.is_none_or(|from| self.end >= from) && to.is_none_or(|to| self.start <= to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    Resolved,
    Unresolved,
    /// No geocoder was available to answer yet
    Pending,
}

/// The geocoding outcome for one location text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub original_location_text: String,
    pub formatted_address: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub status: LocationStatus,
}

impl ResolvedLocation {
    /// A successful lookup. Non-finite coordinates are downgraded to unresolved.
    pub fn resolved(text: &str, formatted_address: Option<String>, lat: f64, lng: f64) -> Self {
        if !lat.is_finite() || !lng.is_finite() {
            return Self::unresolved(text);
        }
        ResolvedLocation {
            original_location_text: text.to_string(),
            formatted_address,
            lat: Some(lat),
            lng: Some(lng),
            status: LocationStatus::Resolved,
        }
    }

    pub fn unresolved(text: &str) -> Self {
        Self::without_coordinates(text, LocationStatus::Unresolved)
    }

    pub fn pending(text: &str) -> Self {
        Self::without_coordinates(text, LocationStatus::Pending)
    }

    fn without_coordinates(text: &str, status: LocationStatus) -> Self {
        ResolvedLocation {
            original_location_text: text.to_string(),
            formatted_address: None,
            lat: None,
            lng: None,
            status,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.coordinates().is_some()
    }

    /// `(lat, lng)` when the status is resolved and both values are finite.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.status, self.lat, self.lng) {
            (LocationStatus::Resolved, Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => {
                Some((lat, lng))
            }
            _ => None,
        }
    }

    /// Whether the record satisfies the resolved ⇒ coordinates invariant.
    pub fn is_consistent(&self) -> bool {
        self.status != LocationStatus::Resolved || self.coordinates().is_some()
    }
}

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("static regex"));

/// Pull http(s) links out of free text, in order, without duplicates.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in URL_RE.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':']).to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}
