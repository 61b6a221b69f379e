//! Event sources.
//!
//! A source is addressed as `"<prefix>:<rest>"`; the prefix picks a
//! [`SourceAdapter`] from the [`SourceRegistry`] and the rest is handed to it
//! verbatim (a calendar id, a feed URL, a file path...).
//!
//! Adapters absorb partial upstream failure themselves: they return whatever
//! events they could build and flag the fetch as [`FetchStatus::Partial`].
//! Returning `Err` means nothing usable came back.

pub mod external;
pub mod google;
pub mod ical;
pub mod listing;
pub mod protocol;
mod registry;

pub use registry::{SourceRegistry, split_source_id};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::date_range::DateRange;
use crate::error::EventMapResult;
use crate::event::CanonicalEvent;

/// Identifies one kind of source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub prefix: String,
    pub display_name: String,
    pub homepage_url: Option<String>,
}

impl SourceDescriptor {
    pub fn new(prefix: &str, display_name: &str, homepage_url: Option<&str>) -> Self {
        SourceDescriptor {
            prefix: prefix.to_string(),
            display_name: display_name.to_string(),
            homepage_url: homepage_url.map(str::to_string),
        }
    }
}

/// Optional time window for a fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchParams {
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
}

impl FetchParams {
    pub fn new(time_min: Option<DateTime<Utc>>, time_max: Option<DateTime<Utc>>) -> Self {
        FetchParams { time_min, time_max }
    }

    pub fn window(&self) -> DateRange {
        DateRange::new(self.time_min, self.time_max)
    }

    pub fn admits(&self, event: &CanonicalEvent) -> bool {
        self.window().overlaps(event.start, event.end)
    }
}

impl From<DateRange> for FetchParams {
    fn from(range: DateRange) -> Self {
        FetchParams::new(range.from, range.to)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    #[default]
    Complete,
    /// Some upstream records or pages could not be read
    Partial,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    /// Upstream name of the calendar or listing, if it has one
    pub title: Option<String>,
    pub url: Option<String>,
    pub status: FetchStatus,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// What one adapter produced for one source id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFetch {
    pub events: Vec<CanonicalEvent>,
    pub metadata: SourceMetadata,
}

impl SourceFetch {
    /// Record a recoverable problem; the fetch becomes partial.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(warning = %message, "source warning");
        self.metadata.warnings.push(message);
        self.metadata.status = FetchStatus::Partial;
    }

    /// Drop events outside the requested window.
    pub fn retain_window(&mut self, params: &FetchParams) {
        self.events.retain(|event| params.admits(event));
    }
}

/// The capability every source type implements.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Fetch events for `id`, the part of the source id after the prefix.
    async fn fetch(&self, id: &str, params: &FetchParams) -> EventMapResult<SourceFetch>;
}

/// Wall-clock time in `tz` as an instant; times skipped by DST move forward an hour.
pub(crate) fn local_to_utc(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + chrono::Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Whether `rest` names a remote document rather than a local file.
pub(crate) fn is_remote(rest: &str) -> bool {
    let lower = rest.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("webcal://")
}

/// `webcal://` is plain https in disguise.
pub(crate) fn http_url(rest: &str) -> String {
    match rest.get(..9) {
        Some(scheme) if scheme.eq_ignore_ascii_case("webcal://") => format!("https://{}", &rest[9..]),
        _ => rest.to_string(),
    }
}
