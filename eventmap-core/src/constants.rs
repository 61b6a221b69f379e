use std::time::Duration;

/// Fallback length of an event whose end time is unknown.
pub const DEFAULT_EVENT_HOURS: i64 = 4;

/// Cache entries written without an explicit TTL live this long (30 days).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Geocoding results that resolved to coordinates.
pub const GEOCODE_RESOLVED_TTL_SECS: u64 = 90 * 24 * 60 * 60;

/// Texts the provider answered with "no results" are retried after a day.
pub const GEOCODE_NOT_FOUND_TTL_SECS: u64 = 24 * 60 * 60;

/// Transient geocoding failures are retried after an hour.
pub const GEOCODE_FAILURE_TTL_SECS: u64 = 60 * 60;

pub const GEOCODE_CACHE_PREFIX: &str = "geocode";

pub const DEFAULT_GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_GEOCODE_CONCURRENCY: usize = 4;

pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Window used by adapters that must expand recurrences when the caller
/// gives no upper bound.
pub const DEFAULT_WINDOW_DAYS: i64 = 90;

pub const DEFAULT_CACHE_NAMESPACE: &str = "eventmap";
