//! Error types for the eventmap ecosystem.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur in eventmap operations.
#[derive(Error, Debug)]
pub enum EventMapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Geocoding error: {0}")]
    Geocode(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Unsupported source type '{0}'")]
    UnsupportedSource(String),

    #[error("Provider '{0}' not found in PATH")]
    ProviderNotInstalled(String),

    #[error("Provider request timed out after {0}s")]
    ProviderTimeout(u64),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventMapError {
    fn from(e: serde_json::Error) -> Self {
        EventMapError::Serialization(e.to_string())
    }
}

/// Result type alias for eventmap operations.
pub type EventMapResult<T> = Result<T, EventMapError>;

/// A single composite-source piece that could not be fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceError {
    pub source_id: String,
    pub source_index: usize,
    pub prefix: String,
    pub message: String,
}

/// Hard failures surfaced by an aggregation run.
///
/// Everything else (a single failing piece, cache outages, geocoding misses)
/// is reported as data in the aggregation metadata instead.
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("No source ids given")]
    EmptySourceId,

    #[error("Unsupported source type(s): {}", prefixes.join(", "))]
    UnsupportedSources { prefixes: Vec<String> },

    #[error("All sources failed: {}", prefixes.join(", "))]
    AllSourcesFailed {
        prefixes: Vec<String>,
        errors: Vec<PieceError>,
    },
}

impl AggregateError {
    /// Source-type prefixes the failed run attempted, for user-facing messages.
    pub fn prefixes(&self) -> &[String] {
        match self {
            AggregateError::EmptySourceId => &[],
            AggregateError::UnsupportedSources { prefixes }
            | AggregateError::AllSourcesFailed { prefixes, .. } => prefixes,
        }
    }
}
