//! Event aggregation, location resolution and faceted filtering.
//!
//! This crate turns heterogeneous calendar and listing feeds into one
//! canonical event set:
//! - `source` adapters fetch and normalize upstream records
//! - `date_text` reads human-written date ranges ("Mondays (9pm-2am)")
//! - `geocode` resolves location text to coordinates through `cache`
//! - `aggregator` merges a comma-joined composite source id
//! - `filter` computes visible events and per-facet hidden counts

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod constants;
pub mod date_range;
pub mod date_text;
pub mod error;
pub mod event;
pub mod eventmap;
pub mod filter;
pub mod geocode;
pub mod source;

pub use aggregator::{AggregateMetadata, Aggregation, Aggregator, PieceMetadata};
pub use config::AppConfig;
pub use date_range::DateRange;
pub use date_text::{DateTextParser, ParsedRange};
pub use error::{AggregateError, EventMapError, EventMapResult, PieceError};
pub use event::{CanonicalEvent, LocationStatus, ResolvedLocation};
pub use eventmap::EventMap;
pub use filter::{Bounds, FacetFilter, FacetResult, FilterState, HiddenCounts};
pub use source::{FetchParams, FetchStatus, SourceDescriptor};
