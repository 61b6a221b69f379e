use serde::{Deserialize, Serialize};

use super::bounds::Bounds;
use crate::date_range::DateRange;

/// The active filters of one filtering session. Unset fields are inactive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub date_range: Option<DateRange>,
    pub search_query: Option<String>,
    pub map_bounds: Option<Bounds>,
    pub unknown_locations_only: bool,
}

impl FilterState {
    /// The trimmed, lowercased query, or `None` when it would match everything.
    pub(crate) fn needle(&self) -> Option<String> {
        self.search_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }

    /// A date range with neither side bounded filters nothing.
    pub(crate) fn active_date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref().filter(|r| !r.is_unbounded())
    }

    pub fn is_empty(&self) -> bool {
        self.active_date_range().is_none()
            && self.needle().is_none()
            && self.map_bounds.is_none()
            && !self.unknown_locations_only
    }
}
