//! Date range for filtering events.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Date range for filtering events.
/// None values mean unbounded in that direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        DateRange { from, to }
    }

    /// Parse CLI-style bounds into a DateRange.
    /// - `from`: "start" or omitted for unbounded, or YYYY-MM-DD
    /// - `to`: omitted for unbounded, or YYYY-MM-DD (inclusive, end of day)
    pub fn from_args(from: Option<&str>, to: Option<&str>) -> Result<Self, String> {
        let from_dt = match from {
            None | Some("start") => None,
            Some(s) => Some(parse_date_start(s)?),
        };

        let to_dt = match to {
            Some(s) => Some(parse_date_end(s)?),
            None => None,
        };

        if let (Some(f), Some(t)) = (from_dt, to_dt) {
            if f > t {
                return Err(format!(
                    "'from' ({}) is after 'to' ({})",
                    f.date_naive(),
                    t.date_naive()
                ));
            }
        }

        Ok(DateRange {
            from: from_dt,
            to: to_dt,
        })
    }

    /// True when neither side is bounded, i.e. the range filters nothing.
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Whether [start, end] intersects this range (inclusive on both ends).
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| end >= from) && self.to.is_none_or(|to| start <= to)
    }
}

/// Parse YYYY-MM-DD as start of day in UTC
fn parse_date_start(s: &str) -> Result<DateTime<Utc>, String> {
    let date = parse_date(s)?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

/// Parse YYYY-MM-DD as end of day in UTC
fn parse_date_end(s: &str) -> Result<DateTime<Utc>, String> {
    let date = parse_date(s)?;
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    Ok(date.and_time(end_of_day).and_utc())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
}
