//! Human-readable date/time-range text → canonical instants.
//!
//! Listings written by people describe times as "Saturday: March 22 (7pm-10pm)"
//! or "2nd/4th Tuesdays (7-9pm)". [`DateTextParser`] tries each supported
//! grammar in priority order and never fails: text it cannot read becomes a
//! four-hour slot starting now, flagged non-recurring.

mod clock;
mod grammar;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_EVENT_HOURS;

/// The outcome of parsing one piece of date text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// True when the text named weekdays rather than a calendar date
    pub recurring: bool,
}

impl ParsedRange {
    fn new(start: DateTime<Utc>, end: DateTime<Utc>, recurring: bool) -> Self {
        ParsedRange { start, end, recurring }
    }

    /// The result for text that could not be read.
    pub fn fallback(now: DateTime<Utc>) -> Self {
        ParsedRange::new(now, now + Duration::hours(DEFAULT_EVENT_HOURS), false)
    }
}

/// "Now" as seen from the zone the text was written in.
pub(crate) struct Clock<'a> {
    tz: &'a Tz,
    now: DateTime<Utc>,
}

impl Clock<'_> {
    fn today(&self) -> NaiveDate {
        self.now.with_timezone(self.tz).date_naive()
    }

    /// The instant of a wall-clock time. Times skipped by a DST jump are
    /// moved forward an hour; ambiguous ones take the earlier instant.
    fn instant(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        let local = date.and_time(time);
        self.tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| self.tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Start/end instants for a time range on `date`. An end clock earlier
    /// than the start crosses midnight; a missing or identical end falls back
    /// to the default event length.
    fn interval(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        end: Option<NaiveTime>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start_at = self.instant(date, start)?;
        let default_end = start_at + Duration::hours(DEFAULT_EVENT_HOURS);
        let end_at = match end {
            None => default_end,
            Some(end) if end == start => default_end,
            Some(end) if end < start => self.instant(date.succ_opt()?, end)?,
            Some(end) => self.instant(date, end)?,
        };
        Some((start_at, if end_at > start_at { end_at } else { default_end }))
    }
}

type Matcher = fn(&str, &Clock<'_>) -> Option<ParsedRange>;

/// Grammars in priority order; the first match wins.
const MATCHERS: [(&str, Matcher); 4] = [
    ("single_day", grammar::single_day),
    ("multi_day", grammar::multi_day),
    ("weekly", grammar::weekly),
    ("monthly_nth", grammar::monthly_nth),
];

/// Parses date text written in a given time zone.
#[derive(Debug, Clone, Copy)]
pub struct DateTextParser {
    tz: Tz,
}

impl Default for DateTextParser {
    fn default() -> Self {
        DateTextParser { tz: Tz::UTC }
    }
}

impl DateTextParser {
    pub fn new(tz: Tz) -> Self {
        DateTextParser { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn parse(&self, text: &str) -> ParsedRange {
        self.parse_at(text, Utc::now())
    }

    /// Parse relative to an explicit "now".
    pub fn parse_at(&self, text: &str, now: DateTime<Utc>) -> ParsedRange {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return ParsedRange::fallback(now);
        }

        let clock = Clock { tz: &self.tz, now };
        for (name, matcher) in MATCHERS {
            if let Some(parsed) = matcher(&normalized, &clock) {
                tracing::trace!(grammar = name, text = %normalized, "parsed date text");
                return parsed;
            }
        }

        tracing::debug!(text = %normalized, "unrecognized date text, using fallback");
        ParsedRange::fallback(now)
    }

    /// Parse an arbitrary JSON value; anything but a string yields the fallback.
    pub fn parse_value(&self, value: &serde_json::Value) -> ParsedRange {
        self.parse_value_at(value, Utc::now())
    }

    pub fn parse_value_at(&self, value: &serde_json::Value, now: DateTime<Utc>) -> ParsedRange {
        match value.as_str() {
            Some(text) => self.parse_at(text, now),
            None => ParsedRange::fallback(now),
        }
    }
}

/// Parse date text written in UTC.
pub fn parse(text: &str) -> ParsedRange {
    DateTextParser::default().parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Wednesday, 2025-03-19 12:00 UTC
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 19, 12, 0, 0).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn parse(text: &str) -> ParsedRange {
        DateTextParser::default().parse_at(text, now())
    }

    #[test]
    fn test_single_day_with_time_range() {
        let parsed = parse("Saturday: March 22 (7pm-10pm)");
        assert_eq!(parsed.start, utc(2025, 3, 22, 19, 0));
        assert_eq!(parsed.end, utc(2025, 3, 22, 22, 0));
        assert!(!parsed.recurring);
    }

    #[test]
    fn test_single_day_past_date_rolls_to_next_year() {
        let parsed = parse("Friday: March 14 (8pm)");
        assert_eq!(parsed.start, utc(2026, 3, 14, 20, 0));
        assert_eq!(parsed.end, utc(2026, 3, 15, 0, 0));
    }

    #[test]
    fn test_single_day_explicit_year_crossing_midnight() {
        let parsed = parse("Saturday: March 22, 2025 (10pm-1am)");
        assert_eq!(parsed.start, utc(2025, 3, 22, 22, 0));
        assert_eq!(parsed.end, utc(2025, 3, 23, 1, 0));
        assert_eq!(parsed.end.date_naive(), parsed.start.date_naive().succ_opt().unwrap());
    }

    #[test]
    fn test_single_day_without_times_is_all_day() {
        let parsed = parse("Sunday: April 6");
        assert_eq!(parsed.start, utc(2025, 4, 6, 0, 0));
        assert_eq!(parsed.end, utc(2025, 4, 7, 0, 0));
    }

    #[test]
    fn test_multi_day_rolls_into_next_year() {
        let parsed =
            parse("Tuesday: December 30-Thursday: January 1 (Tuesday: 6pm-Thursday: 2am)");
        assert_eq!(parsed.start, utc(2025, 12, 30, 18, 0));
        assert_eq!(parsed.end, utc(2026, 1, 1, 2, 0));
        assert!(!parsed.recurring);
    }

    #[test]
    fn test_multi_day_same_month() {
        let parsed = parse("Friday: May 2-Sunday: May 4 (Friday: 5pm-Sunday: 11pm)");
        assert_eq!(parsed.start, utc(2025, 5, 2, 17, 0));
        assert_eq!(parsed.end, utc(2025, 5, 4, 23, 0));
    }

    #[test]
    fn test_weekly_crosses_midnight() {
        let parsed = parse("Mondays (9:30pm-2:30am)");
        assert!(parsed.recurring);
        assert_eq!(parsed.start, utc(2025, 3, 24, 21, 30));
        assert_eq!(parsed.end, utc(2025, 3, 25, 2, 30));
    }

    #[test]
    fn test_weekly_today_later_counts_as_next() {
        // It is noon on Wednesday; 7pm today is still ahead
        let parsed = parse("Wednesdays (7pm-9pm)");
        assert_eq!(parsed.start, utc(2025, 3, 19, 19, 0));
        // 11am has already passed, so the next one is a week out
        let parsed = parse("Wednesdays (11am)");
        assert_eq!(parsed.start, utc(2025, 3, 26, 11, 0));
    }

    #[test]
    fn test_weekly_list_picks_soonest() {
        let parsed = parse("Tuesdays & Fridays (8pm)");
        assert_eq!(parsed.start, utc(2025, 3, 21, 20, 0));
    }

    #[test]
    fn test_monthly_compound_picks_soonest_future_candidate() {
        // March 2025: 2nd Tuesday is the 11th (past), 4th is the 25th
        let parsed = parse("2nd/4th Tuesdays (7pm-9pm)");
        assert!(parsed.recurring);
        assert_eq!(parsed.start, utc(2025, 3, 25, 19, 0));
        assert_eq!(parsed.end, utc(2025, 3, 25, 21, 0));
    }

    #[test]
    fn test_monthly_rolls_to_next_month() {
        let parsed = parse("1st Saturday (8pm)");
        assert_eq!(parsed.start, utc(2025, 4, 5, 20, 0));
        assert_eq!(parsed.end, utc(2025, 4, 6, 0, 0));
    }

    #[test]
    fn test_timezone_is_applied() {
        let parser = DateTextParser::new(chrono_tz::America::New_York);
        let parsed = parser.parse_at("Saturday: March 22, 2025 (7pm-10pm)", now());
        assert_eq!(parsed.start, utc(2025, 3, 22, 23, 0));
        assert_eq!(parsed.end, utc(2025, 3, 23, 2, 0));
    }

    #[test]
    fn test_fallback_for_unreadable_input() {
        for text in ["", "   ", "sometime soon", "Saturday: Smarch 40 (7pm)", "Mondays (late)"] {
            let parsed = parse(text);
            assert_eq!(parsed, ParsedRange::fallback(now()), "input: {text:?}");
            assert!(parsed.end > parsed.start);
        }
    }

    #[test]
    fn test_fallback_for_non_string_values() {
        let parser = DateTextParser::default();
        for value in [json!(null), json!(42), json!({"when": "Mondays (7pm)"}), json!("")] {
            let parsed = parser.parse_value_at(&value, now());
            assert_eq!(parsed, ParsedRange::fallback(now()));
            assert!(!parsed.recurring);
        }
    }

    #[test]
    fn test_equal_clock_values_use_default_length() {
        let parsed = parse("Saturday: March 22 (7pm-7pm)");
        assert_eq!(parsed.end - parsed.start, Duration::hours(DEFAULT_EVENT_HOURS));
    }
}
