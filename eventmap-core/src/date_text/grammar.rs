//! The supported date-text grammars. Each matcher returns `None` when the
//! text is not in its shape (or names an impossible date), so the caller can
//! move on to the next one.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

use super::clock;
use super::{Clock, ParsedRange};

static SINGLE_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?P<wd>[a-z]+)\.?:\s*)?(?P<mon>[a-z]+)\.?\s+(?P<day>\d{1,2})(?:st|nd|rd|th)?(?:,?\s*(?P<year>\d{4}))?\s*(?:\((?P<times>[^)]*)\))?$",
    )
    .expect("static regex")
});

static MULTI_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?P<wda>[a-z]+)\.?:\s*)?(?P<mona>[a-z]+)\.?\s+(?P<daya>\d{1,2})(?:st|nd|rd|th)?\s*[-–—]\s*(?:(?P<wdb>[a-z]+)\.?:\s*)?(?P<monb>[a-z]+)\.?\s+(?P<dayb>\d{1,2})(?:st|nd|rd|th)?\s*\((?P<times>[^)]*)\)$",
    )
    .expect("static regex")
});

static WEEKLY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:every\s+)?(?P<days>[a-z][a-z\s,&/.]*?)\s*\((?P<times>[^)]*)\)$")
        .expect("static regex")
});

static MONTHLY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:every\s+)?(?P<nths>(?:1st|2nd|3rd|4th|5th|last)(?:\s*(?:/|,|&|and)\s*(?:1st|2nd|3rd|4th|5th|last))*)\s+(?P<days>[a-z][a-z\s,&/.]*?)\s*\((?P<times>[^)]*)\)$",
    )
    .expect("static regex")
});

static LIST_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:,|&|/|\band\b)\s*").expect("static regex"));

static DAY_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z]+\.?:\s*").expect("static regex"));

/// How many years ahead a month/day without a year may land (covers Feb 29).
const YEAR_SEARCH_LIMIT: i32 = 8;

/// How many months ahead an nth-weekday pattern is searched.
const MONTH_SEARCH_LIMIT: u32 = 14;

/// `<Weekday>: <Month> <Day>[, <Year>] (<Start>[-<End>])`
pub(crate) fn single_day(text: &str, clock: &Clock<'_>) -> Option<ParsedRange> {
    let caps = SINGLE_DAY_RE.captures(text)?;
    if let Some(wd) = caps.name("wd") {
        parse_weekday(wd.as_str())?;
    }
    let month = parse_month(caps.name("mon")?.as_str())?;
    let day: u32 = caps.name("day")?.as_str().parse().ok()?;

    let date = match caps.name("year") {
        Some(year) => NaiveDate::from_ymd_opt(year.as_str().parse().ok()?, month, day)?,
        None => next_month_day(clock.today(), month, day)?,
    };

    let (start, end) = match caps.name("times") {
        Some(times) => {
            let (start_time, end_time) = clock::parse_range(times.as_str())?;
            clock.interval(date, start_time, end_time)?
        }
        None => {
            let start = clock.instant(date, NaiveTime::MIN)?;
            let end = clock.instant(date.succ_opt()?, NaiveTime::MIN)?;
            (start, end)
        }
    };

    Some(ParsedRange::new(start, end, false))
}

/// `<WkA>: <MonA> <DayA>-<WkB>: <MonB> <DayB> (<WkA>: <TA>-<WkB>: <TB>)`
pub(crate) fn multi_day(text: &str, clock: &Clock<'_>) -> Option<ParsedRange> {
    let caps = MULTI_DAY_RE.captures(text)?;
    for label in ["wda", "wdb"] {
        if let Some(wd) = caps.name(label) {
            parse_weekday(wd.as_str())?;
        }
    }

    let month_a = parse_month(caps.name("mona")?.as_str())?;
    let day_a: u32 = caps.name("daya")?.as_str().parse().ok()?;
    let month_b = parse_month(caps.name("monb")?.as_str())?;
    let day_b: u32 = caps.name("dayb")?.as_str().parse().ok()?;

    let date_a = next_month_day(clock.today(), month_a, day_a)?;
    // The second date rolls into the following year when it falls earlier in the calendar
    let year_b = if (month_b, day_b) < (month_a, day_a) {
        date_a.year() + 1
    } else {
        date_a.year()
    };
    let date_b = NaiveDate::from_ymd_opt(year_b, month_b, day_b)?;

    let (start_text, end_text) = clock::split_range(caps.name("times")?.as_str());
    let start_text = strip_day_label(start_text);
    let end_text = strip_day_label(end_text?);
    let (start_time, end_time) = clock::parse_parts(start_text, Some(end_text))?;

    let start = clock.instant(date_a, start_time)?;
    let end = clock.instant(date_b, end_time?)?;
    if end < start {
        return None;
    }

    Some(ParsedRange::new(start, end, false))
}

/// `<Weekdays> (<Start>[-<End>])` - the next future occurrence of any listed weekday.
pub(crate) fn weekly(text: &str, clock: &Clock<'_>) -> Option<ParsedRange> {
    let caps = WEEKLY_RE.captures(text)?;
    let weekdays = parse_weekday_list(caps.name("days")?.as_str())?;
    let (start_time, end_time) = clock::parse_range(caps.name("times")?.as_str())?;

    let today = clock.today();
    weekdays
        .iter()
        .filter_map(|&weekday| {
            (0..=7)
                .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
                .filter(|date| date.weekday() == weekday)
                .filter_map(|date| clock.interval(date, start_time, end_time))
                .find(|(start, _)| *start > clock.now)
        })
        .min_by_key(|(start, _)| *start)
        .map(|(start, end)| ParsedRange::new(start, end, true))
}

/// `<1st|2nd|3rd|4th>[/<nth>] <Weekdays> (...)` - the soonest future candidate
/// across every listed ordinal and weekday.
pub(crate) fn monthly_nth(text: &str, clock: &Clock<'_>) -> Option<ParsedRange> {
    let caps = MONTHLY_RE.captures(text)?;
    let nths = LIST_SEPARATOR_RE
        .split(caps.name("nths")?.as_str())
        .map(Nth::parse)
        .collect::<Option<Vec<_>>>()?;
    let weekdays = parse_weekday_list(caps.name("days")?.as_str())?;
    let (start_time, end_time) = clock::parse_range(caps.name("times")?.as_str())?;

    let today = clock.today();
    let mut best: Option<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> = None;

    for nth in &nths {
        for &weekday in &weekdays {
            let candidate = months_from(today)
                .filter_map(|(year, month)| nth.date_in(year, month, weekday))
                .filter(|date| *date >= today)
                .filter_map(|date| clock.interval(date, start_time, end_time))
                .find(|(start, _)| *start > clock.now);

            if let Some(candidate) = candidate {
                if best.is_none_or(|(best_start, _)| candidate.0 < best_start) {
                    best = Some(candidate);
                }
            }
        }
    }

    best.map(|(start, end)| ParsedRange::new(start, end, true))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nth {
    Ordinal(u8),
    Last,
}

impl Nth {
    fn parse(s: &str) -> Option<Nth> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1st" => Some(Nth::Ordinal(1)),
            "2nd" => Some(Nth::Ordinal(2)),
            "3rd" => Some(Nth::Ordinal(3)),
            "4th" => Some(Nth::Ordinal(4)),
            "5th" => Some(Nth::Ordinal(5)),
            "last" => Some(Nth::Last),
            _ => None,
        }
    }

    fn date_in(self, year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
        match self {
            Nth::Ordinal(n) => NaiveDate::from_weekday_of_month_opt(year, month, weekday, n),
            Nth::Last => NaiveDate::from_weekday_of_month_opt(year, month, weekday, 5)
                .or_else(|| NaiveDate::from_weekday_of_month_opt(year, month, weekday, 4)),
        }
    }
}

/// `(year, month)` pairs starting with the month containing `from`.
fn months_from(from: NaiveDate) -> impl Iterator<Item = (i32, u32)> {
    let (year, month0) = (from.year(), from.month0());
    (0..MONTH_SEARCH_LIMIT).map(move |offset| {
        let total = month0 + offset;
        (year + (total / 12) as i32, total % 12 + 1)
    })
}

/// The first date on or after `today` with the given month and day.
fn next_month_day(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    (today.year()..=today.year() + YEAR_SEARCH_LIMIT)
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .find(|date| *date >= today)
}

fn strip_day_label(s: &str) -> &str {
    match DAY_LABEL_RE.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    }
}

/// Full or abbreviated month name (at least three letters).
fn parse_month(s: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let word = s.trim().trim_end_matches('.').to_ascii_lowercase();
    if word.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|name| name.starts_with(&word))
        .map(|i| i as u32 + 1)
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    let word = s.trim().trim_end_matches('.').to_ascii_lowercase();
    let weekday = match word.as_str() {
        "mon" | "mons" | "monday" | "mondays" => Weekday::Mon,
        "tue" | "tues" | "tuesday" | "tuesdays" => Weekday::Tue,
        "wed" | "weds" | "wednesday" | "wednesdays" => Weekday::Wed,
        "thu" | "thur" | "thurs" | "thursday" | "thursdays" => Weekday::Thu,
        "fri" | "fris" | "friday" | "fridays" => Weekday::Fri,
        "sat" | "sats" | "saturday" | "saturdays" => Weekday::Sat,
        "sun" | "suns" | "sunday" | "sundays" => Weekday::Sun,
        _ => return None,
    };
    Some(weekday)
}

/// "Mondays", "Tues & Thurs", "Mondays, Wednesdays and Fridays", "weekends".
/// Every item must be a weekday name or the whole list is rejected.
fn parse_weekday_list(s: &str) -> Option<Vec<Weekday>> {
    let mut weekdays = Vec::new();
    for item in LIST_SEPARATOR_RE.split(s.trim()) {
        let item = item.trim();
        let item = item
            .strip_prefix("every ")
            .or_else(|| item.strip_prefix("Every "))
            .unwrap_or(item)
            .trim();
        if item.is_empty() {
            continue;
        }
        let expanded = match item.to_ascii_lowercase().as_str() {
            "weekdays" => vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            "weekends" => vec![Weekday::Sat, Weekday::Sun],
            _ => vec![parse_weekday(item)?],
        };
        for weekday in expanded {
            if !weekdays.contains(&weekday) {
                weekdays.push(weekday);
            }
        }
    }
    if weekdays.is_empty() { None } else { Some(weekdays) }
}
