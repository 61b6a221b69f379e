//! iCalendar feeds: `ical:<url>` (http, https or webcal).
//!
//! Recurring masters are expanded into instances inside the fetch window;
//! RECURRENCE-ID overrides replace the instance they point at and EXDATEs
//! remove theirs.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use icalendar::parser::{Component, Property, read_calendar, unfold};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use rrule::RRuleSet;

use super::{FetchParams, SourceAdapter, SourceDescriptor, SourceFetch, http_url, local_to_utc};
use crate::constants::DEFAULT_WINDOW_DAYS;
use crate::error::{EventMapError, EventMapResult};
use crate::event::CanonicalEvent;

pub struct IcalAdapter {
    descriptor: SourceDescriptor,
    client: reqwest::Client,
    /// Zone for floating times and all-day dates when the feed names none
    tz: Tz,
}

impl IcalAdapter {
    pub fn new(client: reqwest::Client, tz: Tz) -> Self {
        IcalAdapter {
            descriptor: SourceDescriptor::new("ical", "iCalendar feed", None),
            client,
            tz,
        }
    }
}

#[async_trait]
impl SourceAdapter for IcalAdapter {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, id: &str, params: &FetchParams) -> EventMapResult<SourceFetch> {
        if id.trim().is_empty() {
            return Err(EventMapError::Source("ical source needs a feed URL".into()));
        }
        let url = http_url(id.trim());
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut fetch = parse_feed(&body, self.tz, params, Utc::now())?;
        fetch.metadata.url = Some(url);
        Ok(fetch)
    }
}

/// Parse a whole feed into canonical events within the window of `params`.
/// `now` anchors recurrence expansion when the window has no lower bound.
pub fn parse_feed(
    content: &str,
    default_tz: Tz,
    params: &FetchParams,
    now: DateTime<Utc>,
) -> EventMapResult<SourceFetch> {
    let unfolded = unfold(content);
    let is_calendar = unfolded
        .trim_start_matches('\u{feff}')
        .trim_start()
        .get(..15)
        .is_some_and(|head| head.eq_ignore_ascii_case("BEGIN:VCALENDAR"));
    if !is_calendar {
        return Err(EventMapError::IcsParse("missing BEGIN:VCALENDAR".into()));
    }
    let calendar =
        read_calendar(&unfolded).map_err(|e| EventMapError::IcsParse(e.to_string()))?;

    let mut fetch = SourceFetch::default();
    fetch.metadata.title = calendar_property(&unfolded, "X-WR-CALNAME").map(unescape);
    let feed_tz = calendar_property(&unfolded, "X-WR-TIMEZONE")
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or(default_tz);

    let mut vevents = Vec::new();
    for (i, component) in calendar.components.iter().filter(|c| c.name == "VEVENT").enumerate() {
        match VEvent::parse(component, feed_tz) {
            Some(vevent) => vevents.push(vevent),
            None => fetch.warn(format!("skipped malformed VEVENT #{}", i + 1)),
        }
    }

    // (uid, recurrence-id) pairs that replace a generated instance
    let overridden: HashSet<(String, DateTime<Utc>)> = vevents
        .iter()
        .filter_map(|v| Some((v.uid.clone(), v.recurrence_id?)))
        .collect();

    let window_start = params.time_min.unwrap_or(now);
    let window_end = params
        .time_max
        .unwrap_or(window_start + Duration::days(DEFAULT_WINDOW_DAYS));

    for vevent in vevents.iter().filter(|v| !v.cancelled) {
        match (&vevent.rrule, vevent.recurrence_id) {
            (Some(rrule), None) => match vevent.expand(rrule, window_start, window_end) {
                Ok(starts) => {
                    for start in starts {
                        if !overridden.contains(&(vevent.uid.clone(), start)) {
                            fetch.events.push(vevent.instance(start, Some(start)));
                        }
                    }
                }
                Err(message) => {
                    fetch.warn(message);
                    fetch.events.push(vevent.instance(vevent.start.utc, None));
                }
            },
            (_, recurrence_id) => fetch.events.push(vevent.instance(vevent.start.utc, recurrence_id)),
        }
    }

    fetch.retain_window(params);
    Ok(fetch)
}

/// A DTSTART/DTEND value pinned to an instant, remembering its wall-clock form.
#[derive(Debug, Clone)]
struct Stamp {
    utc: DateTime<Utc>,
    local: NaiveDateTime,
    tz: Tz,
    tzid: Option<String>,
    all_day: bool,
}

impl Stamp {
    fn from_ical(dpt: DatePerhapsTime, feed_tz: Tz) -> Option<Stamp> {
        match dpt {
            DatePerhapsTime::Date(date) => {
                let local = date.and_time(NaiveTime::MIN);
                Some(Stamp {
                    utc: local_to_utc(&feed_tz, local)?,
                    local,
                    tz: feed_tz,
                    tzid: None,
                    all_day: true,
                })
            }
            DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
                CalendarDateTime::Utc(dt) => Some(Stamp {
                    utc: dt,
                    local: dt.naive_utc(),
                    tz: Tz::UTC,
                    tzid: None,
                    all_day: false,
                }),
                CalendarDateTime::Floating(local) => Some(Stamp {
                    utc: local_to_utc(&feed_tz, local)?,
                    local,
                    tz: feed_tz,
                    tzid: None,
                    all_day: false,
                }),
                CalendarDateTime::WithTimezone { date_time, tzid } => {
                    let tz = tzid.parse::<Tz>().unwrap_or(feed_tz);
                    Some(Stamp {
                        utc: local_to_utc(&tz, date_time)?,
                        local: date_time,
                        tz,
                        tzid: Some(tzid),
                        all_day: false,
                    })
                }
            },
        }
    }

    fn from_property(prop: Option<&Property>, feed_tz: Tz) -> Option<Stamp> {
        Stamp::from_ical(DatePerhapsTime::try_from(prop?).ok()?, feed_tz)
    }
}

struct VEvent {
    uid: String,
    summary: String,
    description: String,
    location: String,
    url: Option<String>,
    start: Stamp,
    duration: Duration,
    rrule: Option<String>,
    exdates: Vec<DateTime<Utc>>,
    recurrence_id: Option<DateTime<Utc>>,
    cancelled: bool,
}

impl VEvent {
    fn parse(vevent: &Component, feed_tz: Tz) -> Option<VEvent> {
        let uid = vevent.find_prop("UID")?.val.to_string();
        let start = Stamp::from_property(vevent.find_prop("DTSTART"), feed_tz)?;

        let duration = match Stamp::from_property(vevent.find_prop("DTEND"), feed_tz) {
            Some(end) => end.utc - start.utc,
            None => match vevent.find_prop("DURATION").and_then(|p| parse_duration(p.val.as_ref())) {
                Some(duration) => duration,
                None if start.all_day => Duration::days(1),
                None => Duration::zero(),
            },
        };

        let text = |name: &str| {
            vevent
                .find_prop(name)
                .map(|p| unescape(p.val.as_ref()))
                .unwrap_or_default()
        };

        let summary = Some(text("SUMMARY"))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "(No title)".to_string());

        let exdates = vevent
            .properties
            .iter()
            .filter(|p| p.name == "EXDATE")
            .flat_map(|p| parse_exdate_property(p, feed_tz))
            .collect();

        Some(VEvent {
            uid,
            summary,
            description: text("DESCRIPTION"),
            location: text("LOCATION"),
            url: vevent.find_prop("URL").map(|p| p.val.to_string()),
            duration: duration.max(Duration::zero()),
            rrule: vevent.find_prop("RRULE").map(|p| p.val.to_string()),
            exdates,
            recurrence_id: Stamp::from_property(vevent.find_prop("RECURRENCE-ID"), feed_tz)
                .map(|s| s.utc),
            cancelled: vevent
                .find_prop("STATUS")
                .is_some_and(|p| p.val.as_ref().eq_ignore_ascii_case("CANCELLED")),
            start,
        })
    }

    /// Occurrence starts overlapping [window_start, window_end].
    fn expand(
        &self,
        rrule: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, String> {
        let mut lines = Vec::new();

        // DTSTART keeps its zone so weekly times survive DST changes
        if self.start.tz == Tz::UTC {
            lines.push(format!("DTSTART:{}", self.start.utc.format("%Y%m%dT%H%M%SZ")));
        } else {
            lines.push(format!(
                "DTSTART;TZID={}:{}",
                self.start.tz.name(),
                self.start.local.format("%Y%m%dT%H%M%S")
            ));
        }
        lines.push(format!("RRULE:{}", rrule));
        for exdate in &self.exdates {
            lines.push(format!("EXDATE:{}", exdate.format("%Y%m%dT%H%M%SZ")));
        }

        let rrule_set: RRuleSet = lines
            .join("\n")
            .parse()
            .map_err(|e| format!("Failed to parse RRULE for event '{}': {}", self.uid, e))?;

        // after/before are exclusive; widen by a second, and by the event length
        // so occurrences already in progress at window_start are kept
        let tz: rrule::Tz = Utc.into();
        let after = (window_start - self.duration - Duration::seconds(1)).with_timezone(&tz);
        let before = (window_end + Duration::seconds(1)).with_timezone(&tz);

        let result = rrule_set.after(after).before(before).all(500);
        Ok(result.dates.iter().map(|dt| dt.with_timezone(&Utc)).collect())
    }

    /// A canonical event starting at `start`. Instances of a series get an id
    /// of `<uid>_<recurrence-id>` so overrides and generated instances agree.
    fn instance(&self, start: DateTime<Utc>, recurrence_id: Option<DateTime<Utc>>) -> CanonicalEvent {
        let id = match recurrence_id {
            Some(rid) => format!("{}_{}", self.uid, rid.format("%Y%m%dT%H%M%SZ")),
            None => self.uid.clone(),
        };

        CanonicalEvent::new(id, &self.summary, start, start + self.duration)
            .with_description(&self.description)
            .with_location(&self.location)
            .with_original_url(self.url.clone())
            .with_timezone_hint(self.start.tzid.clone())
    }
}

/// Read a top-level VCALENDAR property such as X-WR-CALNAME.
fn calendar_property<'a>(unfolded: &'a str, name: &str) -> Option<&'a str> {
    unfolded
        .lines()
        .take_while(|line| !line.starts_with("BEGIN:VEVENT"))
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.eq_ignore_ascii_case(name)).then(|| value.trim())
        })
        .filter(|value| !value.is_empty())
}

/// Undo RFC 5545 TEXT escaping.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Parse an ISO 8601 duration such as `PT1H30M`.
fn parse_duration(value: &str) -> Option<Duration> {
    let duration = iso8601::duration(value.trim().trim_start_matches('+')).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

/// Parse an EXDATE property into instants.
///
/// Handles:
/// - TZID parameter: `EXDATE;TZID=America/New_York:20240108T100000`
/// - VALUE=DATE: `EXDATE;VALUE=DATE:20240108`
/// - UTC: `EXDATE:20240108T100000Z`
/// - Floating: `EXDATE:20240108T100000`
/// - Comma-separated values: `EXDATE;TZID=...:20240108T100000,20240115T100000`
fn parse_exdate_property(prop: &Property, feed_tz: Tz) -> Vec<DateTime<Utc>> {
    let tz = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
        .and_then(|tzid| tzid.parse::<Tz>().ok())
        .unwrap_or(feed_tz);

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date {
                let date = chrono::NaiveDate::parse_from_str(s, "%Y%m%d").ok()?;
                local_to_utc(&tz, date.and_time(NaiveTime::MIN))
            } else if let Some(utc) = s.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            } else {
                let local = NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok()?;
                local_to_utc(&tz, local)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchStatus;
    use chrono::TimeZone;

    const FEED: &str = "BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
X-WR-CALNAME:Community Events
X-WR-TIMEZONE:America/New_York
BEGIN:VEVENT
UID:single-1
SUMMARY:Park Cleanup
DESCRIPTION:Bring gloves.\\nDetails: https://example.org/cleanup
LOCATION:Prospect Park\\, Brooklyn
URL:https://example.org/events/1
DTSTART;TZID=America/New_York:20250322T100000
DTEND;TZID=America/New_York:20250322T120000
END:VEVENT
BEGIN:VEVENT
UID:weekly-1
SUMMARY:Trivia Night
DTSTART:20250303T233000Z
DURATION:PT2H
RRULE:FREQ=WEEKLY;COUNT=10
EXDATE:20250317T233000Z
END:VEVENT
BEGIN:VEVENT
UID:weekly-1
RECURRENCE-ID:20250324T233000Z
SUMMARY:Trivia Night (Finals)
DTSTART:20250325T000000Z
DTEND:20250325T020000Z
END:VEVENT
BEGIN:VEVENT
UID:cancelled-1
SUMMARY:Gone
STATUS:CANCELLED
DTSTART:20250322T100000Z
DTEND:20250322T110000Z
END:VEVENT
BEGIN:VEVENT
SUMMARY:No uid
DTSTART:20250322T100000Z
END:VEVENT
END:VCALENDAR
";

    fn window() -> FetchParams {
        FetchParams::new(
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap()),
            Some(Utc.with_ymd_and_hms(2025, 3, 31, 0, 0, 0).unwrap()),
        )
    }

    fn parse() -> SourceFetch {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        parse_feed(FEED, Tz::UTC, &window(), now).expect("feed should parse")
    }

    #[test]
    fn test_feed_metadata_and_partial_status() {
        let fetch = parse();
        assert_eq!(fetch.metadata.title.as_deref(), Some("Community Events"));
        assert_eq!(fetch.metadata.status, FetchStatus::Partial);
        assert_eq!(fetch.metadata.warnings.len(), 1);
    }

    #[test]
    fn test_expansion_honors_exdate_and_override() {
        let mut ids: Vec<_> = parse().events.into_iter().map(|e| e.id).collect();
        ids.sort();
        assert_eq!(
            ids,
            vec![
                "single-1",
                "weekly-1_20250310T233000Z",
                "weekly-1_20250324T233000Z",
            ]
        );
    }

    #[test]
    fn test_override_keeps_its_own_times() {
        let fetch = parse();
        let finals = fetch
            .events
            .iter()
            .find(|e| e.id == "weekly-1_20250324T233000Z")
            .unwrap();
        assert_eq!(finals.name, "Trivia Night (Finals)");
        assert_eq!(finals.start, Utc.with_ymd_and_hms(2025, 3, 25, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_zoned_event_fields() {
        let fetch = parse();
        let cleanup = fetch.events.iter().find(|e| e.id == "single-1").unwrap();
        assert_eq!(cleanup.start, Utc.with_ymd_and_hms(2025, 3, 22, 14, 0, 0).unwrap());
        assert_eq!(cleanup.end, Utc.with_ymd_and_hms(2025, 3, 22, 16, 0, 0).unwrap());
        assert_eq!(cleanup.raw_location_text, "Prospect Park, Brooklyn");
        assert_eq!(cleanup.description_urls, vec!["https://example.org/cleanup"]);
        assert_eq!(cleanup.original_url.as_deref(), Some("https://example.org/events/1"));
        assert_eq!(cleanup.timezone_hint.as_deref(), Some("America/New_York"));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        for body in ["not a calendar", "", "BEGIN:VEVENT\nUID:x\nEND:VEVENT"] {
            let result = parse_feed(body, Tz::UTC, &FetchParams::default(), Utc::now());
            assert!(matches!(result, Err(EventMapError::IcsParse(_))), "input: {body:?}");
        }
    }

    #[test]
    fn test_exdate_forms() {
        let ics = "BEGIN:VCALENDAR
BEGIN:VEVENT
UID:x
DTSTART:20240101T100000Z
EXDATE;TZID=America/New_York:20240108T100000,20240115T100000
EXDATE;VALUE=DATE:20240122
END:VEVENT
END:VCALENDAR
";
        let unfolded = unfold(ics);
        let calendar = read_calendar(&unfolded).unwrap();
        let vevent = calendar.components.iter().find(|c| c.name == "VEVENT").unwrap();
        let exdates: Vec<_> = vevent
            .properties
            .iter()
            .filter(|p| p.name == "EXDATE")
            .flat_map(|p| parse_exdate_property(p, Tz::UTC))
            .collect();
        assert_eq!(
            exdates,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 8, 15, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 15, 15, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 22, 0, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\, b\; c\nd\\e"), "a, b; c\nd\\e");
    }
}
