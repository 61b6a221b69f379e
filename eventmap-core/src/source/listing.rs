//! Hand-maintained event listings: `listing:<path or url>`.
//!
//! A listing is a JSON document holding an array of records (or an object
//! with `title` and `events`). Each record's `when` is free text such as
//! "Saturday: March 22 (7pm-10pm)" and goes through [`DateTextParser`].

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{FetchParams, SourceAdapter, SourceDescriptor, SourceFetch, http_url, is_remote};
use crate::date_text::DateTextParser;
use crate::error::{EventMapError, EventMapResult};
use crate::event::CanonicalEvent;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListingDocument {
    Records(Vec<Value>),
    Titled {
        title: Option<String>,
        #[serde(default)]
        events: Vec<Value>,
    },
}

#[derive(Debug, Deserialize)]
struct ListingRecord {
    id: Option<String>,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    when: Value,
    url: Option<String>,
}

pub struct ListingAdapter {
    descriptor: SourceDescriptor,
    client: reqwest::Client,
    parser: DateTextParser,
}

impl ListingAdapter {
    pub fn new(client: reqwest::Client, parser: DateTextParser) -> Self {
        ListingAdapter {
            descriptor: SourceDescriptor::new("listing", "Event listing", None),
            client,
            parser,
        }
    }

    async fn read(&self, location: &str) -> EventMapResult<String> {
        if is_remote(location) {
            let body = self
                .client
                .get(http_url(location))
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            return Ok(body);
        }

        let path = location.strip_prefix("file://").unwrap_or(location);
        let expanded = shellexpand::tilde(path).into_owned();
        Ok(tokio::fs::read_to_string(expanded).await?)
    }
}

#[async_trait]
impl SourceAdapter for ListingAdapter {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, id: &str, params: &FetchParams) -> EventMapResult<SourceFetch> {
        let location = id.trim();
        if location.is_empty() {
            return Err(EventMapError::Source("listing source needs a path or URL".into()));
        }

        let body = self.read(location).await?;
        let mut fetch = parse_listing(&body, &self.parser, params, Utc::now())?;
        if is_remote(location) {
            fetch.metadata.url = Some(http_url(location));
        }
        Ok(fetch)
    }
}

/// Turn a listing document into canonical events. Records that are not
/// objects or have no name are skipped with a warning.
pub fn parse_listing(
    body: &str,
    parser: &DateTextParser,
    params: &FetchParams,
    now: DateTime<Utc>,
) -> EventMapResult<SourceFetch> {
    let document: ListingDocument = serde_json::from_str(body)?;
    let (title, records) = match document {
        ListingDocument::Records(records) => (None, records),
        ListingDocument::Titled { title, events } => (title, events),
    };

    let mut fetch = SourceFetch::default();
    fetch.metadata.title = title;
    let mut taken: HashSet<String> = HashSet::new();

    for (index, raw) in records.into_iter().enumerate() {
        let record: ListingRecord = match serde_json::from_value(raw) {
            Ok(record) => record,
            Err(e) => {
                fetch.warn(format!("skipped listing record #{}: {}", index + 1, e));
                continue;
            }
        };
        if record.name.trim().is_empty() {
            fetch.warn(format!("skipped listing record #{}: empty name", index + 1));
            continue;
        }

        let when = parser.parse_value_at(&record.when, now);
        let base = record
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("listing-{index}"));
        let id = unique_id(&mut taken, base);

        fetch.events.push(
            CanonicalEvent::new(id, record.name.trim(), when.start, when.end)
                .with_description(record.description)
                .with_location(record.location.trim())
                .with_original_url(record.url)
                .with_timezone_hint(Some(parser.timezone().name().to_string())),
        );
    }

    fetch.retain_window(params);
    Ok(fetch)
}

/// Repeats get `-2`, `-3`, ... until the id is unused in this listing.
fn unique_id(taken: &mut HashSet<String>, base: String) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchStatus;
    use chrono::{Duration, TimeZone};
    use chrono_tz::Tz;
    use std::io::Write;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 19, 12, 0, 0).unwrap()
    }

    const LISTING: &str = r#"{
        "title": "Brooklyn Weekly",
        "events": [
            {"id": "swing", "name": "Swing Dancing", "location": "Grand Army Plaza",
             "when": "Mondays (9:30pm-2:30am)", "url": "https://example.org/swing"},
            {"name": "Poetry Slam", "description": "Sign up at https://slam.example",
             "location": "  Nuyorican Cafe ", "when": "Saturday: March 22 (7pm-10pm)"},
            {"name": "Mystery Thing", "when": 17},
            {"name": "   "},
            "not a record"
        ]
    }"#;

    #[test]
    fn test_records_become_events() {
        let parser = DateTextParser::new(Tz::UTC);
        let fetch = parse_listing(LISTING, &parser, &FetchParams::default(), now()).unwrap();

        assert_eq!(fetch.metadata.title.as_deref(), Some("Brooklyn Weekly"));
        assert_eq!(fetch.events.len(), 3);

        let swing = &fetch.events[0];
        assert_eq!(swing.id, "swing");
        assert_eq!(swing.start, Utc.with_ymd_and_hms(2025, 3, 24, 21, 30, 0).unwrap());
        assert_eq!(swing.original_url.as_deref(), Some("https://example.org/swing"));

        let slam = &fetch.events[1];
        assert_eq!(slam.id, "listing-1");
        assert_eq!(slam.raw_location_text, "Nuyorican Cafe");
        assert_eq!(slam.description_urls, vec!["https://slam.example"]);

        // Non-string `when` falls back to a four-hour slot from now
        let mystery = &fetch.events[2];
        assert_eq!(mystery.start, now());
        assert_eq!(mystery.end, now() + Duration::hours(4));
    }

    #[test]
    fn test_bad_records_make_fetch_partial() {
        let parser = DateTextParser::default();
        let fetch = parse_listing(LISTING, &parser, &FetchParams::default(), now()).unwrap();
        assert_eq!(fetch.metadata.status, FetchStatus::Partial);
        assert_eq!(fetch.metadata.warnings.len(), 2);
    }

    #[test]
    fn test_window_applies_to_parsed_times() {
        let parser = DateTextParser::default();
        let params = FetchParams::new(
            Some(Utc.with_ymd_and_hms(2025, 3, 22, 0, 0, 0).unwrap()),
            Some(Utc.with_ymd_and_hms(2025, 3, 23, 0, 0, 0).unwrap()),
        );
        let fetch = parse_listing(LISTING, &parser, &params, now()).unwrap();
        let ids: Vec<_> = fetch.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["listing-1"]);
    }

    #[test]
    fn test_bare_array_document() {
        let body = r#"[{"name": "Open Mic", "when": "Fridays (8pm)"}]"#;
        let fetch = parse_listing(body, &DateTextParser::default(), &FetchParams::default(), now())
            .unwrap();
        assert!(fetch.metadata.title.is_none());
        assert_eq!(fetch.events[0].id, "listing-0");
    }

    #[test]
    fn test_repeated_ids_are_suffixed() {
        let body = r#"[
            {"id": "x", "name": "A", "when": "Fridays (8pm)"},
            {"id": "x", "name": "B", "when": "Fridays (8pm)"},
            {"name": "C", "when": "Fridays (8pm)"},
            {"id": "listing-2", "name": "D", "when": "Fridays (8pm)"},
            {"id": "x-2", "name": "E", "when": "Fridays (8pm)"}
        ]"#;
        let fetch = parse_listing(body, &DateTextParser::default(), &FetchParams::default(), now())
            .unwrap();
        let ids: Vec<_> = fetch.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "x-2", "listing-2", "listing-2-2", "x-2-2"]);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let result = parse_listing("{nope", &DateTextParser::default(), &FetchParams::default(), now());
        assert!(matches!(result, Err(EventMapError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_fetch_reads_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id": "x", "name": "Zine Fair", "when": "Sunday: April 6"}}]"#).unwrap();

        let adapter = ListingAdapter::new(reqwest::Client::new(), DateTextParser::default());
        let path = format!("file://{}", file.path().display());
        let fetch = adapter.fetch(&path, &FetchParams::default()).await.unwrap();
        assert_eq!(fetch.events.len(), 1);
        assert_eq!(fetch.events[0].name, "Zine Fair");
        assert!(fetch.metadata.url.is_none());
    }
}
