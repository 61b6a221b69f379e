//! Public Google calendars: `google:<calendarId>`, read with an API key.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use url::Url;

use super::{FetchParams, SourceAdapter, SourceDescriptor, SourceFetch, local_to_utc};
use crate::error::{EventMapError, EventMapResult};
use crate::event::CanonicalEvent;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
const PAGE_SIZE: u32 = 250;
/// Stop paginating after this many pages
const MAX_PAGES: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    summary: Option<String>,
    time_zone: Option<String>,
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    location: String,
    html_link: Option<String>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    date_time: Option<DateTime<Utc>>,
    date: Option<NaiveDate>,
    time_zone: Option<String>,
}

impl EventDateTime {
    /// All-day dates are midnight in the calendar's zone.
    fn instant(&self, calendar_tz: &Tz) -> Option<DateTime<Utc>> {
        match (self.date_time, self.date) {
            (Some(dt), _) => Some(dt),
            (None, Some(date)) => local_to_utc(calendar_tz, date.and_time(NaiveTime::MIN)),
            (None, None) => None,
        }
    }
}

impl GoogleEvent {
    /// `Ok(None)` for cancelled events.
    fn into_canonical(self, calendar_tz: &Tz) -> Result<Option<CanonicalEvent>, String> {
        if self.status == "cancelled" {
            return Ok(None);
        }

        let start = self
            .start
            .as_ref()
            .and_then(|s| s.instant(calendar_tz))
            .ok_or_else(|| format!("event '{}' has no usable start time", self.id))?;
        let end = self
            .end
            .as_ref()
            .and_then(|e| e.instant(calendar_tz))
            .unwrap_or(start);
        let timezone_hint = self.start.and_then(|s| s.time_zone);

        let name = if self.summary.trim().is_empty() {
            "(No title)".to_string()
        } else {
            self.summary
        };

        Ok(Some(
            CanonicalEvent::new(self.id, name, start, end)
                .with_description(self.description)
                .with_location(self.location)
                .with_original_url(self.html_link)
                .with_timezone_hint(timezone_hint),
        ))
    }
}

pub struct GoogleAdapter {
    descriptor: SourceDescriptor,
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GoogleAdapter {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        GoogleAdapter {
            descriptor: SourceDescriptor::new(
                "google",
                "Google Calendar",
                Some("https://calendar.google.com"),
            ),
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a different API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn events_url(&self, calendar_id: &str) -> EventMapResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| EventMapError::Config(format!("Invalid Google API URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| EventMapError::Config("Google API URL cannot take a path".into()))?
            .extend(["calendars", calendar_id, "events"]);
        Ok(url)
    }

    async fn page(
        &self,
        url: &Url,
        api_key: &str,
        params: &FetchParams,
        page_token: Option<&str>,
    ) -> EventMapResult<EventsPage> {
        let mut query: Vec<(&str, String)> = vec![
            ("key", api_key.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(time_min) = params.time_min {
            query.push(("timeMin", time_min.to_rfc3339()));
        }
        if let Some(time_max) = params.time_max {
            query.push(("timeMax", time_max.to_rfc3339()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let page = self
            .client
            .get(url.clone())
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(page)
    }
}

/// Public embed link for a calendar id.
fn embed_url(calendar_id: &str) -> Option<String> {
    Url::parse_with_params("https://calendar.google.com/calendar/embed", [("src", calendar_id)])
        .ok()
        .map(String::from)
}

/// Convert one page into `fetch`, recording unreadable items as warnings.
fn absorb_page(fetch: &mut SourceFetch, page: EventsPage, calendar_tz: &Tz) {
    for item in page.items {
        match item.into_canonical(calendar_tz) {
            Ok(Some(event)) => fetch.events.push(event),
            Ok(None) => {}
            Err(message) => fetch.warn(message),
        }
    }
}

#[async_trait]
impl SourceAdapter for GoogleAdapter {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, id: &str, params: &FetchParams) -> EventMapResult<SourceFetch> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EventMapError::Config("google.api_key is not configured".into()))?;
        let calendar_id = id.trim();
        if calendar_id.is_empty() {
            return Err(EventMapError::Source("google source needs a calendar id".into()));
        }

        let url = self.events_url(calendar_id)?;
        let first = self.page(&url, api_key, params, None).await?;

        let mut fetch = SourceFetch::default();
        fetch.metadata.title = first.summary.clone();
        fetch.metadata.url = embed_url(calendar_id);
        let calendar_tz: Tz = first
            .time_zone
            .as_deref()
            .and_then(|name| name.parse().ok())
            .unwrap_or(Tz::UTC);

        let mut next = first.next_page_token.clone();
        absorb_page(&mut fetch, first, &calendar_tz);

        let mut pages = 1;
        while let Some(token) = next.take() {
            if pages >= MAX_PAGES {
                fetch.warn(format!("stopped after {MAX_PAGES} pages"));
                break;
            }
            match self.page(&url, api_key, params, Some(&token)).await {
                Ok(page) => {
                    next = page.next_page_token.clone();
                    absorb_page(&mut fetch, page, &calendar_tz);
                    pages += 1;
                }
                Err(e) => {
                    tracing::warn!(calendar = calendar_id, page = pages + 1, error = %e, "google page failed");
                    fetch.warn(format!("page {} failed: {}", pages + 1, e));
                }
            }
        }

        fetch.retain_window(params);
        Ok(fetch)
    }
}
