//! Terminal rendering for eventmap types.
//!
//! Extension traits that add colored output to eventmap-core types using
//! owo_colors.

use chrono::{DateTime, Local, Utc};
use eventmap_core::{
    CanonicalEvent, FetchStatus, HiddenCounts, LocationStatus, ParsedRange, PieceError,
    PieceMetadata, SourceDescriptor,
};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for CanonicalEvent {
    fn render(&self) -> String {
        let time = format!("{}-{}", local_time(self.start), local_time(self.end));
        let location = render_location(self);
        if location.is_empty() {
            format!("  {} {}", time, self.name)
        } else {
            format!("  {} {} {}", time, self.name, location)
        }
    }
}

fn render_location(event: &CanonicalEvent) -> String {
    if event.raw_location_text.is_empty() {
        return String::new();
    }
    let text = event.raw_location_text.as_str();
    match event.resolved_location.as_ref().map(|l| l.status) {
        Some(LocationStatus::Resolved) => format!("{} {}", "@".green(), text.dimmed()),
        Some(LocationStatus::Unresolved) => format!("{} {}", "?".yellow(), text.dimmed()),
        Some(LocationStatus::Pending) | None => format!("{} {}", "~".dimmed(), text.dimmed()),
    }
}

impl Render for PieceMetadata {
    fn render(&self) -> String {
        let name = self.title.as_deref().unwrap_or(&self.source_id);
        let count = format!("({} {})", self.event_count, pluralize("event", self.event_count));
        let mut line = match self.status {
            FetchStatus::Complete => format!("{} {} {}", "✓".green(), name, count.dimmed()),
            FetchStatus::Partial => format!("{} {} {}", "!".yellow(), name, count.dimmed()),
        };
        for warning in &self.warnings {
            line.push_str(&format!("\n    {}", warning.yellow()));
        }
        line
    }
}

impl Render for PieceError {
    fn render(&self) -> String {
        format!("{} {}: {}", "✗".red(), self.source_id, self.message.red())
    }
}

impl Render for SourceDescriptor {
    fn render(&self) -> String {
        let mut line = format!("{:<10} {}", self.prefix.bold(), self.display_name);
        if let Some(url) = &self.homepage_url {
            line.push_str(&format!(" {}", url.dimmed()));
        }
        line
    }
}

impl Render for HiddenCounts {
    fn render(&self) -> String {
        let facets = [
            ("date", self.by_date),
            ("search", self.by_search),
            ("map", self.by_map),
            ("unknown location", self.by_unknown_locations),
        ];
        let parts: Vec<String> = facets
            .iter()
            .map(|(name, count)| {
                let part = format!("{} {}", name, count);
                if *count > 0 { part.yellow().to_string() } else { part.dimmed().to_string() }
            })
            .collect();
        format!("{} {}", "Hidden by:".dimmed(), parts.join(", "))
    }
}

impl Render for ParsedRange {
    fn render(&self) -> String {
        let kind = if self.recurring { "recurring" } else { "one-off" };
        format!(
            "start  {}\nend    {}\n{}",
            self.start.to_rfc3339(),
            self.end.to_rfc3339(),
            kind.dimmed()
        )
    }
}

/// Events grouped under day headings, in the given order.
pub fn render_event_list(events: &[CanonicalEvent]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_date: Option<String> = None;

    for event in events {
        let date_label = format_date_label(event.start);
        if current_date.as_ref() != Some(&date_label) {
            if current_date.is_some() {
                lines.push(String::new());
            }
            lines.push(date_label.bold().to_string());
            current_date = Some(date_label);
        }
        lines.push(event.render());
    }
    lines
}

/// "Today", "Tomorrow", or e.g. "Wed Feb 25"
fn format_date_label(time: DateTime<Utc>) -> String {
    let today = Local::now().date_naive();
    let date = time.with_timezone(&Local).date_naive();

    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%a %b %-d").to_string(),
    }
}

fn local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%H:%M").to_string()
}

pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 { word.to_string() } else { format!("{word}s") }
}
