use anyhow::Result;
use eventmap_core::{Bounds, DateRange, EventMap, FilterState};
use owo_colors::OwoColorize;

use crate::render::{Render, pluralize, render_event_list};

pub struct Filters {
    pub date_range: Option<DateRange>,
    pub search: Option<String>,
    pub bounds: Option<Bounds>,
    pub viewport: Option<Bounds>,
    pub unknown_only: bool,
}

pub async fn run(
    eventmap: &EventMap,
    source: &str,
    window: DateRange,
    filters: Filters,
    json: bool,
) -> Result<()> {
    let aggregation = eventmap.fetch(source, &window.into()).await?;

    let state = FilterState {
        date_range: filters.date_range,
        search_query: filters.search,
        map_bounds: filters.bounds,
        unknown_locations_only: filters.unknown_only,
    };
    let result = eventmap.facets(&aggregation.events, &state, filters.viewport.as_ref());
    tracing::debug!(
        total = aggregation.events.len(),
        visible = result.visible_events.len(),
        hidden = ?result.hidden_counts,
        "applied filters"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    for error in &aggregation.metadata.errors {
        println!("{}", error.render());
    }

    let total = aggregation.events.len();
    let visible = result.visible_events.len();
    println!(
        "{}",
        format!("{} of {} {} visible", visible, total, pluralize("event", total)).bold()
    );
    println!("{}", result.hidden_counts.render());
    println!();

    if result.visible_events.is_empty() {
        println!("{}", "No events match".dimmed());
        return Ok(());
    }

    for line in render_event_list(&result.visible_events) {
        println!("{}", line);
    }

    Ok(())
}
