use anyhow::Result;
use eventmap_core::{DateRange, EventMap};
use owo_colors::OwoColorize;

use crate::render::{Render, render_event_list};

pub async fn run(eventmap: &EventMap, source: &str, range: DateRange, json: bool) -> Result<()> {
    tracing::debug!(source, from = ?range.from, to = ?range.to, "fetching");
    let aggregation = eventmap.fetch(source, &range.into()).await?;
    tracing::debug!(
        pieces = aggregation.metadata.sources.len(),
        events = aggregation.events.len(),
        "fetched"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&aggregation)?);
        return Ok(());
    }

    for piece in &aggregation.metadata.sources {
        println!("{}", piece.render());
    }
    for error in &aggregation.metadata.errors {
        println!("{}", error.render());
    }
    println!();

    if aggregation.events.is_empty() {
        println!("{}", "No events found".dimmed());
        return Ok(());
    }

    for line in render_event_list(&aggregation.events) {
        println!("{}", line);
    }

    Ok(())
}
