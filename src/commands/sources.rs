use anyhow::Result;
use eventmap_core::EventMap;
use owo_colors::OwoColorize;

use crate::render::Render;

pub fn run(eventmap: &EventMap) -> Result<()> {
    println!("{}", "Source types".bold());
    for descriptor in eventmap.sources() {
        println!("  {}", descriptor.render());
    }
    println!();
    println!(
        "{}",
        "Combine sources with commas: ical:https://example.com/a.ics,listing:~/events.json".dimmed()
    );

    Ok(())
}
