use anyhow::Result;
use chrono_tz::Tz;
use eventmap_core::{AppConfig, DateTextParser};

use crate::render::Render;

pub fn run(text: &str, tz: Option<&str>) -> Result<()> {
    let tz: Tz = match tz {
        Some(name) => name
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown timezone '{}'", name))?,
        None => AppConfig::load()?.tz(),
    };

    let parsed = DateTextParser::new(tz).parse(text);
    println!("{}", parsed.render());

    Ok(())
}
