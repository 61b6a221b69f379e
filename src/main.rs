mod commands;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use eventmap_core::{Bounds, DateRange, EventMap};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eventmap")]
#[command(about = "Merge event feeds, resolve their locations and filter them for a map")]
struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and merge events from one or more sources
    Fetch {
        /// Comma-separated source ids, e.g. "ical:https://example.com/a.ics,listing:~/events.json"
        source: String,

        /// Only events from this date (YYYY-MM-DD, or "start" for no lower bound)
        #[arg(long)]
        from: Option<String>,

        /// Only events until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Print events and metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch events, then apply filters and show what each filter hides
    Filter {
        /// Comma-separated source ids
        source: String,

        /// Fetch window start (YYYY-MM-DD, or "start")
        #[arg(long)]
        from: Option<String>,

        /// Fetch window end (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Date facet start (YYYY-MM-DD)
        #[arg(long)]
        after: Option<String>,

        /// Date facet end (YYYY-MM-DD)
        #[arg(long)]
        before: Option<String>,

        /// Case-insensitive text search over name, location and description
        #[arg(short, long)]
        search: Option<String>,

        /// Stored map bounds as south,west,north,east
        #[arg(long, value_parser = Bounds::parse, allow_hyphen_values = true)]
        bounds: Option<Bounds>,

        /// Viewport bounds for this query only (overrides --bounds)
        #[arg(long, value_parser = Bounds::parse, allow_hyphen_values = true)]
        viewport: Option<Bounds>,

        /// Only events whose location could not be resolved
        #[arg(long)]
        unknown_only: bool,

        /// Print the facet result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse human-written date text, e.g. "2nd/4th Tuesdays (7-9pm)"
    Parse {
        text: String,

        /// IANA zone the text is written in (defaults to config timezone)
        #[arg(long)]
        tz: Option<String>,
    },
    /// List the available source types
    Sources,
    /// Write a commented default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Fetch {
            source,
            from,
            to,
            json,
        } => {
            let range = date_range(from.as_deref(), to.as_deref())?;
            let eventmap = EventMap::load()?;
            commands::fetch::run(&eventmap, &source, range, json).await
        }
        Commands::Filter {
            source,
            from,
            to,
            after,
            before,
            search,
            bounds,
            viewport,
            unknown_only,
            json,
        } => {
            let window = date_range(from.as_deref(), to.as_deref())?;
            let facet_range = date_range(after.as_deref(), before.as_deref())?;
            let eventmap = EventMap::load()?;
            let filters = commands::filter::Filters {
                date_range: (!facet_range.is_unbounded()).then_some(facet_range),
                search,
                bounds,
                viewport,
                unknown_only,
            };
            commands::filter::run(&eventmap, &source, window, filters, json).await
        }
        Commands::Parse { text, tz } => commands::parse::run(&text, tz.as_deref()),
        Commands::Sources => {
            let eventmap = EventMap::load()?;
            commands::sources::run(&eventmap)
        }
        Commands::InitConfig { force } => commands::init_config::run(force),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn date_range(from: Option<&str>, to: Option<&str>) -> Result<DateRange> {
    DateRange::from_args(from, to).map_err(|e| anyhow::anyhow!(e))
}
