//! CLI entry point for the bike-share route pipeline.
//!
//! Provides subcommands for resolving station-pair routes, building the
//! average day, comparing days against it, and exporting for the front end.

use anyhow::{Context, Result};
use bikeshare_routes::{
    config::Config,
    export::ExportWindow,
    output::{log_bars, print_json, print_pretty},
    pipeline::{self, RunContext},
    routing::RoutinoRouter,
    store::{CsvStore, Dataset, append_record},
};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bikeshare_routes")]
#[command(about = "Resolve bike-share routes and find the most average day", long_about = None)]
struct Cli {
    /// JSON config file; defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the CSV tables (falls back to $DATA_DIR, then the config)
    #[arg(short = 'd', long, global = true)]
    data_dir: Option<PathBuf>,

    /// Per-year dataset, e.g. "2011" reads rentals_2011.csv
    #[arg(long, global = true)]
    dataset: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a route for every station pair, replacing the routes table
    Routes {
        /// Maximum number of pairs resolved at once
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,
    },
    /// Build the average day from all rentals of the season
    AverageDay {
        /// Print every Nth bucket
        #[arg(short, long, default_value_t = 6)]
        stagger: usize,
    },
    /// Score every day of the season against the average day
    CompareDays,
    /// Show the most average day from the stored comparison
    MostAverage {
        /// A date (YYYY-MM-DD) or "average" to show instead
        #[arg(long)]
        day: Option<String>,

        /// Print every Nth bucket
        #[arg(short, long, default_value_t = 6)]
        stagger: usize,
    },
    /// Write rentals, routes and density JSON/JSONP for a time window
    Export {
        /// Window start, "YYYY-MM-DD HH:MM:SS" or "YYYY-MM-DD"
        #[arg(long, value_parser = parse_datetime)]
        start: NaiveDateTime,

        /// Window end, same formats as --start
        #[arg(long, value_parser = parse_datetime)]
        end: NaiveDateTime,

        /// Directory to write into (defaults to the config's export_dir)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Also write gzip-compressed JSON
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Summarize stations and rentals of a dataset
    Stats {
        /// CSV file to append the summary to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/bikeshare_routes.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bikeshare_routes.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli
        .data_dir
        .or_else(|| std::env::var_os("DATA_DIR").map(PathBuf::from))
    {
        config.data_dir = dir;
    }
    if let Commands::Routes {
        concurrency: Some(n),
    } = &cli.command
    {
        config.concurrency = *n;
    }
    config.validate()?;

    let store = CsvStore::open(config.data_dir.clone())?;
    let mut ctx = RunContext::new(config, Dataset::new(cli.dataset), Box::new(store));
    info!(dataset = %ctx.dataset, data_dir = %ctx.config.data_dir.display(), "Run context ready");

    match cli.command {
        Commands::Routes { .. } => {
            let oracle = Arc::new(RoutinoRouter::new(&ctx.config.routing));
            let summary = pipeline::resolve_routes(&mut ctx, oracle).await?;
            print_pretty(&summary);
        }
        Commands::AverageDay { stagger } => {
            let average_day = pipeline::build_average_day(&mut ctx)?;
            log_bars("Average day", &pipeline::average_bars(&average_day), stagger);
        }
        Commands::CompareDays => {
            let comparison = pipeline::compare_days(&mut ctx)?;
            let summary = pipeline::score_summary(&comparison.profiles);
            info!(
                days = summary.count,
                mean = summary.mean,
                stddev = summary.stddev,
                min = summary.min,
                max = summary.max,
                "Day score summary"
            );
        }
        Commands::MostAverage { day, stagger } => {
            most_average(&ctx, day.as_deref(), stagger)?;
        }
        Commands::Export {
            start,
            end,
            output_dir,
            gzip,
        } => {
            let window = ExportWindow::new(start, end)?;
            let dir = output_dir.unwrap_or_else(|| ctx.config.export_dir.clone());
            let summary = pipeline::export(&ctx, &dir, &window, gzip)?;
            for files in &summary.files {
                info!(json = %files.json.display(), jsonp = %files.jsonp.display(), "Wrote");
            }
        }
        Commands::Stats { output } => {
            let stats = pipeline::dataset_stats(&ctx)?;
            print_json(&stats)?;
            info!(
                missing_timestamps_pct = stats.missing_timestamps_pct(),
                midnight_crossings_pct = stats.midnight_crossings_pct(),
                "Rental quality"
            );
            if let Some(path) = output {
                append_record(&path, &stats)?;
            }
        }
    }

    Ok(())
}

/// Visualizes the requested day, the average day, or the most average day.
#[tracing::instrument(skip(ctx))]
fn most_average(ctx: &RunContext, day: Option<&str>, stagger: usize) -> Result<()> {
    let day = match day {
        Some("average") => {
            let average_day = ctx.store.average_day(&ctx.dataset)?;
            log_bars("Average day", &pipeline::average_bars(&average_day), stagger);
            return Ok(());
        }
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .with_context(|| format!("invalid day '{}'", value))?,
        None => match pipeline::most_average_day(ctx)? {
            Some(profile) => {
                info!(
                    day = %profile.day,
                    score = profile.score,
                    populated_buckets = profile.populated_buckets,
                    "Most average day"
                );
                profile.day
            }
            None => {
                warn!(
                    min_populated_buckets = ctx.config.min_populated_buckets,
                    "No qualifying day; run compare-days first"
                );
                return Ok(());
            }
        },
    };

    let bars = pipeline::day_bars(ctx, day)?;
    if bars.is_empty() {
        warn!(day = %day, "Day not in the comparison table");
    }
    log_bars(&format!("Rides on the road, {}", day), &bars, stagger);
    Ok(())
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime, String> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .ok_or_else(|| format!("unrecognized date/time '{}'", value))
}
