//! End-to-end operations run by the CLI subcommands.
//!
//! Each operation reads its inputs through the [`RunContext`] store,
//! computes, and replaces its output table.

use anyhow::{Result, anyhow, bail};
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analyzers::day_score::{DayComparison, DayScorer, most_average, profiles_from_rows};
use crate::analyzers::interval::IntervalModel;
use crate::analyzers::types::{AverageBucket, DayBucketRow, DayProfile, SeasonBounds, TimeBucket};
use crate::analyzers::utility::{Summary, summarize};
use crate::config::Config;
use crate::export::{ExportSummary, ExportWindow, Exporter};
use crate::graph::station_pairs;
use crate::model::{Rental, Station};
use crate::output::BarPoint;
use crate::routing::{ResolveSummary, RouteResolver, RoutingOracle};
use crate::stats::DatasetStats;
use crate::store::{Dataset, Store};

/// Validated configuration, dataset selector and store for one run.
pub struct RunContext {
    pub config: Config,
    pub dataset: Dataset,
    pub store: Box<dyn Store>,
}

impl RunContext {
    pub fn new(config: Config, dataset: Dataset, store: Box<dyn Store>) -> Self {
        Self {
            config,
            dataset,
            store,
        }
    }

    pub fn interval_model(&self) -> Result<IntervalModel> {
        Ok(IntervalModel::new(
            self.config.bucket_seconds,
            self.config.midnight_rule,
        )?)
    }

    fn stations(&self) -> Result<Vec<Station>> {
        let imported = self.store.stations(&self.dataset)?;
        if imported.skipped > 0 {
            warn!(skipped = imported.skipped, dataset = %self.dataset, "Skipped malformed station rows");
        }
        Ok(imported.records)
    }

    fn rentals(&self) -> Result<Vec<Rental>> {
        let imported = self.store.rentals(&self.dataset)?;
        if imported.skipped > 0 {
            warn!(skipped = imported.skipped, dataset = %self.dataset, "Skipped malformed rental rows");
        }
        Ok(imported.records)
    }
}

fn season(rentals: &[Rental], dataset: &Dataset) -> Result<SeasonBounds> {
    SeasonBounds::from_rentals(rentals)
        .ok_or_else(|| anyhow!("dataset {} has no rentals with timestamps", dataset))
}

/// Resolves and stores a route for every station pair of the dataset.
#[tracing::instrument(skip_all, fields(dataset = %ctx.dataset))]
pub async fn resolve_routes(
    ctx: &mut RunContext,
    oracle: Arc<dyn RoutingOracle>,
) -> Result<ResolveSummary> {
    let stations = ctx.stations()?;
    let pairs = station_pairs(&stations);
    let resolver = RouteResolver::new(oracle, &ctx.config);
    resolver
        .resolve_all(&pairs, ctx.store.as_mut(), &ctx.dataset, ctx.config.concurrency)
        .await
}

/// Rebuilds the average-day table from every rental of the season.
#[tracing::instrument(skip_all, fields(dataset = %ctx.dataset))]
pub fn build_average_day(ctx: &mut RunContext) -> Result<Vec<AverageBucket>> {
    let rentals = ctx.rentals()?;
    let season = season(&rentals, &ctx.dataset)?;
    let model = ctx.interval_model()?;

    let average_day = model.build(&rentals, &season);
    ctx.store.replace_average_day(&ctx.dataset, &average_day)?;
    Ok(average_day)
}

/// Scores every day against the stored average day and replaces the comparison table.
#[tracing::instrument(skip_all, fields(dataset = %ctx.dataset))]
pub fn compare_days(ctx: &mut RunContext) -> Result<DayComparison> {
    let baseline = ctx.store.average_day(&ctx.dataset)?;
    if baseline.is_empty() {
        bail!(
            "no average day stored for dataset {}; run average-day first",
            ctx.dataset
        );
    }
    let rentals = ctx.rentals()?;
    let season = season(&rentals, &ctx.dataset)?;
    let model = ctx.interval_model()?;

    let scorer = DayScorer::new(&model, &baseline, ctx.config.min_populated_buckets)?;
    let comparison = scorer.score(&rentals, &season);
    ctx.store.replace_day_comparisons(&ctx.dataset, &comparison.rows)?;

    match scorer.most_average(&comparison.profiles) {
        Some(day) => info!(day = %day.day, score = day.score, populated = day.populated_buckets, "Most average day"),
        None => warn!(
            min_populated_buckets = ctx.config.min_populated_buckets,
            "No day has enough populated buckets"
        ),
    }
    Ok(comparison)
}

/// Lowest-scoring qualifying day in the stored comparison table.
pub fn most_average_day(ctx: &RunContext) -> Result<Option<DayProfile>> {
    let rows = ctx.store.day_comparisons(&ctx.dataset)?;
    let profiles = profiles_from_rows(&rows);
    Ok(most_average(&profiles, ctx.config.min_populated_buckets).cloned())
}

/// Spread of day scores over a season.
pub fn score_summary(profiles: &[DayProfile]) -> Summary {
    let scores: Vec<f64> = profiles.iter().map(|p| p.score).collect();
    summarize(&scores)
}

/// Bar points for one day of the stored comparison table, in bucket order.
pub fn day_bars(ctx: &RunContext, day: NaiveDate) -> Result<Vec<BarPoint>> {
    let mut rows: Vec<DayBucketRow> = ctx
        .store
        .day_comparisons(&ctx.dataset)?
        .into_iter()
        .filter(|r| r.day == day)
        .collect();
    rows.sort_by_key(|r| TimeBucket::from_times(0, r.start_time, r.end_time).start);
    Ok(rows
        .iter()
        .map(|r| BarPoint {
            start: r.start_time,
            end: r.end_time,
            value: r.total as f64,
        })
        .collect())
}

/// Bar points for the average day.
pub fn average_bars(average_day: &[AverageBucket]) -> Vec<BarPoint> {
    average_day
        .iter()
        .map(|b| BarPoint {
            start: b.start_time,
            end: b.end_time,
            value: b.average,
        })
        .collect()
}

pub fn export(ctx: &RunContext, dir: &Path, window: &ExportWindow, gzip: bool) -> Result<ExportSummary> {
    Exporter::new(ctx.store.as_ref(), &ctx.dataset)
        .with_gzip(gzip)
        .run(dir, window)
}

pub fn dataset_stats(ctx: &RunContext) -> Result<DatasetStats> {
    let stations = ctx.store.stations(&ctx.dataset)?;
    let rentals = ctx.store.rentals(&ctx.dataset)?;
    Ok(DatasetStats::from_records(
        &ctx.dataset.to_string(),
        &stations.records,
        &rentals.records,
    )
    .with_skipped(stations.skipped + rentals.skipped))
}
