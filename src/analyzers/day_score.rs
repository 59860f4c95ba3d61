//! Compares every day of the season with the average day.
//!
//! A day's score is the area between its bucket counts and the average-day
//! curve: Σ |count − average|. The "most average" day is the lowest score
//! among days with enough populated buckets; quiet days at the edges of the
//! season would otherwise win just by having few rides.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::analyzers::interval::{IntervalError, IntervalModel};
use crate::analyzers::types::{AverageBucket, DayBucketRow, DayProfile, SeasonBounds, TimeBucket};
use crate::model::{Rental, RideWindow};

pub struct DayScorer<'a> {
    model: &'a IntervalModel,
    baseline: &'a [AverageBucket],
    min_populated_buckets: usize,
}

/// Result of scoring a season: one profile per day plus the flattened table.
#[derive(Debug, Clone, PartialEq)]
pub struct DayComparison {
    pub profiles: Vec<DayProfile>,
    pub rows: Vec<DayBucketRow>,
}

impl<'a> DayScorer<'a> {
    pub fn new(
        model: &'a IntervalModel,
        baseline: &'a [AverageBucket],
        min_populated_buckets: usize,
    ) -> Result<Self, IntervalError> {
        model.check_baseline(baseline)?;
        Ok(Self {
            model,
            baseline,
            min_populated_buckets,
        })
    }

    /// Scores one day from its bucket counts.
    pub fn profile(&self, day: NaiveDate, counts: Vec<u64>) -> DayProfile {
        let differences = counts
            .iter()
            .zip(self.baseline)
            .map(|(count, avg)| (*count as f64 - avg.average).abs())
            .collect();
        DayProfile::new(day, counts, differences)
    }

    /// Scores every date in the season.
    ///
    /// A ride belongs to a date when it starts or ends on it, so a ride over
    /// midnight is counted on both days.
    #[tracing::instrument(skip_all, fields(rentals = rentals.len(), from = %season.min_date, to = %season.max_date))]
    pub fn score(&self, rentals: &[Rental], season: &SeasonBounds) -> DayComparison {
        let by_day = rides_by_day(rentals);

        let mut profiles = Vec::new();
        let mut rows = Vec::new();
        for day in season.days() {
            let rides = by_day.get(&day).map(Vec::as_slice).unwrap_or(&[]);
            let profile = self.profile(day, self.model.count(rides));
            debug!(day = %day, rides = rides.len(), score = profile.score, "Day compared");

            rows.extend(self.rows_for(&profile));
            profiles.push(profile);
        }

        info!(days = profiles.len(), rows = rows.len(), "Season compared");
        DayComparison { profiles, rows }
    }

    fn rows_for<'p>(&'p self, profile: &'p DayProfile) -> impl Iterator<Item = DayBucketRow> + 'p {
        self.model
            .buckets()
            .iter()
            .map(move |bucket| DayBucketRow {
                day: profile.day,
                start_time: bucket.start_time(),
                end_time: bucket.end_time(),
                total: profile.counts[bucket.index],
                difference: profile.differences[bucket.index],
            })
    }

    /// Lowest-scoring day with at least the minimum populated buckets.
    pub fn most_average<'p>(&self, profiles: &'p [DayProfile]) -> Option<&'p DayProfile> {
        most_average(profiles, self.min_populated_buckets)
    }
}

fn rides_by_day(rentals: &[Rental]) -> HashMap<NaiveDate, Vec<RideWindow>> {
    let mut by_day: HashMap<NaiveDate, Vec<RideWindow>> = HashMap::new();
    for rental in rentals {
        let (Some(window), Some(start), Some(end)) =
            (rental.window(), rental.start_date, rental.end_date)
        else {
            continue;
        };
        by_day.entry(start.date()).or_default().push(window);
        if end.date() != start.date() {
            by_day.entry(end.date()).or_default().push(window);
        }
    }
    by_day
}

/// Days ordered from most to least average; ties go to the earlier date.
pub fn rank(profiles: &[DayProfile]) -> Vec<&DayProfile> {
    let mut ranked: Vec<&DayProfile> = profiles.iter().collect();
    ranked.sort_by(|a, b| a.score.total_cmp(&b.score).then(a.day.cmp(&b.day)));
    ranked
}

pub fn most_average(profiles: &[DayProfile], min_populated_buckets: usize) -> Option<&DayProfile> {
    rank(profiles)
        .into_iter()
        .find(|p| p.populated_buckets >= min_populated_buckets)
}

/// Rebuilds day profiles from stored comparison rows, in date order.
pub fn profiles_from_rows(rows: &[DayBucketRow]) -> Vec<DayProfile> {
    let mut days: Vec<NaiveDate> = Vec::new();
    let mut grouped: HashMap<NaiveDate, Vec<&DayBucketRow>> = HashMap::new();
    for row in rows {
        grouped
            .entry(row.day)
            .or_insert_with(|| {
                days.push(row.day);
                Vec::new()
            })
            .push(row);
    }
    days.sort();

    days.into_iter()
        .map(|day| {
            let mut cells = grouped.remove(&day).unwrap_or_default();
            cells.sort_by_key(|r| TimeBucket::from_times(0, r.start_time, r.end_time).start);
            let counts = cells.iter().map(|r| r.total).collect();
            let differences = cells.iter().map(|r| r.difference).collect();
            DayProfile::new(day, counts, differences)
        })
        .collect()
}
