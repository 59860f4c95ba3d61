//! Average-day model: how many rides are on the road, per time bucket, on a
//! typical day of the season.

use serde::Deserialize;
use tracing::{debug, info};

use crate::analyzers::types::{AverageBucket, SeasonBounds, TimeBucket};
use crate::model::{Rental, RideWindow};

pub const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IntervalError {
    #[error("bucket width must evenly divide 86400 seconds, got {0}")]
    InvalidWidth(u32),
    #[error("average day has {found} buckets, the model expects {expected}")]
    BaselineMismatch { expected: usize, found: usize },
}

/// How a ride that runs over midnight is matched against a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidnightRule {
    /// The ride occupies `[start, 24:00)` and `[00:00, end)`.
    #[default]
    Overlap,
    /// Historical table formula: `start < bucket_end AND end < bucket_start`.
    /// Only counts the evening part of the ride, and only after `end`.
    Legacy,
}

impl MidnightRule {
    /// Whether `ride` is on the road at some point in `bucket`.
    pub fn is_active(&self, ride: &RideWindow, bucket: &TimeBucket) -> bool {
        if !ride.crosses_midnight() {
            return ride.start < bucket.end && ride.end > bucket.start;
        }
        match self {
            MidnightRule::Overlap => ride.start < bucket.end || ride.end > bucket.start,
            MidnightRule::Legacy => ride.start < bucket.end && ride.end < bucket.start,
        }
    }
}

/// Fixed-width tiling of the day plus the activity rule used for counting.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalModel {
    width: u32,
    rule: MidnightRule,
    buckets: Vec<TimeBucket>,
}

impl IntervalModel {
    pub fn new(width: u32, rule: MidnightRule) -> Result<Self, IntervalError> {
        if width == 0 || SECONDS_PER_DAY % width != 0 {
            return Err(IntervalError::InvalidWidth(width));
        }
        let buckets = (0..SECONDS_PER_DAY / width)
            .map(|i| TimeBucket {
                index: i as usize,
                start: i * width,
                end: (i + 1) * width,
            })
            .collect();
        Ok(Self {
            width,
            rule,
            buckets,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn rule(&self) -> MidnightRule {
        self.rule
    }

    pub fn buckets(&self) -> &[TimeBucket] {
        &self.buckets
    }

    /// Adds one to `counts[i]` for every bucket `i` the ride is active in.
    pub fn accumulate(&self, ride: &RideWindow, counts: &mut [u64]) {
        for bucket in &self.buckets {
            if self.rule.is_active(ride, bucket) {
                counts[bucket.index] += 1;
            }
        }
    }

    /// Active-ride count per bucket over all `rides`.
    pub fn count<'a>(&self, rides: impl IntoIterator<Item = &'a RideWindow>) -> Vec<u64> {
        let mut counts = vec![0u64; self.buckets.len()];
        for ride in rides {
            self.accumulate(ride, &mut counts);
        }
        counts
    }

    /// Builds the average day from every rental of the season.
    ///
    /// Rentals without both timestamps, or starting and ending at the same
    /// time of day, are left out.
    #[tracing::instrument(skip_all, fields(rentals = rentals.len(), width = self.width))]
    pub fn build(&self, rentals: &[Rental], season: &SeasonBounds) -> Vec<AverageBucket> {
        let rides: Vec<RideWindow> = rentals.iter().filter_map(Rental::window).collect();
        debug!(
            usable = rides.len(),
            excluded = rentals.len() - rides.len(),
            "Ride windows collected"
        );

        let counts = self.count(&rides);
        let divisor = season.divisor();
        let average_day: Vec<AverageBucket> = self
            .buckets
            .iter()
            .zip(counts)
            .map(|(bucket, total)| AverageBucket {
                start_time: bucket.start_time(),
                end_time: bucket.end_time(),
                total,
                average: total as f64 / divisor,
            })
            .collect();

        info!(
            buckets = average_day.len(),
            season_days = season.season_days(),
            "Average day built"
        );
        average_day
    }

    /// Checks a stored average day against this model's tiling.
    pub fn check_baseline(&self, baseline: &[AverageBucket]) -> Result<(), IntervalError> {
        if baseline.len() != self.buckets.len() {
            return Err(IntervalError::BaselineMismatch {
                expected: self.buckets.len(),
                found: baseline.len(),
            });
        }
        Ok(())
    }
}
