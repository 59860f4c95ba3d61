//! Data types shared by the average-day and day-comparison passes.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::model::Rental;

/// First and last calendar day with rental activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonBounds {
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
}

impl SeasonBounds {
    /// Earliest start date to latest end date; `None` without any timestamps.
    pub fn from_rentals(rentals: &[Rental]) -> Option<Self> {
        let min_date = rentals.iter().filter_map(|r| r.start_date).min()?.date();
        let max_date = rentals.iter().filter_map(|r| r.end_date).max()?.date();
        Some(Self {
            min_date,
            max_date: max_date.max(min_date),
        })
    }

    /// Whole days between the bounds, the averaging denominator.
    pub fn season_days(&self) -> i64 {
        (self.max_date - self.min_date).num_days()
    }

    /// Denominator used for averages; a single-day season counts as one day.
    pub fn divisor(&self) -> f64 {
        self.season_days().max(1) as f64
    }

    /// Every date from `min_date` through `max_date`.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.min_date
            .iter_days()
            .take_while(move |d| *d <= self.max_date)
    }
}

/// Half-open `[start, end)` slice of the day, in seconds since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBucket {
    pub index: usize,
    pub start: u32,
    pub end: u32,
}

impl TimeBucket {
    pub fn start_time(&self) -> NaiveTime {
        time_of_day(self.start)
    }

    /// End as a time of day; the last bucket's 24:00:00 wraps to 00:00:00.
    pub fn end_time(&self) -> NaiveTime {
        time_of_day(self.end)
    }

    /// Rebuilds bounds from stored times, reading an end of 00:00:00 as end of day.
    pub fn from_times(index: usize, start: NaiveTime, end: NaiveTime) -> Self {
        use chrono::Timelike;
        let start = start.num_seconds_from_midnight();
        let mut end = end.num_seconds_from_midnight();
        if end <= start {
            end = crate::analyzers::interval::SECONDS_PER_DAY;
        }
        Self { index, start, end }
    }
}

fn time_of_day(seconds: u32) -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt(seconds % 86_400, 0).unwrap_or(NaiveTime::MIN)
}

/// Season-wide total and per-day average for one bucket (`average_day` row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageBucket {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub total: u64,
    pub average: f64,
}

/// One day × bucket cell of the comparison table (`average_all_days` row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayBucketRow {
    pub day: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub total: u64,
    pub difference: f64,
}

/// A single day compared against the average day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayProfile {
    pub day: NaiveDate,
    pub counts: Vec<u64>,
    pub differences: Vec<f64>,
    pub score: f64,
    pub populated_buckets: usize,
}

impl DayProfile {
    pub fn new(day: NaiveDate, counts: Vec<u64>, differences: Vec<f64>) -> Self {
        let score = differences.iter().sum();
        let populated_buckets = counts.iter().filter(|c| **c > 0).count();
        Self {
            day,
            counts,
            differences,
            score,
            populated_buckets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rental(start: &str, end: &str) -> Rental {
        let parse = |s: &str| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok();
        Rental {
            rental_id: "r".into(),
            start_date: parse(start),
            end_date: parse(end),
            start_terminal: "A".into(),
            end_terminal: "B".into(),
            duration_seconds: None,
        }
    }

    #[test]
    fn test_season_bounds_from_rentals() {
        let rentals = vec![
            rental("2011-06-10 08:00:00", "2011-06-10 08:30:00"),
            rental("2011-06-01 09:00:00", "2011-06-01 09:20:00"),
            rental("2011-06-20 23:50:00", "2011-06-21 00:10:00"),
            rental("", ""),
        ];
        let season = SeasonBounds::from_rentals(&rentals).unwrap();
        assert_eq!(season.min_date, NaiveDate::from_ymd_opt(2011, 6, 1).unwrap());
        assert_eq!(season.max_date, NaiveDate::from_ymd_opt(2011, 6, 21).unwrap());
        assert_eq!(season.season_days(), 20);
        assert_eq!(season.days().count(), 21);
    }

    #[test]
    fn test_season_bounds_empty() {
        assert!(SeasonBounds::from_rentals(&[]).is_none());
        assert!(SeasonBounds::from_rentals(&[rental("", "")]).is_none());
    }

    #[test]
    fn test_single_day_season_divides_by_one() {
        let season =
            SeasonBounds::from_rentals(&[rental("2011-06-01 09:00:00", "2011-06-01 09:20:00")])
                .unwrap();
        assert_eq!(season.season_days(), 0);
        assert_eq!(season.divisor(), 1.0);
    }

    #[test]
    fn test_last_bucket_end_wraps_and_reads_back() {
        let bucket = TimeBucket {
            index: 287,
            start: 86_100,
            end: 86_400,
        };
        assert_eq!(bucket.end_time(), NaiveTime::MIN);
        assert_eq!(
            TimeBucket::from_times(287, bucket.start_time(), bucket.end_time()),
            bucket
        );
    }

    #[test]
    fn test_day_profile_score_and_population() {
        let day = NaiveDate::from_ymd_opt(2011, 6, 1).unwrap();
        let profile = DayProfile::new(day, vec![0, 2, 3], vec![0.5, 1.0, 0.25]);
        assert_eq!(profile.score, 1.75);
        assert_eq!(profile.populated_buckets, 2);
    }
}
