use serde::Serialize;
use std::collections::HashSet;

use crate::analyzers::utility::summarize;
use crate::model::{Rental, Station};

#[derive(Debug, Default, Serialize)]
pub struct DatasetStats {
    pub dataset: String,
    pub stations: usize,
    pub rentals: usize,
    pub skipped_rows: usize,

    // distinct start/end station pairs of rentals whose stations are both known
    pub routes_taken: usize,
    pub round_trips: usize,

    // rental fields
    pub missing_timestamps: usize,
    pub midnight_crossings: usize,
    pub with_duration: usize,
    pub mean_duration_seconds: f64,
    pub stddev_duration_seconds: f64,
}

impl DatasetStats {
    pub fn from_records(dataset: &str, stations: &[Station], rentals: &[Rental]) -> Self {
        let mut s = DatasetStats {
            dataset: dataset.to_string(),
            stations: stations.len(),
            rentals: rentals.len(),
            ..Default::default()
        };

        let known: HashSet<&str> = stations.iter().map(|st| st.terminal_id.as_str()).collect();
        let mut taken: HashSet<(&str, &str)> = HashSet::new();
        let mut durations = Vec::new();

        for r in rentals {
            if known.contains(r.start_terminal.as_str()) && known.contains(r.end_terminal.as_str()) {
                taken.insert((r.start_terminal.as_str(), r.end_terminal.as_str()));
            }

            if r.start_terminal == r.end_terminal {
                s.round_trips += 1;
            }

            if r.start_date.is_none() || r.end_date.is_none() {
                s.missing_timestamps += 1;
            }

            if r.crosses_midnight() {
                s.midnight_crossings += 1;
            }

            if let Some(d) = r.duration_seconds {
                durations.push(d as f64);
            }
        }

        let summary = summarize(&durations);
        s.routes_taken = taken.len();
        s.with_duration = summary.count;
        s.mean_duration_seconds = summary.mean;
        s.stddev_duration_seconds = summary.stddev;
        s
    }

    pub fn with_skipped(mut self, skipped: usize) -> Self {
        self.skipped_rows = skipped;
        self
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn missing_timestamps_pct(&self) -> f64 {
        Self::pct(self.missing_timestamps, self.rentals)
    }

    pub fn midnight_crossings_pct(&self) -> f64 {
        Self::pct(self.midnight_crossings, self.rentals)
    }
}
