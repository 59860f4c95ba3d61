//! Persistence for stations, rentals and the derived tables.
//!
//! [`Store`] is the seam the pipeline talks to. [`CsvStore`] keeps every table
//! as a CSV file in one directory; [`MemoryStore`] keeps them in process.

mod csv_store;
mod memory;

pub use csv_store::{CsvStore, append_record};
pub use memory::MemoryStore;

use anyhow::Result;
use std::fmt;

use crate::analyzers::types::{AverageBucket, DayBucketRow};
use crate::model::{Rental, Route, Station};

/// Selects the per-dataset variant of each table (`routes` → `routes_2011`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Dataset(Option<String>);

impl Dataset {
    pub fn new(name: Option<String>) -> Self {
        Self(name.filter(|n| !n.trim().is_empty()))
    }

    pub fn named(name: &str) -> Self {
        Self::new(Some(name.to_string()))
    }

    pub fn table(&self, base: &str) -> String {
        match &self.0 {
            Some(name) => format!("{}_{}", base, name),
            None => base.to_string(),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_deref().unwrap_or("default"))
    }
}

/// Records read from an input table, with the count of rows that could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Imported<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

pub trait Store {
    fn stations(&self, dataset: &Dataset) -> Result<Imported<Station>>;
    fn rentals(&self, dataset: &Dataset) -> Result<Imported<Rental>>;

    fn truncate_routes(&mut self, dataset: &Dataset) -> Result<()>;
    fn insert_route(&mut self, dataset: &Dataset, route: &Route) -> Result<()>;
    fn routes(&self, dataset: &Dataset) -> Result<Vec<Route>>;

    /// Replaces the whole average-day table.
    fn replace_average_day(&mut self, dataset: &Dataset, buckets: &[AverageBucket]) -> Result<()>;
    fn average_day(&self, dataset: &Dataset) -> Result<Vec<AverageBucket>>;

    /// Replaces the whole day-comparison table.
    fn replace_day_comparisons(&mut self, dataset: &Dataset, rows: &[DayBucketRow]) -> Result<()>;
    fn day_comparisons(&self, dataset: &Dataset) -> Result<Vec<DayBucketRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_table_names() {
        assert_eq!(Dataset::default().table("routes"), "routes");
        assert_eq!(Dataset::named("2011").table("routes"), "routes_2011");
        assert_eq!(Dataset::new(Some("  ".into())).table("rentals"), "rentals");
        assert_eq!(Dataset::named("2012").to_string(), "2012");
    }
}
