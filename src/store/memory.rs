use anyhow::Result;
use std::collections::HashMap;

use super::{Dataset, Imported, Store};
use crate::analyzers::types::{AverageBucket, DayBucketRow};
use crate::model::{Rental, Route, Station};

#[derive(Debug, Default, Clone)]
struct Tables {
    stations: Vec<Station>,
    rentals: Vec<Rental>,
    routes: Vec<Route>,
    average_day: Vec<AverageBucket>,
    day_comparisons: Vec<DayBucketRow>,
}

/// In-process [`Store`].
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: HashMap<Dataset, Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(dataset: &Dataset, stations: Vec<Station>, rentals: Vec<Rental>) -> Self {
        let mut store = Self::new();
        let tables = store.tables_mut(dataset);
        tables.stations = stations;
        tables.rentals = rentals;
        store
    }

    fn tables(&self, dataset: &Dataset) -> Option<&Tables> {
        self.tables.get(dataset)
    }

    fn tables_mut(&mut self, dataset: &Dataset) -> &mut Tables {
        self.tables.entry(dataset.clone()).or_default()
    }
}

impl Store for MemoryStore {
    fn stations(&self, dataset: &Dataset) -> Result<Imported<Station>> {
        Ok(Imported {
            records: self.tables(dataset).map(|t| t.stations.clone()).unwrap_or_default(),
            skipped: 0,
        })
    }

    fn rentals(&self, dataset: &Dataset) -> Result<Imported<Rental>> {
        Ok(Imported {
            records: self.tables(dataset).map(|t| t.rentals.clone()).unwrap_or_default(),
            skipped: 0,
        })
    }

    fn truncate_routes(&mut self, dataset: &Dataset) -> Result<()> {
        self.tables_mut(dataset).routes.clear();
        Ok(())
    }

    fn insert_route(&mut self, dataset: &Dataset, route: &Route) -> Result<()> {
        self.tables_mut(dataset).routes.push(route.clone());
        Ok(())
    }

    fn routes(&self, dataset: &Dataset) -> Result<Vec<Route>> {
        Ok(self.tables(dataset).map(|t| t.routes.clone()).unwrap_or_default())
    }

    fn replace_average_day(&mut self, dataset: &Dataset, buckets: &[AverageBucket]) -> Result<()> {
        self.tables_mut(dataset).average_day = buckets.to_vec();
        Ok(())
    }

    fn average_day(&self, dataset: &Dataset) -> Result<Vec<AverageBucket>> {
        Ok(self
            .tables(dataset)
            .map(|t| t.average_day.clone())
            .unwrap_or_default())
    }

    fn replace_day_comparisons(&mut self, dataset: &Dataset, rows: &[DayBucketRow]) -> Result<()> {
        self.tables_mut(dataset).day_comparisons = rows.to_vec();
        Ok(())
    }

    fn day_comparisons(&self, dataset: &Dataset) -> Result<Vec<DayBucketRow>> {
        Ok(self
            .tables(dataset)
            .map(|t| t.day_comparisons.clone())
            .unwrap_or_default())
    }
}
