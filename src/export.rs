//! JSON/JSONP exports for the visualization front end.
//!
//! Three payloads are written for a time window: the rentals overlapping it,
//! the routes those rentals rode, and the average-day density series.

use anyhow::{Result, bail};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use crate::analyzers::types::AverageBucket;
use crate::model::{Rental, Route, route_key};
use crate::output::{ExportFiles, write_json_pair};
use crate::store::{Dataset, Store};

pub const RENTALS: &str = "rentals";
pub const ROUTES: &str = "routes";
pub const DENSITY_AVERAGE: &str = "density_average";

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ExportWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if end < start {
            bail!("export window ends ({}) before it starts ({})", end, start);
        }
        Ok(Self { start, end })
    }

    /// Rentals overlapping the window; rentals missing a timestamp never match.
    pub fn contains(&self, rental: &Rental) -> bool {
        match (rental.start_date, rental.end_date) {
            (Some(s), Some(e)) => s <= self.end && e >= self.start,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RentalExport {
    pub s: String,
    pub e: String,
    pub st: String,
    pub et: String,
    pub d: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteExport {
    pub r: geojson::Geometry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub rentals: usize,
    pub routes: usize,
    pub missing_routes: usize,
    pub density_points: usize,
    pub files: Vec<ExportFiles>,
}

pub fn rental_payload(rentals: &[&Rental]) -> BTreeMap<String, RentalExport> {
    rentals
        .iter()
        .filter_map(|r| {
            let (start, end) = (r.start_date?, r.end_date?);
            Some((
                r.rental_id.clone(),
                RentalExport {
                    s: start.format(ISO_FORMAT).to_string(),
                    e: end.format(ISO_FORMAT).to_string(),
                    st: r.start_terminal.clone(),
                    et: r.end_terminal.clone(),
                    d: r.duration_seconds.map(|d| d.to_string()),
                },
            ))
        })
        .collect()
}

/// Routes ridden by `rentals`, keyed `"start-end"` in the rental's direction.
///
/// Returns the payload and the number of distinct pairs with no stored route.
pub fn route_payload(rentals: &[&Rental], routes: &[Route]) -> (BTreeMap<String, RouteExport>, usize) {
    let mut by_pair: HashMap<(&str, &str), &Route> = HashMap::new();
    for route in routes {
        let (start, end) = (route.terminal_id_start.as_str(), route.terminal_id_end.as_str());
        by_pair.insert((start, end), route);
        by_pair.entry((end, start)).or_insert(route);
    }

    let mut payload = BTreeMap::new();
    let mut missing = HashSet::new();
    for rental in rentals {
        let key = route_key(&rental.start_terminal, &rental.end_terminal);
        if payload.contains_key(&key) || missing.contains(&key) {
            continue;
        }
        match by_pair.get(&(rental.start_terminal.as_str(), rental.end_terminal.as_str())) {
            Some(route) => {
                let path = route.path_from(&rental.start_terminal);
                let r = geojson::Geometry::new(geojson::Value::from(&path));
                payload.insert(key, RouteExport { r });
            }
            None => {
                missing.insert(key);
            }
        }
    }
    (payload, missing.len())
}

/// Average-day series as `[epoch_millis, average]` points on the window's first day.
pub fn density_payload(average_day: &[AverageBucket], window: &ExportWindow) -> Vec<(i64, f64)> {
    let day = window.start.date();
    average_day
        .iter()
        .map(|b| (day.and_time(b.start_time).and_utc().timestamp_millis(), b.average))
        .collect()
}

pub struct Exporter<'a> {
    store: &'a dyn Store,
    dataset: &'a Dataset,
    gzip: bool,
}

impl<'a> Exporter<'a> {
    pub fn new(store: &'a dyn Store, dataset: &'a Dataset) -> Self {
        Self {
            store,
            dataset,
            gzip: false,
        }
    }

    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    #[tracing::instrument(skip(self, dir), fields(dataset = %self.dataset, dir = %dir.display(), start = %window.start, end = %window.end))]
    pub fn run(&self, dir: &Path, window: &ExportWindow) -> Result<ExportSummary> {
        let rentals = self.store.rentals(self.dataset)?.records;
        let selected: Vec<&Rental> = rentals.iter().filter(|r| window.contains(r)).collect();
        info!(selected = selected.len(), total = rentals.len(), "Rentals in window");

        let routes = self.store.routes(self.dataset)?;
        let (route_map, missing_routes) = route_payload(&selected, &routes);
        if missing_routes > 0 {
            warn!(missing_routes, "Rented pairs without a stored route");
        }

        let average_day = self.store.average_day(self.dataset)?;
        let density = density_payload(&average_day, window);

        let rental_map = rental_payload(&selected);
        let files = vec![
            write_json_pair(dir, RENTALS, &rental_map, self.gzip)?,
            write_json_pair(dir, ROUTES, &route_map, self.gzip)?,
            write_json_pair(dir, DENSITY_AVERAGE, &density, self.gzip)?,
        ];

        let summary = ExportSummary {
            rentals: rental_map.len(),
            routes: route_map.len(),
            missing_routes,
            density_points: density.len(),
            files,
        };
        info!(
            rentals = summary.rentals,
            routes = summary.routes,
            density_points = summary.density_points,
            "Export complete"
        );
        Ok(summary)
    }
}
