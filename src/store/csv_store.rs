use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use geo_types::{LineString, Point};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Dataset, Imported, Store};
use crate::analyzers::types::{AverageBucket, DayBucketRow};
use crate::model::{Rental, Route, Station, TransportProfile};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// [`Store`] backed by one CSV file per table under `dir`.
pub struct CsvStore {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct StationRow {
    terminal_id: String,
    #[serde(default)]
    common_name: String,
    #[serde(default)]
    station: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    install_date: String,
}

#[derive(Debug, Deserialize)]
struct RentalRow {
    rental_id: String,
    #[serde(default)]
    start_date: String,
    #[serde(default)]
    end_date: String,
    start_terminal: String,
    end_terminal: String,
    #[serde(default)]
    duration_seconds: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RouteRow {
    terminal_id_start: String,
    terminal_id_end: String,
    profile: TransportProfile,
    srid: u32,
    start_geom: String,
    end_geom: String,
    route_geom: String,
}

impl CsvStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("unable to create data directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn path(&self, dataset: &Dataset, table: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", dataset.table(table)))
    }

    fn truncate(&self, path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("unable to truncate {}", path.display()))?;
        }
        Ok(())
    }

    fn read_all<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(path)
            .with_context(|| format!("unable to open {}", path.display()))?;
        let mut rows = Vec::new();
        for result in rdr.deserialize() {
            let record: T = result.with_context(|| format!("bad row in {}", path.display()))?;
            rows.push(record);
        }
        Ok(rows)
    }

    /// Reads an input table, converting each row and counting the ones that fail.
    fn import<R, T, F>(&self, path: &Path, convert: F) -> Result<Imported<T>>
    where
        R: DeserializeOwned,
        F: Fn(R) -> Result<T>,
    {
        let mut rdr = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("unable to open {}", path.display()))?;

        let mut records = Vec::new();
        let mut skipped = 0;
        for (line, result) in rdr.deserialize::<R>().enumerate() {
            match result.map_err(anyhow::Error::from).and_then(&convert) {
                Ok(record) => records.push(record),
                Err(e) => {
                    debug!(path = %path.display(), row = line + 1, error = %e, "Skipping malformed row");
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            warn!(path = %path.display(), skipped, imported = records.len(), "Malformed rows skipped");
        }
        Ok(Imported { records, skipped })
    }

    fn replace_all<T: Serialize>(&self, path: &Path, rows: &[T]) -> Result<()> {
        self.truncate(path)?;
        let mut writer = WriterBuilder::new()
            .from_path(path)
            .with_context(|| format!("unable to create {}", path.display()))?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Appends a row to a CSV file, creating it with headers if it does not exist yet.
pub fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let file_exists = path.exists();
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("unable to open {}", path.display()))?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // header only on the first row
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;
    Ok(())
}

fn parse_timestamp(value: &str) -> Result<Option<NaiveDateTime>> {
    if value.is_empty() {
        return Ok(None);
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .map(Some)
        .ok_or_else(|| anyhow!("unrecognized timestamp '{}'", value))
}

fn parse_date(value: &str) -> Result<Option<NaiveDate>> {
    if value.is_empty() {
        return Ok(None);
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
        .or_else(|| parse_timestamp(value).ok().flatten().map(|t| t.date()))
        .map(Some)
        .ok_or_else(|| anyhow!("unrecognized date '{}'", value))
}

fn parse_duration(value: &str) -> Result<Option<i64>> {
    if value.is_empty() {
        return Ok(None);
    }
    if let Ok(seconds) = value.parse::<i64>() {
        return Ok(Some(seconds));
    }
    let seconds: f64 = value
        .parse()
        .with_context(|| format!("unrecognized duration '{}'", value))?;
    Ok(Some(seconds.round() as i64))
}

fn station_from_row(row: StationRow) -> Result<Station> {
    if row.terminal_id.is_empty() {
        return Err(anyhow!("station without terminal id"));
    }
    Ok(Station {
        terminal_id: row.terminal_id,
        common_name: row.common_name,
        station: row.station,
        lat: row.lat,
        lon: row.lon,
        install_date: parse_date(&row.install_date)?,
    })
}

fn rental_from_row(row: RentalRow) -> Result<Rental> {
    if row.rental_id.is_empty() {
        return Err(anyhow!("rental without id"));
    }
    Ok(Rental {
        rental_id: row.rental_id,
        start_date: parse_timestamp(&row.start_date)?,
        end_date: parse_timestamp(&row.end_date)?,
        start_terminal: row.start_terminal,
        end_terminal: row.end_terminal,
        duration_seconds: parse_duration(&row.duration_seconds)?,
    })
}

fn geometry_text(value: geojson::Value) -> Result<String> {
    Ok(serde_json::to_string(&geojson::Geometry::new(value))?)
}

fn geometry_value(text: &str) -> Result<geojson::Value> {
    let geometry: geojson::Geometry =
        serde_json::from_str(text).with_context(|| format!("invalid geometry '{}'", text))?;
    Ok(geometry.value)
}

impl RouteRow {
    fn from_route(route: &Route) -> Result<Self> {
        Ok(Self {
            terminal_id_start: route.terminal_id_start.clone(),
            terminal_id_end: route.terminal_id_end.clone(),
            profile: route.profile,
            srid: route.srid,
            start_geom: geometry_text(geojson::Value::from(&route.start_geom))?,
            end_geom: geometry_text(geojson::Value::from(&route.end_geom))?,
            route_geom: geometry_text(geojson::Value::from(&route.path))?,
        })
    }

    fn into_route(self) -> Result<Route> {
        let start_geom: Point<f64> = geometry_value(&self.start_geom)?.try_into()?;
        let end_geom: Point<f64> = geometry_value(&self.end_geom)?.try_into()?;
        let path: LineString<f64> = geometry_value(&self.route_geom)?.try_into()?;
        Ok(Route {
            terminal_id_start: self.terminal_id_start,
            terminal_id_end: self.terminal_id_end,
            profile: self.profile,
            start_geom,
            end_geom,
            path,
            srid: self.srid,
        })
    }
}

impl Store for CsvStore {
    fn stations(&self, dataset: &Dataset) -> Result<Imported<Station>> {
        self.import(&self.path(dataset, "stations"), station_from_row)
    }

    fn rentals(&self, dataset: &Dataset) -> Result<Imported<Rental>> {
        self.import(&self.path(dataset, "rentals"), rental_from_row)
    }

    fn truncate_routes(&mut self, dataset: &Dataset) -> Result<()> {
        self.truncate(&self.path(dataset, "routes"))
    }

    fn insert_route(&mut self, dataset: &Dataset, route: &Route) -> Result<()> {
        append_record(&self.path(dataset, "routes"), &RouteRow::from_route(route)?)
    }

    fn routes(&self, dataset: &Dataset) -> Result<Vec<Route>> {
        self.read_all::<RouteRow>(&self.path(dataset, "routes"))?
            .into_iter()
            .map(RouteRow::into_route)
            .collect()
    }

    fn replace_average_day(&mut self, dataset: &Dataset, buckets: &[AverageBucket]) -> Result<()> {
        self.replace_all(&self.path(dataset, "average_day"), buckets)
    }

    fn average_day(&self, dataset: &Dataset) -> Result<Vec<AverageBucket>> {
        self.read_all(&self.path(dataset, "average_day"))
    }

    fn replace_day_comparisons(&mut self, dataset: &Dataset, rows: &[DayBucketRow]) -> Result<()> {
        self.replace_all(&self.path(dataset, "average_all_days"), rows)
    }

    fn day_comparisons(&self, dataset: &Dataset) -> Result<Vec<DayBucketRow>> {
        self.read_all(&self.path(dataset, "average_all_days"))
    }
}
