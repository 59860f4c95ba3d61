//! Run configuration.
//!
//! Stored as a JSON object on disk; every field is optional:
//! ```json
//! {
//!   "data_dir": "data",
//!   "bucket_seconds": 300,
//!   "routing": { "router": "routino-2.2/web/bin/router", "mode": "shortest" }
//! }
//! ```

use anyhow::{Context, Result, bail};
use geo_types::Point;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analyzers::interval::{MidnightRule, SECONDS_PER_DAY};
use crate::model::{RouteMode, TransportProfile};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the station, rental and derived tables.
    pub data_dir: PathBuf,
    /// Where `export` writes its JSON/JSONP files.
    pub export_dir: PathBuf,
    pub srid: u32,
    pub bucket_seconds: u32,
    pub min_populated_buckets: usize,
    pub midnight_rule: MidnightRule,
    /// Station pairs resolved at once.
    pub concurrency: usize,
    pub routing: RoutingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            export_dir: PathBuf::from("visualizations/data"),
            srid: 4326,
            bucket_seconds: 5 * 60,
            min_populated_buckets: 200,
            midnight_rule: MidnightRule::default(),
            concurrency: 1,
            routing: RoutingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub router: PathBuf,
    /// Routino data directory (`--dir`).
    pub routino_dir: PathBuf,
    pub profiles: PathBuf,
    pub translations: PathBuf,
    /// Parent of the per-attempt scratch directories.
    pub work_dir: PathBuf,
    pub mode: RouteMode,
    pub transport_priority: Vec<TransportProfile>,
    /// Waypoint used for round trips back to the starting station.
    pub popular_location: Location,
    pub success_marker: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            router: PathBuf::from("routino-2.2/web/bin/router"),
            routino_dir: PathBuf::from("routino-2.2/web/data"),
            profiles: PathBuf::from("routino-conf/profiles.xml"),
            translations: PathBuf::from("routino-2.2/web/data/translations.xml"),
            work_dir: std::env::temp_dir().join("bikeshare_routes"),
            mode: RouteMode::Shortest,
            transport_priority: TransportProfile::DEFAULT_PRIORITY.to_vec(),
            // downtown Minneapolis library
            popular_location: Location {
                lat: 44.98064594145076,
                lon: -93.27032089233398,
            },
            success_marker: "Routed OK".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

impl Config {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket_seconds == 0 || SECONDS_PER_DAY % self.bucket_seconds != 0 {
            bail!(
                "bucket_seconds must evenly divide {}, got {}",
                SECONDS_PER_DAY,
                self.bucket_seconds
            );
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.routing.transport_priority.is_empty() {
            bail!("routing.transport_priority must name at least one profile");
        }
        Ok(())
    }
}
