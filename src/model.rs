//! Record types for stations, rentals and the routes derived from them.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use geo_types::{LineString, Point};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A docking station, keyed by its terminal id.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub terminal_id: String,
    pub common_name: String,
    pub station: String,
    pub lat: f64,
    pub lon: f64,
    pub install_date: Option<NaiveDate>,
}

impl Station {
    pub fn new(terminal_id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            terminal_id: terminal_id.into(),
            common_name: String::new(),
            station: String::new(),
            lat,
            lon,
            install_date: None,
        }
    }

    /// Location as an x=lon, y=lat point.
    pub fn location(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// One bike rental (trip) between two terminals.
#[derive(Debug, Clone, PartialEq)]
pub struct Rental {
    pub rental_id: String,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub start_terminal: String,
    pub end_terminal: String,
    pub duration_seconds: Option<i64>,
}

impl Rental {
    /// Time-of-day window of the ride, or `None` when a timestamp is missing
    /// or start and end share the same time of day.
    pub fn window(&self) -> Option<RideWindow> {
        let start = self.start_date?;
        let end = self.end_date?;
        RideWindow::new(start.num_seconds_from_midnight(), end.num_seconds_from_midnight())
    }

    pub fn crosses_midnight(&self) -> bool {
        self.window().is_some_and(|w| w.crosses_midnight())
    }
}

/// Start and end of a ride as seconds since midnight.
///
/// `start > end` marks a ride that runs over midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RideWindow {
    pub start: u32,
    pub end: u32,
}

impl RideWindow {
    pub fn new(start: u32, end: u32) -> Option<Self> {
        if start == end {
            None
        } else {
            Some(Self { start, end })
        }
    }

    pub fn crosses_midnight(&self) -> bool {
        self.start > self.end
    }
}

/// Unordered pair of stations, the unit a route is resolved for.
#[derive(Debug, Clone, PartialEq)]
pub struct StationPair {
    pub start: String,
    pub end: String,
    pub start_location: Point<f64>,
    pub end_location: Point<f64>,
}

impl StationPair {
    pub fn from_stations(start: &Station, end: &Station) -> Self {
        Self {
            start: start.terminal_id.clone(),
            end: end.terminal_id.clone(),
            start_location: start.location(),
            end_location: end.location(),
        }
    }

    /// `"start-end"` key used in logs and exports.
    pub fn key(&self) -> String {
        route_key(&self.start, &self.end)
    }

    /// Round trip from a station back to itself.
    pub fn is_circular(&self) -> bool {
        self.start == self.end
    }
}

pub fn route_key(start: &str, end: &str) -> String {
    format!("{}-{}", start, end)
}

/// Named mode of travel understood by the routing oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportProfile {
    Bicycle,
    /// Bicycle without one-way or turn restrictions.
    SuperBicycle,
    Foot,
    Moped,
    Motorbike,
    Motorcar,
}

impl TransportProfile {
    pub const DEFAULT_PRIORITY: [TransportProfile; 6] = [
        TransportProfile::Bicycle,
        TransportProfile::SuperBicycle,
        TransportProfile::Foot,
        TransportProfile::Moped,
        TransportProfile::Motorbike,
        TransportProfile::Motorcar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProfile::Bicycle => "bicycle",
            TransportProfile::SuperBicycle => "super_bicycle",
            TransportProfile::Foot => "foot",
            TransportProfile::Moped => "moped",
            TransportProfile::Motorbike => "motorbike",
            TransportProfile::Motorcar => "motorcar",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::DEFAULT_PRIORITY
            .into_iter()
            .find(|p| p.as_str() == value)
    }
}

impl fmt::Display for TransportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route optimization mode passed to the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    #[default]
    Shortest,
    Quickest,
}

impl RouteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMode::Shortest => "shortest",
            RouteMode::Quickest => "quickest",
        }
    }
}

impl fmt::Display for RouteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved path between the two stations of a pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub terminal_id_start: String,
    pub terminal_id_end: String,
    pub profile: TransportProfile,
    pub start_geom: Point<f64>,
    pub end_geom: Point<f64>,
    pub path: LineString<f64>,
    pub srid: u32,
}

impl Route {
    pub fn key(&self) -> String {
        route_key(&self.terminal_id_start, &self.terminal_id_end)
    }

    /// Whether this route serves a rental from `start` to `end`, in either direction.
    pub fn connects(&self, start: &str, end: &str) -> bool {
        (self.terminal_id_start == start && self.terminal_id_end == end)
            || (self.terminal_id_start == end && self.terminal_id_end == start)
    }

    /// Path oriented from `start` towards the other terminal.
    pub fn path_from(&self, start: &str) -> LineString<f64> {
        if self.terminal_id_start == start {
            self.path.clone()
        } else {
            let mut coords = self.path.0.clone();
            coords.reverse();
            LineString::new(coords)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use geo_types::coord;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2011, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn rental(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Rental {
        Rental {
            rental_id: "1".into(),
            start_date: start,
            end_date: end,
            start_terminal: "30000".into(),
            end_terminal: "30001".into(),
            duration_seconds: None,
        }
    }

    #[test]
    fn test_window_excludes_missing_and_zero_length() {
        assert!(rental(None, Some(at(1, 0))).window().is_none());
        assert!(rental(Some(at(1, 0)), None).window().is_none());
        assert!(rental(Some(at(1, 0)), Some(at(1, 0))).window().is_none());
    }

    #[test]
    fn test_window_detects_midnight_crossing() {
        let r = rental(Some(at(23, 50)), Some(at(0, 10)));
        assert!(r.crosses_midnight());
        assert_eq!(r.window(), Some(RideWindow { start: 85800, end: 600 }));
        assert!(!rental(Some(at(9, 0)), Some(at(9, 30))).crosses_midnight());
    }

    #[test]
    fn test_profile_names_round_trip() {
        for p in TransportProfile::DEFAULT_PRIORITY {
            assert_eq!(TransportProfile::parse(p.as_str()), Some(p));
        }
        assert_eq!(TransportProfile::parse("hovercraft"), None);
    }

    #[test]
    fn test_path_from_reverses_for_opposite_direction() {
        let route = Route {
            terminal_id_start: "A".into(),
            terminal_id_end: "B".into(),
            profile: TransportProfile::Bicycle,
            start_geom: Point::new(0.0, 0.0),
            end_geom: Point::new(1.0, 1.0),
            path: LineString::new(vec![coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }]),
            srid: 4326,
        };
        assert!(route.connects("B", "A"));
        assert!(!route.connects("A", "C"));
        assert_eq!(route.path_from("A"), route.path);
        assert_eq!(route.path_from("B").0[0], coord! { x: 1.0, y: 1.0 });
    }
}
