//! Output formatting and persistence for exports and reports.
//!
//! Supports pretty-printing, JSON/JSONP export files and text bar charts.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fmt::Debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty<T: Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Files written for one exported payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFiles {
    pub json: PathBuf,
    pub jsonp: PathBuf,
    pub gzip: Option<PathBuf>,
}

/// Wraps a serialized payload as `callback_<name>(<payload>)`.
pub fn jsonp(name: &str, payload: &str) -> String {
    format!("callback_{}({})\n", name, payload)
}

/// Writes `<name>.json` and `<name>.jsonp` into `dir`, plus `<name>.json.gz`
/// when `gzip` is set.
///
/// Payloads are pretty-printed; maps should be `BTreeMap`s so keys come out sorted.
pub fn write_json_pair<T: Serialize>(
    dir: &Path,
    name: &str,
    payload: &T,
    gzip: bool,
) -> Result<ExportFiles> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("unable to create {}", dir.display()))?;
    let body = serde_json::to_string_pretty(payload)?;

    let json = dir.join(format!("{}.json", name));
    std::fs::write(&json, format!("{}\n", body))
        .with_context(|| format!("unable to write {}", json.display()))?;

    let jsonp_path = dir.join(format!("{}.jsonp", name));
    std::fs::write(&jsonp_path, jsonp(name, &body))
        .with_context(|| format!("unable to write {}", jsonp_path.display()))?;

    let gzip = if gzip {
        let path = dir.join(format!("{}.json.gz", name));
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body.as_bytes())?;
        encoder.write_all(b"\n")?;
        std::fs::write(&path, encoder.finish()?)
            .with_context(|| format!("unable to write {}", path.display()))?;
        Some(path)
    } else {
        None
    };

    debug!(name, bytes = body.len(), gzip = gzip.is_some(), "Export written");
    Ok(ExportFiles {
        json,
        jsonp: jsonp_path,
        gzip,
    })
}

/// One labelled value of a bucket series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarPoint {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub value: f64,
}

/// Renders every `stagger`-th point as `HH:MM:SS - HH:MM:SS: ....`, one dot
/// per whole unit of its value.
pub fn render_bars(points: &[BarPoint], stagger: usize) -> Vec<String> {
    points
        .iter()
        .step_by(stagger.max(1))
        .map(|p| {
            let dots = if p.value.is_finite() && p.value > 0.0 {
                p.value.floor() as usize
            } else {
                0
            };
            format!(
                "{} - {}: {}",
                p.start.format("%H:%M:%S"),
                p.end.format("%H:%M:%S"),
                ".".repeat(dots)
            )
        })
        .collect()
}

/// Logs the bar rendering of `points`.
pub fn log_bars(title: &str, points: &[BarPoint], stagger: usize) {
    info!("{}", title);
    for line in render_bars(points, stagger) {
        info!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::collections::BTreeMap;
    use std::env;
    use std::fs;
    use std::io::Read;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir); // clean up any prior run
        dir
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&vec![1, 2, 3]);
    }

    #[test]
    fn test_print_json_does_not_panic() {
        let mut payload = BTreeMap::new();
        payload.insert("a", 1);
        print_json(&payload).unwrap();
    }

    #[test]
    fn test_jsonp_wrapper() {
        assert_eq!(jsonp("callback", "[]"), "callback_callback([])\n");
        assert_eq!(jsonp("routes", "{}"), "callback_routes({})\n");
    }

    #[test]
    fn test_write_json_pair_payloads_match() {
        let dir = temp_dir("bikeshare_routes_test_pair");
        let mut payload = BTreeMap::new();
        payload.insert("b", vec![2]);
        payload.insert("a", vec![1]);

        let files = write_json_pair(&dir, "rentals", &payload, false).unwrap();
        assert!(files.gzip.is_none());

        let json = fs::read_to_string(&files.json).unwrap();
        let jsonp = fs::read_to_string(&files.jsonp).unwrap();
        assert!(json.ends_with('\n'));
        assert!(json.find("\"a\"").unwrap() < json.find("\"b\"").unwrap());

        let inner = jsonp
            .strip_prefix("callback_rentals(")
            .and_then(|s| s.strip_suffix(")\n"))
            .unwrap();
        assert_eq!(inner, json.trim_end());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_json_pair_gzip() {
        let dir = temp_dir("bikeshare_routes_test_gzip");
        let files = write_json_pair(&dir, "density_average", &vec![[1.0, 2.5]], true).unwrap();

        let compressed = fs::read(files.gzip.unwrap()).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, fs::read_to_string(&files.json).unwrap());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_render_bars_staggered() {
        let points = vec![
            BarPoint { start: at(0, 0), end: at(0, 5), value: 3.7 },
            BarPoint { start: at(0, 5), end: at(0, 10), value: 9.0 },
            BarPoint { start: at(0, 10), end: at(0, 15), value: 0.4 },
        ];
        let lines = render_bars(&points, 2);
        assert_eq!(lines, vec!["00:00:00 - 00:05:00: ...", "00:10:00 - 00:15:00: "]);
        assert_eq!(render_bars(&points, 0).len(), 3);
    }
}
