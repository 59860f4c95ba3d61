//! GPX track parser for router output.

use geo_types::{Coord, LineString};
use roxmltree::Document;
use tracing::debug;

use crate::routing::RoutingError;

/// Points read from a GPX document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTrack {
    pub path: LineString<f64>,
    /// `trkpt` elements skipped for a missing or unreadable lat/lon.
    pub skipped: usize,
}

/// Extracts every `trkpt` of a GPX document, in document order.
///
/// # Errors
///
/// Returns [`RoutingError::Track`] if the text is not well-formed XML.
pub fn parse_track(xml: &str) -> Result<ParsedTrack, RoutingError> {
    let doc = Document::parse(xml).map_err(|e| RoutingError::Track(e.to_string()))?;

    let mut coords = Vec::new();
    let mut skipped = 0;
    for node in doc.descendants().filter(|n| n.has_tag_name("trkpt")) {
        let lat = node.attribute("lat").and_then(|v| v.trim().parse::<f64>().ok());
        let lon = node.attribute("lon").and_then(|v| v.trim().parse::<f64>().ok());
        match (lat, lon) {
            (Some(y), Some(x)) => coords.push(Coord { x, y }),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(skipped, "Track points missing lat/lon");
    }

    Ok(ParsedTrack {
        path: LineString::new(coords),
        skipped,
    })
}
