//! Station pair enumeration.
//!
//! The station network is treated as a complete graph: every station may be
//! ridden to every other station (and back to itself). Routes are direction
//! independent, so only one of `A-B` / `B-A` is kept.

use std::collections::HashSet;
use tracing::info;

use crate::model::{Station, StationPair};

/// Builds the distinct unordered station pairs, self-pairs included.
///
/// Pairs come out in first-seen order of the outer × inner iteration, so the
/// same station list always yields the same sequence.
pub fn station_pairs(stations: &[Station]) -> Vec<StationPair> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut pairs = Vec::new();

    for outer in stations {
        for inner in stations {
            let forward = (outer.terminal_id.as_str(), inner.terminal_id.as_str());
            let backward = (inner.terminal_id.as_str(), outer.terminal_id.as_str());
            if seen.contains(&forward) || seen.contains(&backward) {
                continue;
            }
            seen.insert(forward);
            pairs.push(StationPair::from_stations(outer, inner));
        }
    }

    info!(
        stations = stations.len(),
        pairs = pairs.len(),
        "Station combinations built"
    );
    pairs
}

/// N(N+1)/2: the pair count expected for `n` distinct stations.
pub fn expected_pair_count(n: usize) -> usize {
    n * (n + 1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stations(ids: &[&str]) -> Vec<Station> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Station::new(*id, 44.9 + i as f64 * 0.01, -93.2 - i as f64 * 0.01))
            .collect()
    }

    #[test]
    fn test_two_stations_give_three_pairs() {
        let pairs = station_pairs(&stations(&["A", "B"]));
        let keys: Vec<String> = pairs.iter().map(StationPair::key).collect();
        assert_eq!(keys, vec!["A-A", "A-B", "B-B"]);
    }

    #[test]
    fn test_pair_count_is_triangular() {
        for n in 1..=12 {
            let ids: Vec<String> = (0..n).map(|i| format!("{}", 30000 + i)).collect();
            let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            assert_eq!(station_pairs(&stations(&refs)).len(), expected_pair_count(n));
        }
    }

    #[test]
    fn test_no_pair_appears_in_both_directions() {
        let pairs = station_pairs(&stations(&["A", "B", "C", "D"]));
        let mut unordered = HashSet::new();
        for p in &pairs {
            let key = if p.start <= p.end {
                (p.start.clone(), p.end.clone())
            } else {
                (p.end.clone(), p.start.clone())
            };
            assert!(unordered.insert(key), "duplicate pair {}", p.key());
        }
    }

    #[test]
    fn test_self_pairs_included_once() {
        let pairs = station_pairs(&stations(&["A", "B", "C"]));
        assert_eq!(pairs.iter().filter(|p| p.is_circular()).count(), 3);
    }

    #[test]
    fn test_pairs_carry_both_coordinates() {
        let input = stations(&["A", "B"]);
        let pairs = station_pairs(&input);
        let ab = pairs.iter().find(|p| p.key() == "A-B").unwrap();
        assert_eq!(ab.start_location, input[0].location());
        assert_eq!(ab.end_location, input[1].location());
    }

    #[test]
    fn test_empty_station_list() {
        assert!(station_pairs(&[]).is_empty());
    }
}
