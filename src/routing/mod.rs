//! Geographic path resolution for station pairs.
//!
//! [`RoutingOracle`] is the seam to the external path solver; [`RoutinoRouter`]
//! shells out to the Routino `router` binary. [`RouteResolver`] walks the
//! transport-profile priority list for each pair and persists the first path
//! that comes back.

mod resolver;
mod routino;

pub use resolver::{AttemptState, ResolveSummary, RouteResolver};
pub use routino::{RoutinoRouter, ScratchDir};

use async_trait::async_trait;
use geo_types::{LineString, Point};

use crate::model::{RouteMode, TransportProfile};

/// Ordered track points returned by the oracle.
pub type PathGeometry = LineString<f64>;

/// One routing attempt: a single profile between fixed coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub origin: Point<f64>,
    /// Intermediate point; set for round trips, which would otherwise have
    /// zero length.
    pub via: Option<Point<f64>>,
    pub destination: Point<f64>,
    pub profile: TransportProfile,
    pub mode: RouteMode,
    /// Scratch space label, unique per pair.
    pub label: String,
}

impl RouteRequest {
    /// Waypoints in travel order.
    pub fn waypoints(&self) -> Vec<Point<f64>> {
        let mut points = vec![self.origin];
        points.extend(self.via);
        points.push(self.destination);
        points
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("router failed for profile {profile}: {message}")]
    ProcessFailure {
        profile: TransportProfile,
        message: String,
    },
    #[error("router reported success for profile {profile} but the track had no points")]
    EmptyGeometry { profile: TransportProfile },
    #[error("no transport profile could route {pair}; last attempted: {attempted}")]
    Exhausted { pair: String, attempted: String },
    #[error("unable to read router track: {0}")]
    Track(String),
    #[error("router i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RoutingError {
    /// Failures that only rule out the current profile.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RoutingError::Exhausted { .. })
    }
}

/// External path solver.
#[async_trait]
pub trait RoutingOracle: Send + Sync {
    async fn resolve_route(&self, request: &RouteRequest) -> Result<PathGeometry, RoutingError>;

    /// Human readable form of the invocation, reported when a pair cannot be routed.
    fn describe(&self, request: &RouteRequest) -> String {
        let points = request
            .waypoints()
            .iter()
            .map(|p| format!("({}, {})", p.y(), p.x()))
            .collect::<Vec<_>>()
            .join(" -> ");
        format!("{} {} {}", request.mode, request.profile, points)
    }
}
