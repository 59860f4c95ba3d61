use anyhow::{Context, Result};
use geo_types::Point;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, warn};

use super::{PathGeometry, RouteRequest, RoutingError, RoutingOracle};
use crate::config::Config;
use crate::model::{Route, RouteMode, StationPair, TransportProfile};
use crate::store::{Dataset, Store};

/// Progress of one pair through the transport-profile priority list.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    Pending,
    /// Next attempt uses the profile at this index of the priority list.
    TryingProfile(usize),
    Succeeded {
        profile: TransportProfile,
        path: PathGeometry,
    },
    ExhaustedFailed {
        attempted: String,
    },
}

/// Counts of committed routes for one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveSummary {
    pub committed: usize,
    pub by_profile: HashMap<TransportProfile, usize>,
}

impl ResolveSummary {
    fn record(&mut self, profile: TransportProfile) {
        self.committed += 1;
        *self.by_profile.entry(profile).or_default() += 1;
    }
}

/// Resolves station pairs into routes, one profile at a time in priority order.
#[derive(Clone)]
pub struct RouteResolver {
    oracle: Arc<dyn RoutingOracle>,
    profiles: Vec<TransportProfile>,
    mode: RouteMode,
    popular_location: Point<f64>,
    srid: u32,
}

impl RouteResolver {
    pub fn new(oracle: Arc<dyn RoutingOracle>, config: &Config) -> Self {
        Self {
            oracle,
            profiles: config.routing.transport_priority.clone(),
            mode: config.routing.mode,
            popular_location: config.routing.popular_location.point(),
            srid: config.srid,
        }
    }

    /// Attempt parameters for `pair` with `profile`.
    ///
    /// Round trips go out to the popular location and back.
    pub fn request(&self, pair: &StationPair, profile: TransportProfile) -> RouteRequest {
        RouteRequest {
            origin: pair.start_location,
            via: pair.is_circular().then_some(self.popular_location),
            destination: pair.end_location,
            profile,
            mode: self.mode,
            label: pair.key(),
        }
    }

    /// Runs a single transition of the attempt state machine.
    pub async fn step(&self, pair: &StationPair, state: AttemptState) -> AttemptState {
        match state {
            AttemptState::Pending => match self.profiles.is_empty() {
                true => AttemptState::ExhaustedFailed {
                    attempted: "no transport profiles configured".to_string(),
                },
                false => AttemptState::TryingProfile(0),
            },
            AttemptState::TryingProfile(i) => {
                let Some(&profile) = self.profiles.get(i) else {
                    return AttemptState::ExhaustedFailed {
                        attempted: format!("no transport profile at position {}", i),
                    };
                };
                let request = self.request(pair, profile);
                match self.oracle.resolve_route(&request).await {
                    Ok(path) => {
                        debug!(profile = %profile, points = path.0.len(), "Route found");
                        AttemptState::Succeeded { profile, path }
                    }
                    Err(e) => {
                        debug!(profile = %profile, error = %e, "No route for profile");
                        if e.is_recoverable() && i + 1 < self.profiles.len() {
                            AttemptState::TryingProfile(i + 1)
                        } else {
                            AttemptState::ExhaustedFailed {
                                attempted: self.oracle.describe(&request),
                            }
                        }
                    }
                }
            }
            done => done,
        }
    }

    /// Walks the priority list until a profile yields a path; the first success wins.
    pub async fn resolve_pair(&self, pair: &StationPair) -> Result<Route, RoutingError> {
        let mut state = AttemptState::Pending;
        loop {
            state = match self.step(pair, state).await {
                AttemptState::Succeeded { profile, path } => {
                    return Ok(self.route(pair, profile, path));
                }
                AttemptState::ExhaustedFailed { attempted } => {
                    return Err(RoutingError::Exhausted {
                        pair: pair.key(),
                        attempted,
                    });
                }
                next => next,
            };
        }
    }

    fn route(&self, pair: &StationPair, profile: TransportProfile, path: PathGeometry) -> Route {
        Route {
            terminal_id_start: pair.start.clone(),
            terminal_id_end: pair.end.clone(),
            profile,
            start_geom: pair.start_location,
            end_geom: pair.end_location,
            path,
            srid: self.srid,
        }
    }

    /// Truncates the route table and resolves every pair into it.
    ///
    /// Up to `concurrency` pairs are in flight at once; routes are still
    /// written in pair order by this task alone. A pair that no profile can
    /// route stops the batch.
    #[tracing::instrument(skip_all, fields(dataset = %dataset, pairs = pairs.len(), concurrency = concurrency))]
    pub async fn resolve_all(
        &self,
        pairs: &[StationPair],
        store: &mut dyn Store,
        dataset: &Dataset,
        concurrency: usize,
    ) -> Result<ResolveSummary> {
        info!("Truncate routes table");
        store.truncate_routes(dataset)?;

        let mut summary = ResolveSummary::default();
        for chunk in pairs.chunks(concurrency.max(1)) {
            let mut tasks = Vec::with_capacity(chunk.len());
            for pair in chunk {
                let resolver = self.clone();
                let pair = pair.clone();
                let span = tracing::info_span!("resolve_pair", pair = %pair.key());
                tasks.push(tokio::spawn(
                    async move { resolver.resolve_pair(&pair).await }.instrument(span),
                ));
            }

            for (pair, task) in chunk.iter().zip(tasks) {
                let resolved = task
                    .await
                    .with_context(|| format!("route task for {} did not complete", pair.key()))?;
                match resolved {
                    Ok(route) => {
                        store.insert_route(dataset, &route)?;
                        info!(pair = %pair.key(), profile = %route.profile, circular = pair.is_circular(), "Route committed");
                        summary.record(route.profile);
                    }
                    Err(e) => {
                        error!(pair = %pair.key(), error = %e, committed = summary.committed, "Route not transported, halting batch");
                        return Err(e.into());
                    }
                }
            }
        }

        for (profile, count) in &summary.by_profile {
            if self.profiles.first() != Some(profile) {
                warn!(profile = %profile, count, "Routes resolved with a fallback profile");
            }
        }
        info!(committed = summary.committed, "Routes committed");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Station;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use geo_types::{LineString, coord};
    use std::sync::Mutex;

    /// Oracle that only knows the profiles it was given and records every call.
    struct ScriptedOracle {
        works_with: Vec<TransportProfile>,
        empty_for: Vec<TransportProfile>,
        calls: Mutex<Vec<RouteRequest>>,
    }

    impl ScriptedOracle {
        fn new(works_with: &[TransportProfile]) -> Self {
            Self {
                works_with: works_with.to_vec(),
                empty_for: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RoutingOracle for ScriptedOracle {
        async fn resolve_route(&self, request: &RouteRequest) -> Result<PathGeometry, RoutingError> {
            self.calls.lock().unwrap().push(request.clone());
            if self.empty_for.contains(&request.profile) {
                return Err(RoutingError::EmptyGeometry {
                    profile: request.profile,
                });
            }
            if !self.works_with.contains(&request.profile) {
                return Err(RoutingError::ProcessFailure {
                    profile: request.profile,
                    message: "no route".into(),
                });
            }
            Ok(LineString::new(
                request
                    .waypoints()
                    .iter()
                    .map(|p| coord! { x: p.x(), y: p.y() })
                    .collect(),
            ))
        }
    }

    fn pair(start: &str, end: &str) -> StationPair {
        StationPair::from_stations(
            &Station::new(start, 44.97, -93.25),
            &Station::new(end, 44.98, -93.26),
        )
    }

    fn resolver(oracle: Arc<dyn RoutingOracle>) -> RouteResolver {
        RouteResolver::new(oracle, &Config::default())
    }

    #[tokio::test]
    async fn test_first_profile_wins() {
        let oracle = Arc::new(ScriptedOracle::new(&TransportProfile::DEFAULT_PRIORITY));
        let route = resolver(oracle.clone()).resolve_pair(&pair("A", "B")).await.unwrap();
        assert_eq!(route.profile, TransportProfile::Bicycle);
        assert_eq!(oracle.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_falls_through_failed_and_empty_profiles() {
        let mut scripted = ScriptedOracle::new(&[TransportProfile::SuperBicycle, TransportProfile::Foot]);
        scripted.empty_for = vec![TransportProfile::SuperBicycle];
        let oracle = Arc::new(scripted);

        let route = resolver(oracle.clone()).resolve_pair(&pair("A", "B")).await.unwrap();
        assert_eq!(route.profile, TransportProfile::Foot);
        let tried: Vec<TransportProfile> =
            oracle.calls.lock().unwrap().iter().map(|r| r.profile).collect();
        assert_eq!(
            tried,
            vec![
                TransportProfile::Bicycle,
                TransportProfile::SuperBicycle,
                TransportProfile::Foot
            ]
        );
    }

    #[tokio::test]
    async fn test_round_trip_goes_through_popular_location() {
        let oracle = Arc::new(ScriptedOracle::new(&[TransportProfile::Bicycle]));
        let r = resolver(oracle.clone());
        let route = r.resolve_pair(&pair("A", "A")).await.unwrap();

        let request = oracle.calls.lock().unwrap()[0].clone();
        assert_eq!(request.via, Some(Config::default().routing.popular_location.point()));
        assert_eq!(route.path.0.len(), 3);

        let direct = r.request(&pair("A", "B"), TransportProfile::Bicycle);
        assert!(direct.via.is_none());
    }

    #[tokio::test]
    async fn test_state_machine_transitions() {
        let oracle = Arc::new(ScriptedOracle::new(&[TransportProfile::Foot]));
        let r = resolver(oracle);
        let p = pair("A", "B");

        let s = r.step(&p, AttemptState::Pending).await;
        assert_eq!(s, AttemptState::TryingProfile(0));
        let s = r.step(&p, s).await;
        assert_eq!(s, AttemptState::TryingProfile(1));
        let s = r.step(&p, s).await;
        assert_eq!(s, AttemptState::TryingProfile(2));
        let s = r.step(&p, s).await;
        assert!(matches!(s, AttemptState::Succeeded { profile: TransportProfile::Foot, .. }));
        // terminal states stay put
        assert_eq!(r.step(&p, s.clone()).await, s);
    }

    #[tokio::test]
    async fn test_exhausted_profiles_report_last_attempt() {
        let oracle = Arc::new(ScriptedOracle::new(&[]));
        let err = resolver(oracle.clone())
            .resolve_pair(&pair("A", "B"))
            .await
            .unwrap_err();
        assert_eq!(oracle.calls.lock().unwrap().len(), 6);
        match err {
            RoutingError::Exhausted { pair, attempted } => {
                assert_eq!(pair, "A-B");
                assert!(attempted.contains("motorcar"), "{attempted}");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_all_halts_on_unroutable_pair() {
        struct BlockedPair;

        #[async_trait]
        impl RoutingOracle for BlockedPair {
            async fn resolve_route(&self, request: &RouteRequest) -> Result<PathGeometry, RoutingError> {
                if request.label == "A-C" {
                    return Err(RoutingError::ProcessFailure {
                        profile: request.profile,
                        message: "island".into(),
                    });
                }
                Ok(LineString::new(vec![coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 }]))
            }
        }

        let dataset = Dataset::default();
        let mut store = MemoryStore::new();
        let pairs = vec![pair("A", "A"), pair("A", "B"), pair("A", "C"), pair("B", "B")];
        let err = resolver(Arc::new(BlockedPair))
            .resolve_all(&pairs, &mut store, &dataset, 1)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RoutingError>(),
            Some(RoutingError::Exhausted { .. })
        ));
        let keys: Vec<String> = store.routes(&dataset).unwrap().iter().map(Route::key).collect();
        assert_eq!(keys, vec!["A-A", "A-B"]);
    }

    #[tokio::test]
    async fn test_resolve_all_is_idempotent_and_order_preserving() {
        let oracle = Arc::new(ScriptedOracle::new(&[TransportProfile::Moped]));
        let r = resolver(oracle);
        let dataset = Dataset::named("2011");
        let mut store = MemoryStore::new();
        let pairs = vec![pair("A", "A"), pair("A", "B"), pair("B", "B"), pair("B", "C")];

        let first = r.resolve_all(&pairs, &mut store, &dataset, 3).await.unwrap();
        let routes_first = store.routes(&dataset).unwrap();
        let second = r.resolve_all(&pairs, &mut store, &dataset, 1).await.unwrap();
        let routes_second = store.routes(&dataset).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.committed, 4);
        assert_eq!(first.by_profile.get(&TransportProfile::Moped), Some(&4));
        assert_eq!(routes_first, routes_second);
        let keys: Vec<String> = routes_second.iter().map(Route::key).collect();
        assert_eq!(keys, vec!["A-A", "A-B", "B-B", "B-C"]);
    }
}
