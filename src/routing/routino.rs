use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{PathGeometry, RouteRequest, RoutingError, RoutingOracle};
use crate::config::RoutingConfig;
use crate::parser::parse_track;

/// Runs the Routino `router` binary once per request.
///
/// The router writes `<mode>-track.gpx` into its working directory, so every
/// attempt gets its own [`ScratchDir`] and concurrent attempts never collide.
pub struct RoutinoRouter {
    router: PathBuf,
    routino_dir: PathBuf,
    profiles: PathBuf,
    translations: PathBuf,
    work_dir: PathBuf,
    success_marker: String,
}

impl RoutinoRouter {
    /// Relative paths are resolved against the current directory here, since
    /// the router itself runs inside its scratch directory.
    pub fn new(config: &RoutingConfig) -> Self {
        // a bare program name is left for PATH lookup
        let router = if config.router.components().count() > 1 {
            absolute(&config.router)
        } else {
            config.router.clone()
        };
        Self {
            router,
            routino_dir: absolute(&config.routino_dir),
            profiles: absolute(&config.profiles),
            translations: absolute(&config.translations),
            work_dir: config.work_dir.clone(),
            success_marker: config.success_marker.clone(),
        }
    }

    /// Command line arguments for one attempt.
    pub fn args(&self, request: &RouteRequest) -> Vec<String> {
        let mut args = vec![
            format!("--dir={}", self.routino_dir.display()),
            format!("--profiles={}", self.profiles.display()),
            format!("--translations={}", self.translations.display()),
        ];
        for (i, point) in request.waypoints().iter().enumerate() {
            args.push(format!("--lat{}={}", i + 1, point.y()));
            args.push(format!("--lon{}={}", i + 1, point.x()));
        }
        args.push("--output-gpx-track".to_string());
        args.push(format!("--{}", request.mode));
        args.push(format!("--profile={}", request.profile));
        args.push("--transport=bicycle".to_string());
        args
    }

    fn track_file(request: &RouteRequest) -> String {
        format!("{}-track.gpx", request.mode)
    }
}

#[async_trait]
impl RoutingOracle for RoutinoRouter {
    async fn resolve_route(&self, request: &RouteRequest) -> Result<PathGeometry, RoutingError> {
        let scratch = ScratchDir::create(
            &self.work_dir,
            &format!("{}-{}", request.label, request.profile),
        )?;

        let output = Command::new(&self.router)
            .args(self.args(request))
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RoutingError::ProcessFailure {
                profile: request.profile,
                message: format!("unable to start {}: {}", self.router.display(), e),
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() || !text.contains(&self.success_marker) {
            let last_line = text.lines().last().unwrap_or("").trim().to_string();
            return Err(RoutingError::ProcessFailure {
                profile: request.profile,
                message: format!("{} ({})", last_line, output.status),
            });
        }

        let track_path = scratch.path().join(Self::track_file(request));
        let xml = tokio::fs::read_to_string(&track_path).await.map_err(|e| {
            RoutingError::ProcessFailure {
                profile: request.profile,
                message: format!("missing track {}: {}", track_path.display(), e),
            }
        })?;
        let track = parse_track(&xml)?;
        debug!(
            points = track.path.0.len(),
            skipped = track.skipped,
            profile = %request.profile,
            "Router track parsed"
        );

        if track.path.0.is_empty() {
            return Err(RoutingError::EmptyGeometry {
                profile: request.profile,
            });
        }
        Ok(track.path)
    }

    fn describe(&self, request: &RouteRequest) -> String {
        format!("{} {}", self.router.display(), self.args(request).join(" "))
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Directory that is removed, with everything the router left in it, when dropped.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(parent: &Path, label: &str) -> std::io::Result<Self> {
        let path = parent.join(format!("{}-{}", label, std::process::id()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove router scratch directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RouteMode, TransportProfile};
    use geo_types::Point;

    fn router(work_dir: PathBuf, bin: PathBuf) -> RoutinoRouter {
        RoutinoRouter {
            router: bin,
            routino_dir: PathBuf::from("/opt/routino/data"),
            profiles: PathBuf::from("/opt/routino/profiles.xml"),
            translations: PathBuf::from("/opt/routino/translations.xml"),
            work_dir,
            success_marker: "Routed OK".to_string(),
        }
    }

    fn request(profile: TransportProfile, via: Option<Point<f64>>) -> RouteRequest {
        RouteRequest {
            origin: Point::new(-93.25, 44.97),
            via,
            destination: Point::new(-93.26, 44.98),
            profile,
            mode: RouteMode::Shortest,
            label: "30000-30001".to_string(),
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_args_for_direct_route() {
        let r = router(PathBuf::from("/tmp"), PathBuf::from("router"));
        let args = r.args(&request(TransportProfile::Foot, None));
        assert!(args.contains(&"--lat1=44.97".to_string()));
        assert!(args.contains(&"--lon2=-93.26".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--lat3")));
        assert!(args.contains(&"--shortest".to_string()));
        assert!(args.contains(&"--profile=foot".to_string()));
        assert!(args.contains(&"--transport=bicycle".to_string()));
    }

    #[test]
    fn test_args_for_round_trip_use_three_points() {
        let r = router(PathBuf::from("/tmp"), PathBuf::from("router"));
        let via = Point::new(-93.27032089233398, 44.98064594145076);
        let args = r.args(&request(TransportProfile::Bicycle, Some(via)));
        assert!(args.contains(&"--lat2=44.98064594145076".to_string()));
        assert!(args.contains(&"--lat3=44.98".to_string()));
        assert!(args.contains(&"--lon3=-93.26".to_string()));
    }

    #[test]
    fn test_new_resolves_relative_paths() {
        let config = RoutingConfig::default();
        let r = RoutinoRouter::new(&config);
        assert!(r.router.is_absolute());
        assert!(r.routino_dir.is_absolute());
        assert!(r.profiles.ends_with("routino-conf/profiles.xml"));

        let on_path = RoutinoRouter::new(&RoutingConfig {
            router: PathBuf::from("router"),
            ..RoutingConfig::default()
        });
        assert_eq!(on_path.router, PathBuf::from("router"));
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let parent = temp_dir("bikeshare_routes_scratch_drop");
        let path = {
            let scratch = ScratchDir::create(&parent, "A-B-bicycle").unwrap();
            std::fs::write(scratch.path().join("shortest-track.gpx"), "<gpx/>").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
        std::fs::remove_dir_all(&parent).unwrap();
    }

    #[cfg(unix)]
    fn fake_router(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    --profile=bicycle) echo "Error: Cannot find a route."; exit 1 ;;
    --profile=foot) echo "Routed OK"; echo '<gpx><trk><trkseg></trkseg></trk></gpx>' > shortest-track.gpx; exit 0 ;;
  esac
done
cat > shortest-track.gpx <<EOF
<gpx><trk><trkseg><trkpt lat="44.97" lon="-93.25"/><trkpt lat="44.98" lon="-93.26"/></trkseg></trk></gpx>
EOF
echo "Routed OK"
"#;
        let path = dir.join("router.sh");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_router_process_protocol() {
        let dir = temp_dir("bikeshare_routes_fake_router");
        let work_dir = dir.join("work");
        let r = router(work_dir.clone(), fake_router(&dir));

        let failed = r.resolve_route(&request(TransportProfile::Bicycle, None)).await;
        assert!(matches!(failed, Err(RoutingError::ProcessFailure { .. })));

        let empty = r.resolve_route(&request(TransportProfile::Foot, None)).await;
        assert!(matches!(empty, Err(RoutingError::EmptyGeometry { .. })));

        let path = r
            .resolve_route(&request(TransportProfile::Moped, None))
            .await
            .unwrap();
        assert_eq!(path.0.len(), 2);

        // every attempt cleaned up after itself
        let leftovers = std::fs::read_dir(&work_dir).unwrap().count();
        assert_eq!(leftovers, 0);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
