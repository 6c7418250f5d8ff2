use std::fmt::Display;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Coordinate, RoutePoint};

use crate::geo::haversine_km;
use crate::waypoints::{WaypointError, interpolated_loop};

/// Running pace assumed when no provider supplies a duration (~6 min/km).
pub const MOCK_PACE_S_PER_KM: f64 = 360.0;
const MOCK_ELEVATION_GAIN_RANGE_M: std::ops::Range<f64> = 10.0..40.0;

#[derive(Debug, Clone, Copy)]
pub enum TravelProfile {
    Walking,
}

impl TravelProfile {
    /// Mapbox profile segment.
    pub fn mapbox_name(self) -> &'static str {
        match self {
            TravelProfile::Walking => "walking",
        }
    }

    /// GraphHopper profile value.
    pub fn graphhopper_name(self) -> &'static str {
        match self {
            TravelProfile::Walking => "foot",
        }
    }
}

impl Display for TravelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mapbox_name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectionsError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("provider returned no route")]
    EmptyResponse,
    #[error(transparent)]
    Waypoints(#[from] WaypointError),
}

/// One routed loop as returned by a directions backend.
#[derive(Debug, Clone)]
pub struct RouteResult {
    pub path: Vec<RoutePoint>,
    pub distance_m: f64,
    pub duration_s: f64,
    /// Total ascent in metres. Not every provider reports it.
    pub elevation_gain_m: Option<f64>,
}

/// A single external routing call: ordered waypoints in, one polyline with
/// distance and duration out. Implementations are chosen once at composition
/// time and injected wherever routes are needed.
#[async_trait]
pub trait DirectionsGateway: Send + Sync {
    async fn route(
        &self,
        waypoints: &[Coordinate],
        profile: TravelProfile,
    ) -> Result<RouteResult, DirectionsError>;
}

/// Offline backend: fabricates a plausible loop polyline from the waypoint
/// ring without any outbound call. Never fails.
pub struct MockDirections {
    rng: Mutex<StdRng>,
}

impl MockDirections {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn elevation_gain(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.random_range(MOCK_ELEVATION_GAIN_RANGE_M),
            Err(_) => MOCK_ELEVATION_GAIN_RANGE_M.start,
        }
    }
}

#[async_trait]
impl DirectionsGateway for MockDirections {
    async fn route(
        &self,
        waypoints: &[Coordinate],
        _profile: TravelProfile,
    ) -> Result<RouteResult, DirectionsError> {
        let Some(&start) = waypoints.first() else {
            return Ok(RouteResult {
                path: Vec::new(),
                distance_m: 0.0,
                duration_s: 0.0,
                elevation_gain_m: Some(0.0),
            });
        };

        // The planner put every intermediate waypoint on a circle of radius
        // circumference / 2π around the start, so the requested target
        // distance is recoverable from the ring radius.
        let ring_radius_km = waypoints
            .get(1)
            .filter(|_| waypoints.len() > 2)
            .map(|&p| haversine_km(start, p))
            .unwrap_or(0.0);

        if ring_radius_km <= 0.0 {
            return Ok(RouteResult {
                path: vec![start.into(), start.into()],
                distance_m: 0.0,
                duration_s: 0.0,
                elevation_gain_m: Some(0.0),
            });
        }

        let target_distance_km = 2.0 * std::f64::consts::PI * ring_radius_km;
        let path = interpolated_loop(start, target_distance_km, 0.0)?
            .into_iter()
            .map(RoutePoint::from)
            .collect();

        let distance_m = target_distance_km * 1000.0;
        Ok(RouteResult {
            path,
            distance_m,
            duration_s: target_distance_km * MOCK_PACE_S_PER_KM,
            elevation_gain_m: Some(self.elevation_gain()),
        })
    }
}
