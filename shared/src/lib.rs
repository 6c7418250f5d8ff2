use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }

    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// One point of a course polyline. Altitude and timestamp are only present
/// when the producing backend supplies them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutePoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl RoutePoint {
    pub fn coordinate(self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

impl From<Coordinate> for RoutePoint {
    fn from(c: Coordinate) -> Self {
        Self {
            lat: c.lat,
            lon: c.lon,
            altitude: None,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    TrafficSignals,
    Crossing,
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficSignal {
    pub location: Coordinate,
    pub kind: SignalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time_s: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
}

/// A generated course candidate: one circular route proposal with its
/// signal-scoring metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Display tag used by the map layer to correlate overlays.
    pub color: String,
    pub distance_m: f64,
    pub duration_s: f64,
    pub elevation_gain_m: f64,
    pub signal_count: u32,
    pub difficulty: Difficulty,
    pub path: Vec<RoutePoint>,
    pub signals: Vec<TrafficSignal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRequest {
    pub start: Coordinate,
    pub target_distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseResponse {
    pub courses: Vec<Course>,
    pub generated_at: DateTime<Utc>,
    pub search_radius_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}

/// Format elapsed seconds as `M:SS`.
pub fn format_time(seconds: f64) -> String {
    let mins = (seconds / 60.0).floor() as i64;
    let secs = (seconds % 60.0).floor() as i64;
    format!("{mins}:{secs:02}")
}

/// Format a pace in seconds per kilometre as `M'SS"`.
pub fn format_pace(seconds_per_km: f64) -> String {
    let mins = (seconds_per_km / 60.0).floor() as i64;
    let secs = (seconds_per_km % 60.0).floor() as i64;
    format!("{mins}'{secs:02}\"")
}

/// Format a distance in metres, switching to kilometres from 1 km up.
pub fn format_distance(meters: f64) -> String {
    let km = meters / 1000.0;
    if km < 1.0 {
        format!("{}m", meters.round() as i64)
    } else {
        format!("{km:.1}km")
    }
}

/// Expected completion time for a distance at a given pace.
pub fn estimate_duration_s(distance_m: f64, pace_s_per_km: f64) -> f64 {
    (distance_m / 1000.0) * pace_s_per_km
}
