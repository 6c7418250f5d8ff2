use std::f64::consts::PI;

use shared::Coordinate;

use crate::geo::destination_point;

/// Waypoints handed to a live directions provider. The provider interpolates
/// a realistic path between them, so a coarse ring is enough.
pub const LIVE_WAYPOINT_COUNT: usize = 4;
/// Ring size used when fabricating a polyline locally (mock mode).
pub const MOCK_WAYPOINT_COUNT: usize = 8;
/// Linear interpolation steps inserted between consecutive mock waypoints.
const INTERPOLATION_STEPS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum WaypointError {
    #[error("target distance must be a positive, finite number of kilometres")]
    InvalidDistance,
}

/// Place `point_count` waypoints on a circle whose circumference approximates
/// `target_distance_km`, rotated by `angle_offset_rad`, starting and ending at
/// `start` so the loop is closed.
pub fn plan_loop(
    start: Coordinate,
    target_distance_km: f64,
    point_count: usize,
    angle_offset_rad: f64,
) -> Result<Vec<Coordinate>, WaypointError> {
    if !target_distance_km.is_finite() || target_distance_km <= 0.0 {
        return Err(WaypointError::InvalidDistance);
    }

    let radius_km = target_distance_km / (2.0 * PI);

    let mut waypoints = Vec::with_capacity(point_count + 2);
    waypoints.push(start);
    for i in 0..point_count {
        let angle = 2.0 * PI * i as f64 / point_count as f64 + angle_offset_rad;
        waypoints.push(destination_point(start, radius_km, angle));
    }
    waypoints.push(start);

    Ok(waypoints)
}

/// Fabricate a walkable-looking closed polyline without any provider: an
/// 8-point ring with linear interpolation between consecutive waypoints.
pub fn interpolated_loop(
    start: Coordinate,
    target_distance_km: f64,
    angle_offset_rad: f64,
) -> Result<Vec<Coordinate>, WaypointError> {
    let waypoints = plan_loop(start, target_distance_km, MOCK_WAYPOINT_COUNT, angle_offset_rad)?;

    let mut path = Vec::with_capacity((waypoints.len() - 1) * INTERPOLATION_STEPS + 1);
    for window in waypoints.windows(2) {
        let (from, to) = (window[0], window[1]);
        for step in 0..INTERPOLATION_STEPS {
            let t = step as f64 / INTERPOLATION_STEPS as f64;
            path.push(from.interpolate(to, t));
        }
    }
    path.push(start);

    Ok(path)
}
