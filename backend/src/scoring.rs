use shared::{RoutePoint, TrafficSignal};

use crate::geo::haversine_m;

/// Maximum distance between a signal and any route point for the signal to
/// count as "on" the route.
pub const DEFAULT_PROXIMITY_M: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct RouteScore {
    pub count: u32,
    pub signals_on_route: Vec<TrafficSignal>,
}

/// Attribute signals to a polyline: a signal is on the route if any polyline
/// point lies within `proximity_m` of it, counted at most once. O(signals ×
/// path length), which is fine at the bounded sizes involved here.
pub fn score_route(
    path: &[RoutePoint],
    signals: &[TrafficSignal],
    proximity_m: f64,
) -> RouteScore {
    let mut signals_on_route = Vec::new();

    for signal in signals {
        for point in path {
            if haversine_m(point.coordinate(), signal.location) <= proximity_m {
                signals_on_route.push(signal.clone());
                break;
            }
        }
    }

    RouteScore {
        count: signals_on_route.len() as u32,
        signals_on_route,
    }
}
