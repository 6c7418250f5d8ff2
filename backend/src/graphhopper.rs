use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use shared::{Coordinate, RoutePoint};

use crate::directions::{DirectionsError, DirectionsGateway, RouteResult, TravelProfile};

pub const GRAPHHOPPER_DEFAULT_URL: &str = "http://localhost:8989";

#[derive(Deserialize)]
struct GraphHopperRouteResponse {
    paths: Vec<GraphHopperPath>,
}

#[derive(Deserialize)]
struct GraphHopperPath {
    /// Metres.
    distance: f64,
    /// Milliseconds.
    time: f64,
    /// Total ascent in metres.
    ascend: f64,
    points: GraphHopperPoints,
}

#[derive(Deserialize)]
struct GraphHopperPoints {
    /// `[lon, lat]` pairs (`points_encoded=false`).
    coordinates: Vec<[f64; 2]>,
}

pub struct GraphHopperDirectionsParams {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Live GraphHopper routing client (self-hosted or hosted API). Unlike the
/// Mapbox walking profile this backend reports ascent.
pub struct GraphHopperDirections {
    params: GraphHopperDirectionsParams,
    client: reqwest::Client,
}

impl GraphHopperDirections {
    pub fn new(params: GraphHopperDirectionsParams) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(params.timeout)
            .build()?;
        Ok(Self { params, client })
    }
}

#[async_trait]
impl DirectionsGateway for GraphHopperDirections {
    async fn route(
        &self,
        waypoints: &[Coordinate],
        profile: TravelProfile,
    ) -> Result<RouteResult, DirectionsError> {
        let mut query: Vec<(&str, String)> = waypoints
            .iter()
            .map(|wp| ("point", format!("{},{}", wp.lat, wp.lon)))
            .collect();
        query.push(("profile", profile.graphhopper_name().to_string()));
        query.push(("points_encoded", "false".to_string()));
        query.push(("ch.disable", "true".to_string()));

        let mut request = self
            .client
            .get(format!("{}/route", self.params.base_url))
            .query(&query);
        if let Some(api_key) = &self.params.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(DirectionsError::Api { status, message });
        }

        let payload: GraphHopperRouteResponse = response.json().await?;
        let path = payload
            .paths
            .into_iter()
            .next()
            .ok_or(DirectionsError::EmptyResponse)?;

        tracing::debug!(
            "GraphHopper route: {:.0}m, {:.0}ms, ascend {:.0}m",
            path.distance,
            path.time,
            path.ascend
        );

        let points = path
            .points
            .coordinates
            .into_iter()
            .map(|[lon, lat]| RoutePoint::from(Coordinate { lat, lon }))
            .collect();

        Ok(RouteResult {
            path: points,
            distance_m: path.distance,
            duration_s: path.time / 1000.0,
            elevation_gain_m: Some(path.ascend),
        })
    }
}
