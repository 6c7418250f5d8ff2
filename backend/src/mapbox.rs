use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use shared::{Coordinate, RoutePoint};

use crate::directions::{DirectionsError, DirectionsGateway, RouteResult, TravelProfile};

pub const MAPBOX_DIRECTIONS_API_URL: &str = "https://api.mapbox.com/directions/v5/mapbox";

#[derive(Deserialize)]
struct MapboxRouteResponse {
    routes: Vec<MapboxRoute>,
}

#[derive(Deserialize)]
struct MapboxRoute {
    /// Metres.
    distance: f64,
    /// Seconds.
    duration: f64,
    geometry: MapboxGeometry,
}

#[derive(Deserialize)]
struct MapboxGeometry {
    /// `[lon, lat]` pairs.
    coordinates: Vec<[f64; 2]>,
}

pub struct MapboxDirectionsParams {
    pub base_url: String,
    pub access_token: String,
    pub timeout: Duration,
}

/// Live Mapbox Directions client. The walking profile does not report
/// elevation, so `elevation_gain_m` is always absent here and estimated by
/// the caller.
pub struct MapboxDirections {
    params: MapboxDirectionsParams,
    client: reqwest::Client,
}

impl MapboxDirections {
    pub fn new(params: MapboxDirectionsParams) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(params.timeout)
            .build()?;
        Ok(Self { params, client })
    }

    fn route_url(&self, waypoints: &[Coordinate], profile: TravelProfile) -> String {
        let coordinates = waypoints
            .iter()
            .map(|wp| format!("{},{}", wp.lon, wp.lat))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/{}/{}",
            self.params.base_url,
            profile.mapbox_name(),
            coordinates
        )
    }
}

#[async_trait]
impl DirectionsGateway for MapboxDirections {
    async fn route(
        &self,
        waypoints: &[Coordinate],
        profile: TravelProfile,
    ) -> Result<RouteResult, DirectionsError> {
        let response = self
            .client
            .get(self.route_url(waypoints, profile))
            .query(&[
                ("geometries", "geojson"),
                ("overview", "full"),
                ("steps", "false"),
                ("access_token", self.params.access_token.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(DirectionsError::Api { status, message });
        }

        let payload: MapboxRouteResponse = response.json().await?;
        let route = payload
            .routes
            .into_iter()
            .next()
            .ok_or(DirectionsError::EmptyResponse)?;

        tracing::debug!(
            "Mapbox route: {:.0}m, {:.0}s, {} points",
            route.distance,
            route.duration,
            route.geometry.coordinates.len()
        );

        let path = route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lon, lat]| RoutePoint::from(Coordinate { lat, lon }))
            .collect();

        Ok(RouteResult {
            path,
            distance_m: route.distance,
            duration_s: route.duration,
            elevation_gain_m: None,
        })
    }
}
