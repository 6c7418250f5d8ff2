use std::net::SocketAddr;
use std::time::Duration;

use shared::Coordinate;

use crate::geo::haversine_km;
use crate::mapbox::MAPBOX_DIRECTIONS_API_URL;
use crate::graphhopper::GRAPHHOPPER_DEFAULT_URL;
use crate::signals::OVERPASS_API_URL;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which directions backend to compose at startup. Selected once here;
/// business logic only ever sees the gateway trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionsBackend {
    Mock,
    Mapbox,
    GraphHopper,
}

impl DirectionsBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mock" => Some(Self::Mock),
            "mapbox" => Some(Self::Mapbox),
            "graphhopper" => Some(Self::GraphHopper),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub directions_backend: DirectionsBackend,
    pub mapbox_base_url: String,
    pub mapbox_access_token: String,
    pub graphhopper_base_url: String,
    pub graphhopper_api_key: Option<String>,
    pub overpass_url: String,
    pub request_timeout: Duration,
    pub bind_addr: SocketAddr,
    /// Seeds every synthetic source (mock routes, fallback signals) so a
    /// mock deployment is reproducible.
    pub rng_seed: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let directions_backend = std::env::var("DIRECTIONS_PROVIDER")
            .ok()
            .and_then(|value| {
                let parsed = DirectionsBackend::parse(&value);
                if parsed.is_none() {
                    tracing::warn!("Unknown DIRECTIONS_PROVIDER '{value}', falling back to mock");
                }
                parsed
            })
            .unwrap_or(DirectionsBackend::Mock);

        let request_timeout = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .unwrap_or_else(|_| {
                DEFAULT_BIND_ADDR
                    .parse()
                    .expect("default bind address is valid")
            });

        Self {
            directions_backend,
            mapbox_base_url: std::env::var("MAPBOX_API_URL")
                .unwrap_or_else(|_| MAPBOX_DIRECTIONS_API_URL.to_string()),
            mapbox_access_token: std::env::var("MAPBOX_ACCESS_TOKEN").unwrap_or_default(),
            graphhopper_base_url: std::env::var("GRAPHHOPPER_API_URL")
                .unwrap_or_else(|_| GRAPHHOPPER_DEFAULT_URL.to_string()),
            graphhopper_api_key: std::env::var("GRAPHHOPPER_API_KEY").ok(),
            overpass_url: std::env::var("OVERPASS_API_URL")
                .unwrap_or_else(|_| OVERPASS_API_URL.to_string()),
            request_timeout,
            bind_addr,
            rng_seed: std::env::var("RNG_SEED")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(0),
        }
    }
}

pub struct SupportedCity {
    pub name: &'static str,
    pub center: Coordinate,
    pub radius_km: f64,
}

/// Cities with verified map coverage. Requests outside these areas still
/// work, they just get a warning because provider data may be thin.
pub static SUPPORTED_CITIES: [SupportedCity; 8] = [
    SupportedCity {
        name: "Tokyo",
        center: Coordinate {
            lat: 35.6812,
            lon: 139.7671,
        },
        radius_km: 30.0,
    },
    SupportedCity {
        name: "Osaka",
        center: Coordinate {
            lat: 34.6937,
            lon: 135.5023,
        },
        radius_km: 20.0,
    },
    SupportedCity {
        name: "Nagoya",
        center: Coordinate {
            lat: 35.1815,
            lon: 136.9066,
        },
        radius_km: 15.0,
    },
    SupportedCity {
        name: "Yokohama",
        center: Coordinate {
            lat: 35.4437,
            lon: 139.6380,
        },
        radius_km: 15.0,
    },
    SupportedCity {
        name: "Fukuoka",
        center: Coordinate {
            lat: 33.5904,
            lon: 130.4017,
        },
        radius_km: 15.0,
    },
    SupportedCity {
        name: "Sapporo",
        center: Coordinate {
            lat: 43.0618,
            lon: 141.3545,
        },
        radius_km: 15.0,
    },
    SupportedCity {
        name: "Kobe",
        center: Coordinate {
            lat: 34.6901,
            lon: 135.1956,
        },
        radius_km: 10.0,
    },
    SupportedCity {
        name: "Kyoto",
        center: Coordinate {
            lat: 35.0116,
            lon: 135.7681,
        },
        radius_km: 10.0,
    },
];

pub fn supported_city(point: Coordinate) -> Option<&'static SupportedCity> {
    SUPPORTED_CITIES
        .iter()
        .find(|city| haversine_km(point, city.center) <= city.radius_km)
}

pub fn is_location_supported(point: Coordinate) -> bool {
    supported_city(point).is_some()
}
