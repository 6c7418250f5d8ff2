use std::sync::Arc;

use backend::{
    AppState,
    config::{Config, DirectionsBackend},
    courses::CoursePlanner,
    create_router,
    directions::{DirectionsGateway, MockDirections},
    graphhopper::{GraphHopperDirections, GraphHopperDirectionsParams},
    mapbox::{MapboxDirections, MapboxDirectionsParams},
    signals::{OverpassSignals, OverpassSignalsParams, SignalCache, SignalGateway, SyntheticSignals, SystemClock},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let directions: Arc<dyn DirectionsGateway> = match config.directions_backend {
        DirectionsBackend::Mock => Arc::new(MockDirections::seeded(config.rng_seed)),
        DirectionsBackend::Mapbox => Arc::new(
            MapboxDirections::new(MapboxDirectionsParams {
                base_url: config.mapbox_base_url.clone(),
                access_token: config.mapbox_access_token.clone(),
                timeout: config.request_timeout,
            })
            .expect("build mapbox client"),
        ),
        DirectionsBackend::GraphHopper => Arc::new(
            GraphHopperDirections::new(GraphHopperDirectionsParams {
                base_url: config.graphhopper_base_url.clone(),
                api_key: config.graphhopper_api_key.clone(),
                timeout: config.request_timeout,
            })
            .expect("build graphhopper client"),
        ),
    };

    let signal_gateway: Arc<dyn SignalGateway> = match config.directions_backend {
        DirectionsBackend::Mock => Arc::new(SyntheticSignals::seeded(config.rng_seed)),
        _ => Arc::new(
            OverpassSignals::new(
                OverpassSignalsParams {
                    base_url: config.overpass_url.clone(),
                    timeout: config.request_timeout,
                },
                SignalCache::with_default_ttl(Arc::new(SystemClock)),
                config.rng_seed,
            )
            .expect("build overpass client"),
        ),
    };

    tracing::info!(
        "directions backend: {:?}, signal source: {}",
        config.directions_backend,
        if config.directions_backend == DirectionsBackend::Mock {
            "synthetic"
        } else {
            "overpass"
        }
    );

    let planner = CoursePlanner::seeded(directions, signal_gateway, config.rng_seed);
    let state = AppState {
        planner: Arc::new(planner),
    };
    let app = create_router(state);

    tracing::info!("starting backend on http://{}", config.bind_addr);
    axum::serve(
        tokio::net::TcpListener::bind(config.bind_addr).await.unwrap(),
        app,
    )
    .await
    .unwrap();
}
