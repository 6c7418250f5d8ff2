pub mod config;
pub mod courses;
pub mod directions;
pub mod error;
pub mod geo;
pub mod graphhopper;
pub mod mapbox;
pub mod scoring;
pub mod signals;
pub mod waypoints;

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use tower_http::cors::{Any, CorsLayer};

use shared::{ApiError, CourseRequest, CourseResponse};

use crate::courses::CoursePlanner;
use crate::error::CourseError;

#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<CoursePlanner>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/courses", post(courses_handler))
        .layer(cors)
        .with_state(state)
}

async fn courses_handler(
    State(state): State<AppState>,
    Json(req): Json<CourseRequest>,
) -> Result<Json<CourseResponse>, (StatusCode, Json<ApiError>)> {
    if req.start.is_finite() && !config::is_location_supported(req.start) {
        tracing::warn!(
            "Start ({:.4}, {:.4}) is outside the supported areas, provider data may be thin",
            req.start.lat,
            req.start.lon
        );
    }

    state
        .planner
        .generate_courses(req.start, req.target_distance_km)
        .await
        .map(Json)
        .map_err(course_error_response)
}

fn course_error_response(err: CourseError) -> (StatusCode, Json<ApiError>) {
    let status = match err {
        CourseError::InvalidDistance | CourseError::InvalidCoordinate => StatusCode::BAD_REQUEST,
    };

    (
        status,
        Json(ApiError {
            message: err.to_string(),
        }),
    )
}
