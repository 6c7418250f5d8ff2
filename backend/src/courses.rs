use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Coordinate, Course, CourseResponse, Difficulty};

use crate::directions::{DirectionsGateway, RouteResult, TravelProfile};
use crate::error::CourseError;
use crate::geo::{destination_point, haversine_m};
use crate::scoring::{DEFAULT_PROXIMITY_M, score_route};
use crate::signals::SignalGateway;
use crate::waypoints::{LIVE_WAYPOINT_COUNT, plan_loop};

/// Offset applied to each profile's start so the loops are visually distinct.
const START_PERTURBATION_KM: f64 = 0.1;
/// A candidate whose endpoints stray further than this from the requested
/// start is not a closed loop and is dropped.
const LOOP_CLOSURE_TOLERANCE_M: f64 = 250.0;
/// Elevation estimate used when the directions backend reports no ascent.
const ESTIMATED_ELEVATION_RANGE_M: std::ops::Range<f64> = 10.0..40.0;

/// A named generation strategy. The angular offset rotates both the start
/// perturbation and the waypoint ring, which is what makes the three
/// candidates geographically distinct.
pub struct CourseProfile {
    pub key: &'static str,
    pub name: &'static str,
    pub color: &'static str,
    pub angle_offset: f64,
}

pub static COURSE_PROFILES: [CourseProfile; 3] = [
    CourseProfile {
        key: "fastest",
        name: "Fastest course",
        color: "#13ec49",
        angle_offset: 0.0,
    },
    CourseProfile {
        key: "scenic",
        name: "Scenic course",
        color: "#3b82f6",
        angle_offset: PI / 4.0,
    },
    CourseProfile {
        key: "balanced",
        name: "Balanced course",
        color: "#a855f7",
        angle_offset: -PI / 4.0,
    },
];

pub fn derive_difficulty(distance_m: f64, elevation_gain_m: f64) -> Difficulty {
    let distance_km = distance_m / 1000.0;
    let gradient_percent = elevation_gain_m / distance_m * 100.0;

    if distance_km <= 5.0 && gradient_percent < 2.0 {
        Difficulty::Easy
    } else if distance_km <= 10.0 && gradient_percent < 4.0 {
        Difficulty::Moderate
    } else {
        Difficulty::Hard
    }
}

pub fn describe_course(distance_m: f64, elevation_gain_m: f64) -> String {
    let distance_km = distance_m / 1000.0;
    let elevation = elevation_gain_m.round() as i64;

    if elevation < 20 {
        format!("{distance_km:.1} km flat course")
    } else if elevation < 50 {
        format!("{distance_km:.1} km with gentle rolling hills")
    } else {
        format!("{distance_km:.1} km challenge course with {elevation} m of climb")
    }
}

/// Coordinates the whole generation pipeline: waypoint synthesis, concurrent
/// route and signal fetches, scoring, ranking.
pub struct CoursePlanner {
    directions: Arc<dyn DirectionsGateway>,
    signals: Arc<dyn SignalGateway>,
    proximity_m: f64,
    rng: Mutex<StdRng>,
}

impl CoursePlanner {
    pub fn new(directions: Arc<dyn DirectionsGateway>, signals: Arc<dyn SignalGateway>) -> Self {
        Self::seeded(directions, signals, 0)
    }

    pub fn seeded(
        directions: Arc<dyn DirectionsGateway>,
        signals: Arc<dyn SignalGateway>,
        seed: u64,
    ) -> Self {
        Self {
            directions,
            signals,
            proximity_m: DEFAULT_PROXIMITY_M,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Generate candidate loops of roughly `target_distance_km` around
    /// `start`, scored by the traffic signals they cross and sorted so the
    /// least-interrupted candidate comes first.
    ///
    /// Only invalid input is an error. A profile whose directions call fails
    /// is dropped; if every profile fails the result simply carries no
    /// candidates and the caller decides how to present that.
    pub async fn generate_courses(
        &self,
        start: Coordinate,
        target_distance_km: f64,
    ) -> Result<CourseResponse, CourseError> {
        if !target_distance_km.is_finite() || target_distance_km <= 0.0 {
            return Err(CourseError::InvalidDistance);
        }
        if !start.is_finite() {
            return Err(CourseError::InvalidCoordinate);
        }

        let search_radius_km = target_distance_km / 2.0;
        let search_radius_m = search_radius_km * 1000.0;

        tracing::info!(
            "Generating courses: target {:.1}km around ({:.4}, {:.4}), {} profiles, signal radius {:.0}m",
            target_distance_km,
            start.lat,
            start.lon,
            COURSE_PROFILES.len(),
            search_radius_m
        );

        let route_requests = COURSE_PROFILES.iter().map(|profile| {
            let directions = Arc::clone(&self.directions);
            async move {
                let adjusted = destination_point(start, START_PERTURBATION_KM, profile.angle_offset);
                let waypoints = plan_loop(
                    adjusted,
                    target_distance_km,
                    LIVE_WAYPOINT_COUNT,
                    profile.angle_offset,
                )?;
                directions.route(&waypoints, TravelProfile::Walking).await
            }
        });

        let (signals, route_results) = tokio::join!(
            self.signals.fetch_signals(start, search_radius_m),
            join_all(route_requests),
        );

        let generated_at = Utc::now();
        let mut courses = Vec::with_capacity(COURSE_PROFILES.len());

        for (profile, result) in COURSE_PROFILES.iter().zip(route_results) {
            let route = match result {
                Ok(route) => route,
                Err(err) => {
                    tracing::warn!("Dropped profile '{}': {err}", profile.key);
                    continue;
                }
            };

            if !is_closed_loop(&route, start) {
                tracing::warn!(
                    "Dropped profile '{}': polyline does not close at the start point",
                    profile.key
                );
                continue;
            }

            let elevation_gain_m = route
                .elevation_gain_m
                .unwrap_or_else(|| self.estimate_elevation_gain());
            let score = score_route(&route.path, &signals, self.proximity_m);

            tracing::info!(
                "Accepted '{}': {:.0}m, {} signals, ascent {:.0}m",
                profile.key,
                route.distance_m,
                score.count,
                elevation_gain_m
            );

            courses.push(Course {
                id: format!("course-{}-{}", profile.key, generated_at.timestamp_millis()),
                name: profile.name.to_string(),
                description: describe_course(route.distance_m, elevation_gain_m),
                color: profile.color.to_string(),
                distance_m: route.distance_m,
                duration_s: route.duration_s,
                elevation_gain_m,
                signal_count: score.count,
                difficulty: derive_difficulty(route.distance_m, elevation_gain_m),
                path: route.path,
                signals: score.signals_on_route,
            });
        }

        // Fewest interruptions first; stable, so ties keep profile order.
        courses.sort_by_key(|course| course.signal_count);

        Ok(CourseResponse {
            courses,
            generated_at,
            search_radius_km,
        })
    }

    fn estimate_elevation_gain(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.random_range(ESTIMATED_ELEVATION_RANGE_M),
            Err(_) => ESTIMATED_ELEVATION_RANGE_M.start,
        }
    }
}

fn is_closed_loop(route: &RouteResult, start: Coordinate) -> bool {
    let (Some(first), Some(last)) = (route.path.first(), route.path.last()) else {
        return false;
    };
    route.path.len() >= 2
        && haversine_m(first.coordinate(), start) <= LOOP_CLOSURE_TOLERANCE_M
        && haversine_m(last.coordinate(), start) <= LOOP_CLOSURE_TOLERANCE_M
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directions::{DirectionsError, MockDirections};
    use crate::signals::SyntheticSignals;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const START: Coordinate = Coordinate {
        lat: 35.6812,
        lon: 139.7671,
    };

    fn mock_planner() -> CoursePlanner {
        CoursePlanner::seeded(
            Arc::new(MockDirections::seeded(3)),
            Arc::new(SyntheticSignals::seeded(3)),
            3,
        )
    }

    /// Test double that fails the first `failures` calls it receives and
    /// delegates the rest to the mock backend.
    struct FlakyDirections {
        inner: MockDirections,
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyDirections {
        fn new(failures: usize) -> Self {
            Self {
                inner: MockDirections::seeded(3),
                failures,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DirectionsGateway for FlakyDirections {
        async fn route(
            &self,
            waypoints: &[Coordinate],
            profile: TravelProfile,
        ) -> Result<RouteResult, DirectionsError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(DirectionsError::Api {
                    status: 502,
                    message: "bad gateway".to_string(),
                });
            }
            self.inner.route(waypoints, profile).await
        }
    }

    fn flaky_planner(failures: usize) -> CoursePlanner {
        CoursePlanner::seeded(
            Arc::new(FlakyDirections::new(failures)),
            Arc::new(SyntheticSignals::seeded(3)),
            3,
        )
    }

    #[tokio::test]
    async fn test_three_profiles_yield_three_sorted_candidates() {
        let response = mock_planner().generate_courses(START, 5.0).await.unwrap();

        assert_eq!(response.courses.len(), 3);
        for course in &response.courses {
            assert!((course.distance_m - 5000.0).abs() < 0.01);
        }
        for pair in response.courses.windows(2) {
            assert!(pair[0].signal_count <= pair[1].signal_count);
        }
        assert_eq!(response.search_radius_km, 2.5);
    }

    #[tokio::test]
    async fn test_signal_count_matches_attributed_signals() {
        let response = mock_planner().generate_courses(START, 5.0).await.unwrap();

        for course in &response.courses {
            assert_eq!(course.signal_count as usize, course.signals.len());
        }
    }

    #[tokio::test]
    async fn test_candidate_ids_are_unique_within_batch() {
        let response = mock_planner().generate_courses(START, 5.0).await.unwrap();

        let mut ids: Vec<&str> = response.courses.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), response.courses.len());
    }

    #[tokio::test]
    async fn test_one_failed_profile_drops_one_candidate() {
        let response = flaky_planner(1).generate_courses(START, 5.0).await.unwrap();
        assert_eq!(response.courses.len(), 2);
    }

    #[tokio::test]
    async fn test_all_profiles_failing_yields_empty_result() {
        let response = flaky_planner(3).generate_courses(START, 5.0).await.unwrap();
        assert!(response.courses.is_empty());
        assert!(response.generated_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_zero_distance_is_invalid() {
        let result = mock_planner().generate_courses(START, 0.0).await;
        assert!(matches!(result, Err(CourseError::InvalidDistance)));
    }

    #[tokio::test]
    async fn test_negative_distance_is_invalid() {
        let result = mock_planner().generate_courses(START, -1.0).await;
        assert!(matches!(result, Err(CourseError::InvalidDistance)));
    }

    #[tokio::test]
    async fn test_nan_start_is_invalid() {
        let start = Coordinate {
            lat: f64::NAN,
            lon: 139.0,
        };
        let result = mock_planner().generate_courses(start, 5.0).await;
        assert!(matches!(result, Err(CourseError::InvalidCoordinate)));
    }

    #[test]
    fn test_difficulty_thresholds() {
        // 4 km, 1% gradient
        assert_eq!(derive_difficulty(4000.0, 40.0), Difficulty::Easy);
        // 4 km, 3% gradient
        assert_eq!(derive_difficulty(4000.0, 120.0), Difficulty::Moderate);
        // 8 km, 1% gradient: too long for easy
        assert_eq!(derive_difficulty(8000.0, 80.0), Difficulty::Moderate);
        // 8 km, 5% gradient
        assert_eq!(derive_difficulty(8000.0, 400.0), Difficulty::Hard);
        // 12 km is hard regardless of gradient
        assert_eq!(derive_difficulty(12_000.0, 0.0), Difficulty::Hard);
    }

    #[test]
    fn test_description_phrasing() {
        assert_eq!(describe_course(5000.0, 10.0), "5.0 km flat course");
        assert_eq!(
            describe_course(5000.0, 30.0),
            "5.0 km with gentle rolling hills"
        );
        assert_eq!(
            describe_course(5000.0, 62.4),
            "5.0 km challenge course with 62 m of climb"
        );
    }
}
