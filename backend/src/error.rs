use thiserror::Error;

/// Invalid-input conditions of course generation. Provider failures never
/// appear here: failed profiles are dropped and an all-failed batch is an
/// empty (but valid) result.
#[derive(Debug, Error)]
pub enum CourseError {
    #[error("target distance must be a positive, finite number of kilometres")]
    InvalidDistance,
    #[error("start coordinate must have finite latitude and longitude")]
    InvalidCoordinate,
}
