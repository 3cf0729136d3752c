//! Error taxonomy for the scene pipeline.
use thiserror::Error;

/// Errors raised when configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive (got {value})")]
    NonPositive { field: &'static str, value: f64 },
    #[error("{field} must be at least {min} (got {value})")]
    MinViolation {
        field: &'static str,
        min: f64,
        value: f64,
    },
    #[error("{field} must be between {min} and {max} (got {value})")]
    RangeViolation {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("acceleration bounds must satisfy a_min < 0 < a_max (got {a_min}, {a_max})")]
    AccelBounds { a_min: f64, a_max: f64 },
    #[error("{field} range is inverted (low {low} > high {high})")]
    BoundsInverted {
        field: String,
        low: f64,
        high: f64,
    },
}

/// Errors surfaced while preparing or running a single scene.
#[derive(Debug, Error)]
pub enum CfdgError {
    /// A required external collaborator was not supplied at construction time.
    #[error("missing required collaborator: {0}")]
    MissingCollaborator(&'static str),
    #[error("scenario {scene_token} has no frames")]
    EmptyScenario { scene_token: String },
    #[error("scenario {scene_token} frame {index} goes back in time ({previous} -> {current})")]
    UnorderedFrames {
        scene_token: String,
        index: usize,
        previous: f64,
        current: f64,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A collaborator (scene source, map provider, sink) failed.
    #[error("{name} failed: {source}")]
    Collaborator {
        name: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CfdgError {
    /// Wrap a collaborator failure, keeping its source chain.
    pub fn collaborator<E>(name: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Collaborator {
            name,
            source: Box::new(source),
        }
    }
}

pub type Result<T, E = CfdgError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_convert_into_pipeline_errors() {
        let err: CfdgError = ConfigError::NonPositive {
            field: "vehicle.wheel_base",
            value: 0.0,
        }
        .into();
        assert!(err.to_string().contains("vehicle.wheel_base"));
    }

    #[test]
    fn collaborator_errors_keep_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such scene");
        let err = CfdgError::collaborator("scenario source", io);
        let source = std::error::Error::source(&err).expect("source kept");
        assert!(source.to_string().contains("no such scene"));
    }
}
