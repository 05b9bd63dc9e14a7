use std::time::Duration;

use serde::Serialize;
use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::timeseries::NormalizationError;

/// Failure kinds reported by the forecast components.
///
/// Cloneable so a single failed computation can be handed to every caller waiting on
/// the same fingerprint.
#[derive(Debug, Clone, Error)]
pub enum ForecastError {
    #[error("invalid time series: {0}")]
    Validation(#[from] NormalizationError),

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("unknown series target: {0}")]
    UnknownSeriesTarget(String),

    #[error("simulation did not converge: {reason}")]
    SimulationFailed { reason: String },

    #[error("simulation engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("simulation timed out after {}s", .0.as_secs())]
    SimulationTimeout(Duration),
}

/// Stable, transport-independent name of a failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
pub enum ErrorKind {
    ValidationError,
    UnknownNode,
    UnknownSeriesTarget,
    SimulationFailed,
    EngineUnavailable,
    SimulationTimeout,
}

impl ForecastError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForecastError::Validation(_) => ErrorKind::ValidationError,
            ForecastError::UnknownNode(_) => ErrorKind::UnknownNode,
            ForecastError::UnknownSeriesTarget(_) => ErrorKind::UnknownSeriesTarget,
            ForecastError::SimulationFailed { .. } => ErrorKind::SimulationFailed,
            ForecastError::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            ForecastError::SimulationTimeout(_) => ErrorKind::SimulationTimeout,
        }
    }

    /// Whether the caller can fix the failure by changing the request.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ValidationError | ErrorKind::UnknownNode | ErrorKind::UnknownSeriesTarget
        )
    }
}

/// Pipeline step that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Lookup,
    Normalize,
    Mutate,
    Simulate,
}

/// A component failure tagged with the stage it came from.
#[derive(Debug, Clone, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: ForecastError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: impl Into<ForecastError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Attaches a stage to component results.
pub trait StageExt<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T, E: Into<ForecastError>> StageExt<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}
