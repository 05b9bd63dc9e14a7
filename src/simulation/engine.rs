use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// What the engine reports per node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputQuantity {
    /// Water depth above the node invert.
    #[default]
    Depth,
    /// Absolute water surface elevation.
    Head,
}

/// Per-element output table produced by one engine execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub converged: bool,
    /// Solver diagnostic, required when `converged` is false.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub quantity: OutputQuantity,
    /// Flow routing continuity error reported by the solver, in percent.
    #[serde(default)]
    pub continuity_error_percent: Option<f64>,
    /// `(minute, value)` rows per node id.
    pub nodes: BTreeMap<String, Vec<(f64, f64)>>,
}

/// Faults of the engine itself, as opposed to a solver that ran and gave up.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine could not be started: {0}")]
    Launch(String),
    #[error("engine exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
    #[error("engine output is unreadable: {0}")]
    CorruptOutput(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Black-box hydraulic simulation capability.
///
/// Blocking: callers are expected to run it off the async executor.
#[cfg_attr(test, mockall::automock)]
pub trait SimulationEngine: Send + Sync {
    fn execute(
        &self,
        model_path: &Path,
        duration_hours: u32,
        step_minutes: u32,
    ) -> Result<EngineOutput, EngineError>;
}
