//! # Simulation
//!
//! Runs a transient model through the hydraulic engine.
//!
//! - **engine**: the black-box [`SimulationEngine`] capability and its output table
//! - **process**: [`ProcessEngine`], which shells out to an engine executable
//! - **runner**: [`SimulationRunner`], which owns the working file, the timeout and the
//!   translation of engine output into per-node series

pub mod engine;
pub mod process;
pub mod runner;

pub use engine::{EngineError, EngineOutput, OutputQuantity, SimulationEngine};
pub use process::ProcessEngine;
pub use runner::{
    RunnerConfig, SimulationResult, SimulationRunner, SimulationStatus, WorkingFileMode,
};
