pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod model;
pub mod simulation;
pub mod state;
pub mod telemetry;
pub mod timeseries;
