pub mod cache;
pub mod classifier;
pub mod fingerprint;
pub mod orchestrator;

pub use cache::{CacheStats, ForecastCache};
pub use classifier::classify;
pub use fingerprint::{compute_fingerprint, FingerprintInput};
pub use orchestrator::{ForecastDefaults, ForecastOrchestrator, NodeSummary, SimulationReport};
