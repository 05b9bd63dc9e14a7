use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::forecast::{ForecastCache, ForecastOrchestrator};
use crate::model::ModelStore;
use crate::simulation::{ProcessEngine, SimulationEngine, SimulationRunner};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub orchestrator: Arc<ForecastOrchestrator>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Loads the model and wires the configured process engine.
    pub fn new(cfg: Config) -> Result<Self> {
        let store = ModelStore::load(&cfg.model.inp_path)
            .with_context(|| format!("loading model {}", cfg.model.inp_path.display()))?;

        if store.series(&cfg.forecast.target_series).is_none() {
            tracing::warn!(
                target_series = %cfg.forecast.target_series,
                "default target series is not defined in the model; requests must name one"
            );
        }

        let engine: Arc<dyn SimulationEngine> = Arc::new(ProcessEngine::new(
            cfg.simulation.engine.program.clone(),
            cfg.simulation.engine.args.clone(),
        ));
        info!(
            program = %cfg.simulation.engine.program.display(),
            working_file = %cfg.simulation.working_file,
            timeout_secs = cfg.simulation.timeout_secs,
            "simulation engine configured"
        );

        Ok(Self::with_engine(cfg, store, engine))
    }

    pub fn with_engine(cfg: Config, store: ModelStore, engine: Arc<dyn SimulationEngine>) -> Self {
        let runner = SimulationRunner::new(engine, cfg.simulation.runner());
        let cache = ForecastCache::new(cfg.cache.capacity, cfg.cache.ttl());
        let orchestrator = ForecastOrchestrator::new(
            Arc::new(store),
            Arc::new(runner),
            Arc::new(cache),
            cfg.risk.thresholds(),
            cfg.forecast.defaults(),
        );

        Self {
            cfg: Arc::new(cfg),
            orchestrator: Arc::new(orchestrator),
            started_at: Utc::now(),
        }
    }
}
