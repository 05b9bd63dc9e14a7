use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::cache::ForecastCache;
use super::classifier::classify;
use super::fingerprint::{compute_fingerprint, FingerprintInput};
use crate::domain::{
    ForecastEntry, ForecastRequest, ForecastResult, NodeForecast, RiskThresholds, RiskTier,
    TimeSeries,
};
use crate::error::{ForecastError, PipelineError, Stage, StageExt};
use crate::model::{mutator::with_inflow, ModelStore, Node, TransientModel};
use crate::simulation::{OutputQuantity, SimulationResult, SimulationRunner, SimulationStatus};
use crate::timeseries::{normalize, Sampling};

/// Values used for request fields the caller leaves out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDefaults {
    pub target_series: String,
    pub duration_hours: u32,
    pub step_minutes: u32,
}

/// Normalized, fully-resolved inputs of one pipeline run.
#[derive(Debug, Clone)]
struct PreparedRun {
    target_series: String,
    duration_hours: u32,
    step_minutes: u32,
    series: TimeSeries,
}

/// Per-node digest of a raw simulation.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub node_id: String,
    pub max_value: f64,
    pub timestamp_of_max: f64,
    pub final_value: f64,
    pub samples: usize,
}

/// Uncached outcome of a raw simulation run, including solver failures.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub target_series: String,
    pub duration_hours: u32,
    pub step_minutes: u32,
    pub status: SimulationStatus,
    pub quantity: OutputQuantity,
    pub elapsed_ms: u64,
    pub nodes: Vec<NodeSummary>,
}

/// Composes normalize, mutate, simulate and classify behind the cache.
pub struct ForecastOrchestrator {
    store: Arc<ModelStore>,
    runner: Arc<SimulationRunner>,
    cache: Arc<ForecastCache>,
    thresholds: RiskThresholds,
    defaults: ForecastDefaults,
}

impl ForecastOrchestrator {
    pub fn new(
        store: Arc<ModelStore>,
        runner: Arc<SimulationRunner>,
        cache: Arc<ForecastCache>,
        thresholds: RiskThresholds,
        defaults: ForecastDefaults,
    ) -> Self {
        Self {
            store,
            runner,
            cache,
            thresholds,
            defaults,
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn cache(&self) -> &ForecastCache {
        &self.cache
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    pub fn defaults(&self) -> &ForecastDefaults {
        &self.defaults
    }

    /// Forecast for every node of the model, served from the cache when possible.
    pub async fn forecast_all(
        &self,
        request: &ForecastRequest,
    ) -> Result<Arc<ForecastResult>, PipelineError> {
        let run = self.prepare(request)?;
        let fingerprint = compute_fingerprint(&FingerprintInput {
            model_digest: &self.store.model().digest,
            target_series: &run.target_series,
            series: &run.series,
            duration_hours: run.duration_hours,
            step_minutes: run.step_minutes,
            thresholds: &self.thresholds,
        });

        self.cache
            .get_or_compute(&fingerprint, || self.compute(run, fingerprint.clone()))
            .await
    }

    /// Forecast for a single node. The node is checked before the cache is consulted.
    pub async fn forecast_one(
        &self,
        node_id: &str,
        request: &ForecastRequest,
    ) -> Result<NodeForecast, PipelineError> {
        let node = self
            .store
            .node(node_id)
            .ok_or_else(|| ForecastError::UnknownNode(node_id.to_string()))
            .at(Stage::Lookup)?;

        let result = self.forecast_all(request).await?;
        let entry = result
            .entry(node_id)
            .cloned()
            .unwrap_or_else(|| ForecastEntry::no_data(node_id, node.ground_elevation));

        Ok(NodeForecast {
            fingerprint: result.fingerprint.clone(),
            computed_at: result.computed_at,
            entry,
        })
    }

    /// Runs the engine without classification or caching. A solver failure is part of
    /// the report rather than an error.
    pub async fn run_simulation(
        &self,
        request: &ForecastRequest,
    ) -> Result<SimulationReport, PipelineError> {
        let run = self.prepare(request)?;
        let transient = self.mutate(&run)?;
        let sim = self
            .runner
            .run(&transient, run.duration_hours, run.step_minutes)
            .await
            .at(Stage::Simulate)?;

        let nodes = sim
            .series
            .iter()
            .map(|(node_id, series)| {
                let peak = series.peak();
                NodeSummary {
                    node_id: node_id.clone(),
                    max_value: peak.value,
                    timestamp_of_max: peak.minute,
                    final_value: series.last().value,
                    samples: series.len(),
                }
            })
            .collect();

        Ok(SimulationReport {
            target_series: run.target_series,
            duration_hours: run.duration_hours,
            step_minutes: run.step_minutes,
            status: sim.status,
            quantity: sim.quantity,
            elapsed_ms: sim.elapsed_ms,
            nodes,
        })
    }

    fn prepare(&self, request: &ForecastRequest) -> Result<PreparedRun, PipelineError> {
        let target_series = request
            .target_series
            .clone()
            .unwrap_or_else(|| self.defaults.target_series.clone());
        let duration_hours = request.duration_hours.unwrap_or(self.defaults.duration_hours);
        let step_minutes = request.step_minutes.unwrap_or(self.defaults.step_minutes);

        let stored = self.store.series(&target_series);
        // targets whose stored table goes negative (tides, stages) accept negative values
        let signed = stored.is_some_and(|s| s.samples().iter().any(|x| x.value < 0.0));
        let sampling = Sampling::from_hours(step_minutes, duration_hours)
            .at(Stage::Normalize)?
            .signed(signed);

        let series = match &request.series {
            Some(raw) => normalize(raw, sampling),
            None => {
                let stored = stored
                    .ok_or_else(|| ForecastError::UnknownSeriesTarget(target_series.clone()))
                    .at(Stage::Lookup)?;
                normalize(stored.samples(), sampling)
            }
        }
        .at(Stage::Normalize)?;

        Ok(PreparedRun {
            target_series,
            duration_hours,
            step_minutes,
            series,
        })
    }

    fn mutate(&self, run: &PreparedRun) -> Result<TransientModel, PipelineError> {
        with_inflow(self.store.model(), &run.target_series, run.series.clone()).at(Stage::Mutate)
    }

    async fn compute(
        &self,
        run: PreparedRun,
        fingerprint: String,
    ) -> Result<ForecastResult, PipelineError> {
        let transient = self.mutate(&run)?;
        let sim = self
            .runner
            .run(&transient, run.duration_hours, run.step_minutes)
            .await
            .at(Stage::Simulate)?;

        if let SimulationStatus::Failed { reason } = &sim.status {
            warn!(fingerprint = %fingerprint, reason = %reason, "simulation did not converge");
            return Err(PipelineError::new(
                Stage::Simulate,
                ForecastError::SimulationFailed {
                    reason: reason.clone(),
                },
            ));
        }

        let entries: Vec<ForecastEntry> = self
            .store
            .nodes()
            .map(|node| {
                let levels = water_levels(node, &sim);
                classify(node, levels.as_ref(), &self.thresholds)
            })
            .collect();

        let result = ForecastResult {
            fingerprint,
            target_series: run.target_series,
            duration_hours: run.duration_hours,
            step_minutes: run.step_minutes,
            computed_at: Utc::now(),
            entries,
        };

        let counts = result.tier_counts();
        info!(
            fingerprint = %result.fingerprint,
            nodes = result.entries.len(),
            elapsed_ms = sim.elapsed_ms,
            critical = counts[&RiskTier::Critical],
            warning = counts[&RiskTier::Warning],
            no_data = counts[&RiskTier::NoData],
            "forecast computed"
        );
        Ok(result)
    }
}

/// Engine output for `node` as absolute water levels.
fn water_levels(node: &Node, sim: &SimulationResult) -> Option<TimeSeries> {
    let series = sim.series.get(&node.id)?;
    Some(match sim.quantity {
        OutputQuantity::Depth => series.offset(node.invert_elevation),
        OutputQuantity::Head => series.clone(),
    })
}
