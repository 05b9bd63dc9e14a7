#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use figment::{providers::{Format, Toml}, Figment};
use tempfile::{tempdir, TempDir};

use flood_forecast::config::Config;
use flood_forecast::model::ModelStore;
use flood_forecast::simulation::{EngineError, EngineOutput, OutputQuantity, SimulationEngine};
use flood_forecast::state::AppState;

pub const MODEL: &str = include_str!("../fixtures/catchment.inp");

pub enum FakeOutcome {
    /// Absolute water levels per node.
    Heads(BTreeMap<String, Vec<(f64, f64)>>),
    Diverge(String),
    Crash(String),
}

/// Engine double that counts executions and tracks how many run at once.
pub struct FakeEngine {
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub delay: Duration,
    pub outcome: FakeOutcome,
}

impl FakeEngine {
    pub fn new(outcome: FakeOutcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            delay,
            outcome,
        })
    }

    /// J1 (ground 4.5) peaks at 5.0 after one hour; S1 stays dry; J2 has no output.
    pub fn flooding(delay: Duration) -> Arc<Self> {
        let heads = [
            ("J1".to_string(), vec![(0.0, 0.0), (60.0, 5.0), (120.0, 2.0)]),
            ("S1".to_string(), vec![(0.0, -2.0), (60.0, -1.5), (120.0, -1.8)]),
        ]
        .into_iter()
        .collect();
        Self::new(FakeOutcome::Heads(heads), delay)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SimulationEngine for FakeEngine {
    fn execute(&self, model_path: &Path, _: u32, _: u32) -> Result<EngineOutput, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let rendered = std::fs::read_to_string(model_path);
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);
        rendered?;

        match &self.outcome {
            FakeOutcome::Heads(heads) => Ok(EngineOutput {
                converged: true,
                message: None,
                quantity: OutputQuantity::Head,
                continuity_error_percent: Some(0.02),
                nodes: heads.clone(),
            }),
            FakeOutcome::Diverge(reason) => Ok(EngineOutput {
                converged: false,
                message: Some(reason.clone()),
                quantity: OutputQuantity::Head,
                continuity_error_percent: None,
                nodes: BTreeMap::new(),
            }),
            FakeOutcome::Crash(message) => Err(EngineError::Launch(message.clone())),
        }
    }
}

pub struct Setup {
    pub ttl_seconds: u64,
    pub timeout_secs: u64,
    pub working_file: &'static str,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            ttl_seconds: 600,
            timeout_secs: 30,
            working_file: "shared",
        }
    }
}

pub fn config(setup: &Setup, work_dir: &Path) -> Config {
    let toml = format!(
        r#"
        [server]
        host = "127.0.0.1"
        port = 0

        [model]
        inp_path = "tests/fixtures/catchment.inp"

        [simulation]
        work_dir = "{work_dir}"
        working_file = "{mode}"
        timeout_secs = {timeout}

        [simulation.engine]
        program = "unused"

        [forecast]
        target_series = "Inflow_A"
        duration_hours = 2
        step_minutes = 60

        [risk]
        warning_margin = 0.3
        watch_margin = 1.0

        [cache]
        capacity = 16
        ttl_seconds = {ttl}
        "#,
        work_dir = work_dir.display(),
        mode = setup.working_file,
        timeout = setup.timeout_secs,
        ttl = setup.ttl_seconds,
    );
    Config::from_figment(Figment::new().merge(Toml::string(&toml))).unwrap()
}

/// State wired to `engine`; the working directory lives as long as the returned guard.
pub fn state_with(engine: Arc<FakeEngine>, setup: Setup) -> (AppState, TempDir) {
    let dir = tempdir().unwrap();
    let store = ModelStore::from_text(MODEL).unwrap();
    let state = AppState::with_engine(config(&setup, dir.path()), store, engine);
    (state, dir)
}

pub fn state(engine: Arc<FakeEngine>) -> (AppState, TempDir) {
    state_with(engine, Setup::default())
}
