use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::engine::{EngineOutput, OutputQuantity, SimulationEngine};
use crate::domain::TimeSeries;
use crate::error::ForecastError;
use crate::model::TransientModel;

/// How working files are assigned to simulation runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkingFileMode {
    /// One working file; runs queue behind each other.
    #[default]
    Shared,
    /// A fresh working file per run; runs may overlap.
    PerRequest,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub work_dir: PathBuf,
    pub mode: WorkingFileMode,
    pub timeout: Duration,
    /// Continuity errors above this are reported as numerical instability.
    pub max_continuity_error_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SimulationStatus {
    Converged,
    Failed { reason: String },
}

/// Raw per-node output of one run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub status: SimulationStatus,
    pub quantity: OutputQuantity,
    pub series: BTreeMap<String, TimeSeries>,
    pub elapsed_ms: u64,
}

impl SimulationResult {
    pub fn is_converged(&self) -> bool {
        self.status == SimulationStatus::Converged
    }
}

/// Drives one engine execution per call and owns the working-file lifecycle.
pub struct SimulationRunner {
    engine: Arc<dyn SimulationEngine>,
    config: RunnerConfig,
    shared_slot: Arc<Mutex<()>>,
}

impl SimulationRunner {
    pub fn new(engine: Arc<dyn SimulationEngine>, config: RunnerConfig) -> Self {
        Self {
            engine,
            config,
            shared_slot: Arc::new(Mutex::new(())),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    fn working_path(&self) -> PathBuf {
        match self.config.mode {
            WorkingFileMode::Shared => self.config.work_dir.join("transient_model.inp"),
            WorkingFileMode::PerRequest => self
                .config
                .work_dir
                .join(format!("transient_{}.inp", Uuid::new_v4().simple())),
        }
    }

    /// Executes `model` and returns the engine's per-node series.
    ///
    /// The engine runs in a detached task that owns the working file and, in shared
    /// mode, the slot lock. A timeout or a dropped caller returns immediately, but the
    /// file is removed and the slot freed only once the engine thread has finished.
    pub async fn run(
        &self,
        model: &TransientModel,
        duration_hours: u32,
        step_minutes: u32,
    ) -> Result<SimulationResult, ForecastError> {
        let turn = match self.config.mode {
            WorkingFileMode::Shared => Some(Arc::clone(&self.shared_slot).lock_owned().await),
            WorkingFileMode::PerRequest => None,
        };

        let working = WorkingFile::create(self.working_path(), &model.render())
            .await
            .map_err(|e| ForecastError::EngineUnavailable(format!("cannot write working file: {e}")))?;
        let lease = Lease { working, _turn: turn };

        let engine = Arc::clone(&self.engine);
        let path = lease.working.path().to_path_buf();
        let started = Instant::now();
        debug!(
            path = %path.display(),
            target = model.target(),
            samples = model.series().len(),
            "simulation started"
        );
        let task = tokio::spawn(async move {
            let joined = tokio::task::spawn_blocking(move || {
                engine.execute(&path, duration_hours, step_minutes)
            })
            .await;
            drop(lease);
            joined
        });

        let joined = match tokio::time::timeout(self.config.timeout, task).await {
            Ok(Ok(joined)) => joined,
            Ok(Err(e)) => {
                warn!(error = %e, "simulation task aborted");
                return Err(ForecastError::EngineUnavailable(format!("simulation task aborted: {e}")));
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.timeout.as_secs(),
                    "simulation timed out; working file held until the engine exits"
                );
                return Err(ForecastError::SimulationTimeout(self.config.timeout));
            }
        };

        let output = match joined {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(error = %e, "simulation engine failed");
                return Err(ForecastError::EngineUnavailable(e.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "simulation engine panicked");
                return Err(ForecastError::EngineUnavailable(format!("engine task aborted: {e}")));
            }
        };

        let result = self.interpret(output, started.elapsed());
        info!(
            elapsed_ms = result.elapsed_ms,
            nodes = result.series.len(),
            converged = result.is_converged(),
            "simulation finished"
        );
        Ok(result)
    }

    fn interpret(&self, output: EngineOutput, elapsed: Duration) -> SimulationResult {
        let status = if !output.converged {
            SimulationStatus::Failed {
                reason: output
                    .message
                    .unwrap_or_else(|| "engine reported non-convergence".to_string()),
            }
        } else {
            match (self.config.max_continuity_error_percent, output.continuity_error_percent) {
                (Some(limit), Some(error)) if error.abs() > limit => SimulationStatus::Failed {
                    reason: format!(
                        "numerical instability: continuity error {error:.2}% exceeds {limit:.2}%"
                    ),
                },
                _ => SimulationStatus::Converged,
            }
        };

        let mut series = BTreeMap::new();
        for (node, rows) in output.nodes {
            match TimeSeries::from_pairs(rows) {
                Ok(s) => {
                    series.insert(node, s);
                }
                Err(e) => warn!(node = %node, error = %e, "discarding malformed node output"),
            }
        }

        SimulationResult {
            status,
            quantity: output.quantity,
            series,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Everything an in-flight execution must keep until the engine thread returns.
/// Field order matters: the file is removed before the slot is released.
struct Lease {
    working: WorkingFile,
    _turn: Option<OwnedMutexGuard<()>>,
}

/// Transient model file that is deleted when dropped.
struct WorkingFile {
    path: PathBuf,
}

impl WorkingFile {
    async fn create(path: PathBuf, contents: &str) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = Self { path };
        tokio::fs::write(&file.path, contents).await?;
        Ok(file)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkingFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "working file released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not remove working file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{mutator::with_inflow, ModelStore};
    use crate::simulation::engine::{EngineError, MockSimulationEngine};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tempfile::{tempdir, TempDir};

    const MODEL: &str = include_str!("../../tests/fixtures/catchment.inp");

    fn transient() -> TransientModel {
        let store = ModelStore::from_text(MODEL).unwrap();
        let series = TimeSeries::from_pairs([(0.0, 1.0), (60.0, 2.0)]).unwrap();
        with_inflow(store.model(), "Inflow_A", series).unwrap()
    }

    fn config(mode: WorkingFileMode, timeout: Duration) -> (RunnerConfig, TempDir) {
        let dir = tempdir().unwrap();
        let cfg = RunnerConfig {
            work_dir: dir.path().join("work"),
            mode,
            timeout,
            max_continuity_error_percent: Some(5.0),
        };
        (cfg, dir)
    }

    fn converged(nodes: &[(&str, Vec<(f64, f64)>)]) -> EngineOutput {
        EngineOutput {
            converged: true,
            message: None,
            quantity: OutputQuantity::Depth,
            continuity_error_percent: Some(0.1),
            nodes: nodes
                .iter()
                .map(|(id, rows)| (id.to_string(), rows.clone()))
                .collect(),
        }
    }

    /// Records the working file it was handed and whether it existed at the time.
    struct RecordingEngine {
        seen: StdMutex<Vec<(PathBuf, bool)>>,
        output: EngineOutput,
        delay: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl RecordingEngine {
        fn new(output: EngineOutput, delay: Duration) -> Self {
            Self {
                seen: StdMutex::new(Vec::new()),
                output,
                delay,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }
    }

    impl SimulationEngine for RecordingEngine {
        fn execute(&self, path: &Path, _: u32, _: u32) -> Result<EngineOutput, EngineError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((path.to_path_buf(), path.exists()));
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    #[tokio::test]
    async fn test_success_writes_then_releases_working_file() {
        let engine = Arc::new(RecordingEngine::new(
            converged(&[("J1", vec![(0.0, 0.1), (60.0, 0.4)])]),
            Duration::ZERO,
        ));
        let (cfg, _dir) = config(WorkingFileMode::Shared, Duration::from_secs(5));
        let runner = SimulationRunner::new(engine.clone(), cfg);

        let result = runner.run(&transient(), 1, 60).await.unwrap();
        assert!(result.is_converged());
        assert_eq!(result.series["J1"].len(), 2);

        let seen = engine.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].1, "engine should see the rendered model");
        assert!(!seen[0].0.exists(), "working file should be removed");
    }

    #[tokio::test]
    async fn test_non_convergence_is_a_result_not_an_error() {
        let mut output = converged(&[]);
        output.converged = false;
        output.message = Some("routing diverged at 03:00".into());
        let (cfg, _dir) = config(WorkingFileMode::Shared, Duration::from_secs(5));
        let runner = SimulationRunner::new(Arc::new(RecordingEngine::new(output, Duration::ZERO)), cfg);

        let result = runner.run(&transient(), 1, 60).await.unwrap();
        assert_eq!(
            result.status,
            SimulationStatus::Failed {
                reason: "routing diverged at 03:00".into()
            }
        );
    }

    #[tokio::test]
    async fn test_continuity_error_above_limit_is_failure() {
        let mut output = converged(&[("J1", vec![(0.0, 0.1)])]);
        output.continuity_error_percent = Some(-12.5);
        let (cfg, _dir) = config(WorkingFileMode::Shared, Duration::from_secs(5));
        let runner = SimulationRunner::new(Arc::new(RecordingEngine::new(output, Duration::ZERO)), cfg);

        let result = runner.run(&transient(), 1, 60).await.unwrap();
        assert!(matches!(result.status, SimulationStatus::Failed { ref reason } if reason.contains("12.50%")));
    }

    #[tokio::test]
    async fn test_malformed_node_output_is_dropped() {
        let output = converged(&[
            ("J1", vec![(0.0, 0.1), (60.0, 0.2)]),
            ("J2", vec![(60.0, 0.1), (0.0, 0.2)]),
        ]);
        let (cfg, _dir) = config(WorkingFileMode::Shared, Duration::from_secs(5));
        let runner = SimulationRunner::new(Arc::new(RecordingEngine::new(output, Duration::ZERO)), cfg);

        let result = runner.run(&transient(), 1, 60).await.unwrap();
        assert!(result.series.contains_key("J1"));
        assert!(!result.series.contains_key("J2"));
    }

    #[tokio::test]
    async fn test_engine_error_is_engine_unavailable() {
        let mut engine = MockSimulationEngine::new();
        engine
            .expect_execute()
            .times(1)
            .returning(|_, _, _| Err(EngineError::Launch("swmm5: not found".into())));
        let (cfg, _dir) = config(WorkingFileMode::Shared, Duration::from_secs(5));
        let work_file = cfg.work_dir.join("transient_model.inp");
        let runner = SimulationRunner::new(Arc::new(engine), cfg);

        let err = runner.run(&transient(), 1, 60).await.unwrap_err();
        assert!(matches!(err, ForecastError::EngineUnavailable(ref m) if m.contains("not found")));
        assert!(!work_file.exists());
    }

    #[tokio::test]
    async fn test_engine_panic_is_engine_unavailable() {
        let mut engine = MockSimulationEngine::new();
        engine
            .expect_execute()
            .returning(|_, _, _| panic!("corrupt temp file"));
        let (cfg, _dir) = config(WorkingFileMode::Shared, Duration::from_secs(5));
        let work_file = cfg.work_dir.join("transient_model.inp");
        let runner = SimulationRunner::new(Arc::new(engine), cfg);

        let err = runner.run(&transient(), 1, 60).await.unwrap_err();
        assert!(matches!(err, ForecastError::EngineUnavailable(_)));
        assert!(!work_file.exists());
    }

    #[tokio::test]
    async fn test_timeout_keeps_working_file_until_engine_exits() {
        let engine = Arc::new(RecordingEngine::new(converged(&[]), Duration::from_millis(300)));
        let (cfg, _dir) = config(WorkingFileMode::Shared, Duration::from_millis(30));
        let work_file = cfg.work_dir.join("transient_model.inp");
        let runner = SimulationRunner::new(engine.clone(), cfg);

        let err = runner.run(&transient(), 1, 60).await.unwrap_err();
        assert!(matches!(err, ForecastError::SimulationTimeout(_)));
        assert!(work_file.exists(), "engine is still reading the model");

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(engine.active.load(Ordering::SeqCst), 0);
        assert!(!work_file.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_slot_stays_held_after_timeout() {
        let engine = Arc::new(RecordingEngine::new(converged(&[]), Duration::from_millis(300)));
        let (cfg, _dir) = config(WorkingFileMode::Shared, Duration::from_millis(50));
        let runner = SimulationRunner::new(engine.clone(), cfg);

        let first = runner.run(&transient(), 1, 60).await;
        assert!(matches!(first, Err(ForecastError::SimulationTimeout(_))));
        let started = Instant::now();
        let second = runner.run(&transient(), 1, 60).await;
        assert!(matches!(second, Err(ForecastError::SimulationTimeout(_))));
        // the second run could only start once the first engine had returned
        assert!(started.elapsed() >= Duration::from_millis(200));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(engine.max_active.load(Ordering::SeqCst), 1);
        let seen = engine.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(_, existed)| *existed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_slot_stays_held_after_caller_is_dropped() {
        let engine = Arc::new(RecordingEngine::new(converged(&[]), Duration::from_millis(300)));
        let (cfg, _dir) = config(WorkingFileMode::Shared, Duration::from_secs(5));
        let runner = SimulationRunner::new(engine.clone(), cfg);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(80), runner.run(&transient(), 1, 60)).await;
        assert!(abandoned.is_err());

        let result = runner.run(&transient(), 1, 60).await.unwrap();
        assert!(result.is_converged());
        assert_eq!(engine.max_active.load(Ordering::SeqCst), 1);
        let seen = engine.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(_, existed)| *existed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_mode_serializes_runs() {
        let engine = Arc::new(RecordingEngine::new(converged(&[]), Duration::from_millis(40)));
        let (cfg, _dir) = config(WorkingFileMode::Shared, Duration::from_secs(5));
        let runner = Arc::new(SimulationRunner::new(engine.clone(), cfg));

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let runner = Arc::clone(&runner);
            set.spawn(async move { runner.run(&transient(), 1, 60).await.map(|_| ()) });
        }
        while let Some(joined) = set.join_next().await {
            joined.unwrap().unwrap();
        }

        assert_eq!(engine.max_active.load(Ordering::SeqCst), 1);
        let seen = engine.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|(p, existed)| *existed && *p == seen[0].0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_request_mode_uses_distinct_files() {
        let engine = Arc::new(RecordingEngine::new(converged(&[]), Duration::from_millis(20)));
        let (cfg, _dir) = config(WorkingFileMode::PerRequest, Duration::from_secs(5));
        let runner = Arc::new(SimulationRunner::new(engine.clone(), cfg));

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..3 {
            let runner = Arc::clone(&runner);
            set.spawn(async move { runner.run(&transient(), 1, 60).await.map(|_| ()) });
        }
        while let Some(joined) = set.join_next().await {
            joined.unwrap().unwrap();
        }

        let seen = engine.seen.lock().unwrap().clone();
        let mut paths: Vec<_> = seen.iter().map(|(p, _)| p.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| !p.exists()));
    }
}
