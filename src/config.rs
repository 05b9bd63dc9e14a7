use anyhow::{bail, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::RiskThresholds;
use crate::forecast::ForecastDefaults;
use crate::simulation::{RunnerConfig, WorkingFileMode};
use crate::telemetry::LoggingConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub simulation: SimulationConfig,
    pub forecast: ForecastConfig,
    pub risk: RiskConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub enable_cors: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_request_timeout() -> u64 {
    900
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub inp_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub engine: EngineConfig,
    pub work_dir: PathBuf,
    #[serde(default)]
    pub working_file: WorkingFileMode,
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_continuity_error_percent: Option<f64>,
}

impl SimulationConfig {
    pub fn runner(&self) -> RunnerConfig {
        RunnerConfig {
            work_dir: self.work_dir.clone(),
            mode: self.working_file,
            timeout: Duration::from_secs(self.timeout_secs),
            max_continuity_error_percent: self.max_continuity_error_percent,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    pub target_series: String,
    pub duration_hours: u32,
    pub step_minutes: u32,
}

impl ForecastConfig {
    pub fn defaults(&self) -> ForecastDefaults {
        ForecastDefaults {
            target_series: self.target_series.clone(),
            duration_hours: self.duration_hours,
            step_minutes: self.step_minutes,
        }
    }
}

/// Freeboard margins in metres.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    pub warning_margin: f64,
    pub watch_margin: f64,
}

impl RiskConfig {
    pub fn thresholds(&self) -> RiskThresholds {
        RiskThresholds {
            warning_margin: self.warning_margin,
            watch_margin: self.watch_margin,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_seconds: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("FLOOD__").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if let Err(e) = self.risk.thresholds().validate() {
            bail!("invalid risk configuration: {e}");
        }
        if self.simulation.timeout_secs == 0 {
            bail!("simulation.timeout_secs must be positive");
        }
        if let Some(limit) = self.simulation.max_continuity_error_percent {
            if !limit.is_finite() || limit < 0.0 {
                bail!("simulation.max_continuity_error_percent must be a non-negative number");
            }
        }
        if self.forecast.duration_hours == 0 || self.forecast.step_minutes == 0 {
            bail!("forecast.duration_hours and forecast.step_minutes must be positive");
        }
        if self.cache.capacity == 0 {
            bail!("cache.capacity must be at least 1");
        }
        Ok(())
    }
}
