use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::engine::{EngineError, EngineOutput, SimulationEngine};

/// Runs an external engine executable per simulation.
///
/// Arguments may contain the placeholders `{model}`, `{duration_hours}` and
/// `{step_minutes}`. With no arguments configured the three values are passed
/// positionally. The process must print an [`EngineOutput`] JSON document on stdout.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn render_args(&self, model_path: &Path, duration_hours: u32, step_minutes: u32) -> Vec<String> {
        let model = model_path.display().to_string();
        if self.args.is_empty() {
            return vec![model, duration_hours.to_string(), step_minutes.to_string()];
        }
        self.args
            .iter()
            .map(|a| {
                a.replace("{model}", &model)
                    .replace("{duration_hours}", &duration_hours.to_string())
                    .replace("{step_minutes}", &step_minutes.to_string())
            })
            .collect()
    }
}

impl SimulationEngine for ProcessEngine {
    fn execute(
        &self,
        model_path: &Path,
        duration_hours: u32,
        step_minutes: u32,
    ) -> Result<EngineOutput, EngineError> {
        let args = self.render_args(model_path, duration_hours, step_minutes);
        debug!(program = %self.program.display(), ?args, "launching simulation engine");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| EngineError::Launch(format!("{}: {e}", self.program.display())))?;

        if !output.status.success() {
            return Err(EngineError::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| EngineError::CorruptOutput(e.to_string()))
    }
}
