use std::sync::Arc;

use super::inp::{self, TIMESERIES};
use super::NetworkModel;
use crate::domain::TimeSeries;
use crate::error::ForecastError;

/// A model with one series table replaced, built per simulation run.
///
/// The base model is shared, never copied or modified. Rendering to the engine's text
/// format is deferred to [`TransientModel::render`], which the runner calls when it
/// writes the working file.
#[derive(Debug, Clone)]
pub struct TransientModel {
    base: Arc<NetworkModel>,
    target: String,
    series: TimeSeries,
}

impl TransientModel {
    pub fn base(&self) -> &Arc<NetworkModel> {
        &self.base
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    /// Full model text with the target's `[TIMESERIES]` rows swapped for the new series.
    pub fn render(&self) -> String {
        let doc = &self.base.document;
        let mut out = String::new();
        for line in &doc.preamble {
            out.push_str(line);
            out.push('\n');
        }

        let mut replaced = false;
        for section in &doc.sections {
            out.push('[');
            out.push_str(&section.name);
            out.push_str("]\n");
            if section.name != TIMESERIES {
                for line in &section.lines {
                    out.push_str(line);
                    out.push('\n');
                }
                continue;
            }

            for line in section.lines.iter().filter(|l| !self.is_target_row(l)) {
                out.push_str(line);
                out.push('\n');
            }
            if !replaced {
                for s in self.series.samples() {
                    out.push_str(&inp::series_row(&self.target, s.minute, s.value));
                    out.push('\n');
                }
                out.push('\n');
                replaced = true;
            }
        }
        out
    }

    fn is_target_row(&self, line: &str) -> bool {
        let data = line.split(';').next().unwrap_or_default();
        data.split_whitespace().next() == Some(self.target.as_str())
    }
}

/// Substitutes `series` for the inflow table `series_name` of `base`.
pub fn with_inflow(
    base: &Arc<NetworkModel>,
    series_name: &str,
    series: TimeSeries,
) -> Result<TransientModel, ForecastError> {
    if !base.has_series(series_name) {
        return Err(ForecastError::UnknownSeriesTarget(series_name.to_string()));
    }
    Ok(TransientModel {
        base: Arc::clone(base),
        target: series_name.to_string(),
        series,
    })
}
