use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Sample, SeriesError, TimeSeries};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizationError {
    #[error("series is empty")]
    EmptySeries,
    #[error("timestamps must be strictly increasing (sample {index} at minute {minute})")]
    UnorderedTimestamps { index: usize, minute: f64 },
    #[error("sample {index} has invalid timestamp {minute}")]
    InvalidTimestamp { index: usize, minute: f64 },
    #[error("sample {index} has invalid value {value}")]
    InvalidValue { index: usize, value: f64 },
    #[error("invalid sampling parameters: {0}")]
    InvalidParameters(String),
}

impl From<SeriesError> for NormalizationError {
    fn from(e: SeriesError) -> Self {
        match e {
            SeriesError::Empty => NormalizationError::EmptySeries,
            SeriesError::Unordered { index, minute } => {
                NormalizationError::UnorderedTimestamps { index, minute }
            }
            SeriesError::NonFinite { index } => NormalizationError::InvalidValue {
                index,
                value: f64::NAN,
            },
        }
    }
}

/// Target sampling of the engine: a step grid from minute 0 to the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sampling {
    pub step_minutes: u32,
    pub duration_minutes: u32,
    /// Whether values may go below zero, as tide or stage tables do.
    #[serde(default)]
    pub signed: bool,
}

impl Sampling {
    pub fn new(step_minutes: u32, duration_minutes: u32) -> Result<Self, NormalizationError> {
        if step_minutes == 0 {
            return Err(NormalizationError::InvalidParameters(
                "step must be at least one minute".into(),
            ));
        }
        if duration_minutes == 0 {
            return Err(NormalizationError::InvalidParameters(
                "duration must be positive".into(),
            ));
        }
        Ok(Self {
            step_minutes,
            duration_minutes,
            signed: false,
        })
    }

    pub fn signed(self, signed: bool) -> Self {
        Self { signed, ..self }
    }

    pub fn from_hours(step_minutes: u32, duration_hours: u32) -> Result<Self, NormalizationError> {
        Self::new(step_minutes, duration_hours.saturating_mul(60))
    }

    /// Grid timestamps; the horizon itself is always the last point.
    pub fn grid(&self) -> Vec<f64> {
        let step = self.step_minutes;
        let mut points: Vec<f64> = (0..=self.duration_minutes / step)
            .map(|k| f64::from(k * step))
            .collect();
        if self.duration_minutes % step != 0 {
            points.push(f64::from(self.duration_minutes));
        }
        points
    }
}

/// Validates `raw` and resamples it onto `sampling`'s grid.
///
/// Interior grid points are linearly interpolated between the bracketing samples.
/// Points before the first sample take its value and points after the last sample
/// repeat the last observed value, so a series shorter than the horizon is padded
/// rather than rejected. Samples past the horizon are ignored.
pub fn normalize(raw: &[Sample], sampling: Sampling) -> Result<TimeSeries, NormalizationError> {
    if raw.is_empty() {
        return Err(NormalizationError::EmptySeries);
    }
    for (index, s) in raw.iter().enumerate() {
        if !s.minute.is_finite() {
            return Err(NormalizationError::InvalidTimestamp {
                index,
                minute: s.minute,
            });
        }
        if index > 0 && s.minute <= raw[index - 1].minute {
            return Err(NormalizationError::UnorderedTimestamps {
                index,
                minute: s.minute,
            });
        }
        if !s.value.is_finite() || (!sampling.signed && s.value < 0.0) {
            return Err(NormalizationError::InvalidValue {
                index,
                value: s.value,
            });
        }
    }

    let source = TimeSeries::new(raw.to_vec())?;
    let samples = sampling
        .grid()
        .into_iter()
        .map(|minute| Sample::new(minute, source.interpolate(minute)))
        .collect();
    Ok(TimeSeries::new(samples)?)
}
