use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single observation, timestamped in minutes from the simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub minute: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(minute: f64, value: f64) -> Self {
        Self { minute, value }
    }
}

impl From<(f64, f64)> for Sample {
    fn from((minute, value): (f64, f64)) -> Self {
        Self { minute, value }
    }
}

/// Structural problems with a series of samples.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("series is empty")]
    Empty,
    #[error("timestamps must be strictly increasing (sample {index} at minute {minute})")]
    Unordered { index: usize, minute: f64 },
    #[error("sample {index} is not finite")]
    NonFinite { index: usize },
}

/// Ordered, non-empty sequence of samples with strictly increasing timestamps.
///
/// Construction checks ordering and finiteness only. Sign constraints depend on the
/// physical quantity and are enforced by the normalizer for inflow/depth input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    samples: Vec<Sample>,
}

impl TimeSeries {
    pub fn new(samples: Vec<Sample>) -> Result<Self, SeriesError> {
        if samples.is_empty() {
            return Err(SeriesError::Empty);
        }
        for (index, s) in samples.iter().enumerate() {
            if !s.minute.is_finite() || !s.value.is_finite() {
                return Err(SeriesError::NonFinite { index });
            }
            if index > 0 && s.minute <= samples[index - 1].minute {
                return Err(SeriesError::Unordered {
                    index,
                    minute: s.minute,
                });
            }
        }
        Ok(Self { samples })
    }

    pub fn from_pairs<I>(pairs: I) -> Result<Self, SeriesError>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        Self::new(pairs.into_iter().map(Sample::from).collect())
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Never true for a constructed series.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Sample {
        self.samples[0]
    }

    pub fn last(&self) -> Sample {
        self.samples[self.samples.len() - 1]
    }

    /// Maximum value and the earliest sample that attains it.
    pub fn peak(&self) -> Sample {
        let mut best = self.samples[0];
        for s in &self.samples[1..] {
            if s.value > best.value {
                best = *s;
            }
        }
        best
    }

    /// Value at `minute` if a sample sits exactly on it.
    pub fn value_at(&self, minute: f64) -> Option<f64> {
        self.samples
            .binary_search_by(|s| s.minute.total_cmp(&minute))
            .ok()
            .map(|i| self.samples[i].value)
    }

    /// Linear interpolation with flat extrapolation outside the sampled range.
    pub fn interpolate(&self, minute: f64) -> f64 {
        let idx = self.samples.partition_point(|s| s.minute <= minute);
        if idx == 0 {
            return self.samples[0].value;
        }
        let prev = self.samples[idx - 1];
        if prev.minute == minute || idx == self.samples.len() {
            return prev.value;
        }
        let next = self.samples[idx];
        let weight = (minute - prev.minute) / (next.minute - prev.minute);
        prev.value + weight * (next.value - prev.value)
    }

    /// Same timestamps, every value shifted by `offset`.
    pub fn offset(&self, offset: f64) -> Self {
        Self {
            samples: self
                .samples
                .iter()
                .map(|s| Sample::new(s.minute, s.value + offset))
                .collect(),
        }
    }
}

impl<'de> Deserialize<'de> for TimeSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            samples: Vec<Sample>,
        }
        let raw = Raw::deserialize(deserializer)?;
        TimeSeries::new(raw.samples).map_err(serde::de::Error::custom)
    }
}
