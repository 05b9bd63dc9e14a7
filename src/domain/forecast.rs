use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::{Sample, TimeSeries};

/// Flood risk tier of a node, in ascending order of severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskTier {
    /// The engine produced no output for the node.
    NoData,
    Safe,
    Watch,
    Warning,
    Critical,
}

impl RiskTier {
    /// Tier for a given freeboard (ground elevation minus forecast maximum level).
    pub fn from_freeboard(freeboard: f64, thresholds: &RiskThresholds) -> Self {
        if freeboard <= 0.0 {
            Self::Critical
        } else if freeboard <= thresholds.warning_margin {
            Self::Warning
        } else if freeboard <= thresholds.watch_margin {
            Self::Watch
        } else {
            Self::Safe
        }
    }

    /// Indicative flooding probability reported alongside the tier.
    pub fn flood_probability(&self) -> Option<f64> {
        match self {
            Self::NoData => None,
            Self::Safe => Some(0.1),
            Self::Watch => Some(0.3),
            Self::Warning => Some(0.7),
            Self::Critical => Some(0.9),
        }
    }
}

/// Freeboard margins (metres below ground) that separate the risk tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub warning_margin: f64,
    pub watch_margin: f64,
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<(), String> {
        if !self.warning_margin.is_finite() || !self.watch_margin.is_finite() {
            return Err("risk margins must be finite".to_string());
        }
        if self.warning_margin < 0.0 {
            return Err("warning_margin must be non-negative".to_string());
        }
        if self.warning_margin > self.watch_margin {
            return Err("warning_margin must be <= watch_margin".to_string());
        }
        Ok(())
    }
}

/// Forecast for one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastEntry {
    pub node_id: String,
    pub ground_elevation: f64,
    pub max_level: Option<f64>,
    /// Minute of the first occurrence of `max_level`.
    pub timestamp_of_max: Option<f64>,
    pub freeboard: Option<f64>,
    /// Level at the end of the horizon.
    pub current_level: Option<f64>,
    pub risk_tier: RiskTier,
    pub flood_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<TimeSeries>,
}

impl ForecastEntry {
    pub fn no_data(node_id: impl Into<String>, ground_elevation: f64) -> Self {
        Self {
            node_id: node_id.into(),
            ground_elevation,
            max_level: None,
            timestamp_of_max: None,
            freeboard: None,
            current_level: None,
            risk_tier: RiskTier::NoData,
            flood_probability: None,
            levels: None,
        }
    }

    pub fn peak(&self) -> Option<Sample> {
        Some(Sample::new(self.timestamp_of_max?, self.max_level?))
    }
}

/// Cacheable outcome of one forecast run, shared read-only between callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub fingerprint: String,
    pub target_series: String,
    pub duration_hours: u32,
    pub step_minutes: u32,
    pub computed_at: DateTime<Utc>,
    /// Ordered by node id.
    pub entries: Vec<ForecastEntry>,
}

impl ForecastResult {
    pub fn entry(&self, node_id: &str) -> Option<&ForecastEntry> {
        self.entries
            .binary_search_by(|e| e.node_id.as_str().cmp(node_id))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn tier_counts(&self) -> BTreeMap<RiskTier, usize> {
        let mut counts: BTreeMap<RiskTier, usize> = RiskTier::iter().map(|t| (t, 0)).collect();
        for e in &self.entries {
            *counts.entry(e.risk_tier).or_insert(0) += 1;
        }
        counts
    }
}

/// Single-node view of a forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeForecast {
    pub fingerprint: String,
    pub computed_at: DateTime<Utc>,
    pub entry: ForecastEntry,
}

/// Semantically unvalidated forecast input. Missing fields take configured defaults;
/// a missing series falls back to the model's own table for the target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub series: Option<Vec<Sample>>,
    #[serde(default)]
    pub target_series: Option<String>,
    #[serde(default)]
    pub duration_hours: Option<u32>,
    #[serde(default)]
    pub step_minutes: Option<u32>,
}
