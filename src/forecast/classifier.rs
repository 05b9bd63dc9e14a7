use crate::domain::{ForecastEntry, RiskThresholds, RiskTier, TimeSeries};
use crate::model::Node;

/// Classifies one node from its forecast water-level series.
///
/// `levels` must be absolute elevations in the same datum as the node's ground
/// elevation. A node without output is reported as [`RiskTier::NoData`].
pub fn classify(node: &Node, levels: Option<&TimeSeries>, thresholds: &RiskThresholds) -> ForecastEntry {
    let Some(levels) = levels else {
        return ForecastEntry::no_data(&node.id, node.ground_elevation);
    };

    let peak = levels.peak();
    let freeboard = node.ground_elevation - peak.value;
    let risk_tier = RiskTier::from_freeboard(freeboard, thresholds);

    ForecastEntry {
        node_id: node.id.clone(),
        ground_elevation: node.ground_elevation,
        max_level: Some(peak.value),
        timestamp_of_max: Some(peak.minute),
        freeboard: Some(freeboard),
        current_level: Some(levels.last().value),
        risk_tier,
        flood_probability: risk_tier.flood_probability(),
        levels: Some(levels.clone()),
    }
}
