use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    api::response::ApiResponse,
    domain::RiskThresholds,
    forecast::{CacheStats, ForecastDefaults},
    state::AppState,
};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    started_at: DateTime<Utc>,
    model: ModelHealth,
    risk: RiskThresholds,
    defaults: ForecastDefaults,
    cache: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct ModelHealth {
    digest: String,
    nodes: usize,
    series: usize,
}

/// GET /healthz
pub async fn healthz(State(st): State<AppState>) -> ApiResponse<HealthResponse> {
    let model = st.orchestrator.store().model();
    ApiResponse::success(HealthResponse {
        status: "ok",
        started_at: st.started_at,
        model: ModelHealth {
            digest: model.digest.clone(),
            nodes: model.nodes.len(),
            series: model.series.len(),
        },
        risk: *st.orchestrator.thresholds(),
        defaults: st.orchestrator.defaults().clone(),
        cache: st.orchestrator.cache().stats(),
    })
}
