use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    domain::{ForecastRequest, ForecastResult, NodeForecast, Sample},
    forecast::SimulationReport,
    state::AppState,
};

/// Forecast request body. Every field is optional; see [`ForecastRequest`].
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ForecastBody {
    #[validate(length(min = 1, max = 128))]
    pub node_id: Option<String>,
    #[validate(length(max = 100_000))]
    pub series: Option<Vec<Sample>>,
    #[validate(length(min = 1, max = 128))]
    pub target_series: Option<String>,
    #[validate(range(min = 1, max = 720))]
    pub duration_hours: Option<u32>,
    #[validate(range(min = 1, max = 1440))]
    pub step_minutes: Option<u32>,
}

impl From<ForecastBody> for ForecastRequest {
    fn from(body: ForecastBody) -> Self {
        ForecastRequest {
            node_id: body.node_id,
            series: body.series,
            target_series: body.target_series,
            duration_hours: body.duration_hours,
            step_minutes: body.step_minutes,
        }
    }
}

fn parse(payload: Result<Json<ForecastBody>, JsonRejection>) -> Result<ForecastRequest, ApiError> {
    let Json(body) = payload?;
    body.validate()?;
    Ok(body.into())
}

/// POST /forecast - Whole-network forecast, or a single node when `node_id` is set
pub async fn forecast(
    State(st): State<AppState>,
    payload: Result<Json<ForecastBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = parse(payload)?;
    let started = Instant::now();

    if let Some(node_id) = request.node_id.clone() {
        let node = st.orchestrator.forecast_one(&node_id, &request).await?;
        return Ok(ApiResponse::success(node)
            .with_duration(started.elapsed().as_millis() as u64)
            .into_response());
    }

    let result: Arc<ForecastResult> = st.orchestrator.forecast_all(&request).await?;
    let count = result.entries.len();
    Ok(ApiResponse::success(result)
        .with_count(count)
        .with_duration(started.elapsed().as_millis() as u64)
        .into_response())
}

/// POST /forecast/:node_id
pub async fn forecast_node(
    State(st): State<AppState>,
    Path(node_id): Path<String>,
    payload: Result<Json<ForecastBody>, JsonRejection>,
) -> Result<ApiResponse<NodeForecast>, ApiError> {
    let request = parse(payload)?;
    let started = Instant::now();
    let node = st.orchestrator.forecast_one(&node_id, &request).await?;
    Ok(ApiResponse::success(node).with_duration(started.elapsed().as_millis() as u64))
}

/// POST /simulation/run - Raw engine run, uncached; solver failures are reported in the body
pub async fn run_simulation(
    State(st): State<AppState>,
    payload: Result<Json<ForecastBody>, JsonRejection>,
) -> Result<ApiResponse<SimulationReport>, ApiError> {
    let request = parse(payload)?;
    let report = st.orchestrator.run_simulation(&request).await?;
    let count = report.nodes.len();
    Ok(ApiResponse::success(report).with_count(count))
}
