use axum::extract::{Path, State};

use crate::{
    api::{error::ApiError, response::ApiResponse},
    error::{ForecastError, PipelineError, Stage},
    model::Node,
    state::AppState,
};

/// GET /nodes - Forecastable nodes of the loaded model
pub async fn list_nodes(State(st): State<AppState>) -> ApiResponse<Vec<Node>> {
    let nodes: Vec<Node> = st.orchestrator.store().nodes().cloned().collect();
    let count = nodes.len();
    ApiResponse::success(nodes).with_count(count)
}

/// GET /nodes/:node_id
pub async fn get_node(
    State(st): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<ApiResponse<Node>, ApiError> {
    st.orchestrator
        .store()
        .node(&node_id)
        .cloned()
        .map(ApiResponse::success)
        .ok_or_else(|| PipelineError::new(Stage::Lookup, ForecastError::UnknownNode(node_id)).into())
}
