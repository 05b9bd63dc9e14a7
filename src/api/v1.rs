use axum::{
    routing::{get, post},
    Router,
};

use crate::{
    api::{forecast, health, nodes},
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/nodes", get(nodes::list_nodes))
        .route("/nodes/:node_id", get(nodes::get_node))
        .route("/forecast", post(forecast::forecast))
        .route("/forecast/:node_id", post(forecast::forecast_node))
        .route("/simulation/run", post(forecast::run_simulation))
        .route("/healthz", get(health::healthz))
        .with_state(state)
}
