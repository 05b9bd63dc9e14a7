use anyhow::Result;
use axum::Router;
use flood_forecast::{api, config, state, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }

    let cfg = Config::load()?;
    init_tracing(&cfg.logging);

    let app_state = state::AppState::new(cfg.clone())?;
    let app: Router = api::router(app_state, &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0, the forecast API will be reachable from the network");
    }
    if cfg.server.request_timeout_secs <= cfg.simulation.timeout_secs {
        warn!(
            request_timeout_secs = cfg.server.request_timeout_secs,
            simulation_timeout_secs = cfg.simulation.timeout_secs,
            "HTTP timeout does not exceed the simulation timeout; slow runs surface as 408"
        );
    }

    info!(%addr, "starting flood forecast service");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
