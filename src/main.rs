use anyhow::Result;
use gridtwin::{api, config::Config, controller, telemetry};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load()?;
    telemetry::init_tracing(&cfg.logging);

    let app_state = controller::AppState::new(cfg.clone()).await?;
    let app = api::router(app_state.clone());

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0, the API has no authentication");
    }
    info!(%addr, mode = %cfg.simulation.mode, "starting gridtwin");

    let cancel = CancellationToken::new();
    let ticker = controller::spawn_controller_tasks(&app_state, cancel.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Err(e) = ticker.await {
        warn!(error = %e, "simulation loop ended abnormally");
    }
    info!("shutdown complete");
    Ok(())
}
