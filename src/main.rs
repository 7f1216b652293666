// Lineup server - JSON API over the scheduling and invitation core

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lineup_core::{api::create_router, app_state::AppState, config::Config, data_seeder::seed_demo};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lineup_core=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let app_state = AppState::new(config.clone()).await?;

    if config.seed_demo {
        let event = seed_demo(&app_state).await?;
        info!(hash = %event.hash, "demo lineup available at /events/by-hash/{}/lineup", event.hash);
    }

    let app = create_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = config.server_address().parse()?;
    info!(%addr, "lineup server starting");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
