use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::storage::FilesystemMediaStore;
use common::{Clock, SystemClock};
use tracing::info;

use server::config::AppConfig;
use server::database::init_db;
use server::seed::ensure_indexes;
use server::state::AppState;
use server::stories::ExpiryScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = init_db(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    ensure_indexes(&db).await?;

    let media_store = FilesystemMediaStore::new(
        PathBuf::from(&config.storage.media_dir),
        config.storage.max_blob_size,
    )
    .await
    .context("Failed to initialise media store")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sweeper = ExpiryScheduler::new(
        db.clone(),
        clock.clone(),
        Duration::from_secs(config.stories.sweep_interval_secs),
    )
    .start();

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState {
        db,
        config: Arc::new(config),
        media_store: Arc::new(media_store),
        clock,
    };
    let app = server::build_router(state);

    info!("Server running at http://{}", addr);
    info!("Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.stop().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
