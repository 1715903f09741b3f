use std::time::Duration;

use coordinator::api;
use coordinator::config::NodeConfig;
use coordinator::{launch, logging, persistence};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    logging::init();

    let config = NodeConfig::from_env()?;
    let (sinks, writers) = persistence::file_sinks(&config.data_dir)?;
    let api_addr = config.api_addr;

    let state = launch(config, sinks).await?;

    let app = api::router(state.clone());
    let listener = tokio::net::TcpListener::bind(api_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "admin API listening");

    let shutdown = state.coordinator.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
                _ = shutdown.cancelled() => {}
            }
        })
        .await?;

    state.coordinator.stop();
    state.coordinator.wait().await;
    // Writers exit once the last sink clone is gone with the coordinator.
    drop(state);
    for writer in writers {
        if tokio::time::timeout(Duration::from_secs(5), writer).await.is_err() {
            tracing::warn!("record writer did not finish, some results may be lost");
        }
    }
    tracing::info!("node stopped");
    Ok(())
}
