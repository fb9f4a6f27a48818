//! Serve command implementation.

use crmsync_server::{ServerConfig, SyncServer};
use std::net::SocketAddr;
use tracing::info;

/// Runs the sync server until Ctrl-C.
pub async fn run(
    bind: SocketAddr,
    max_push_batch: usize,
    pull_limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::new(bind)
        .with_max_push_batch(max_push_batch)
        .with_default_pull_limit(pull_limit);
    let server = SyncServer::in_memory(config);

    server
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}
