//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::orchestrator::SyncOrchestrator;
use crate::routes::{sync_router, AppState};
use axum::Router;
use crmsync_core::{EntityRepository, MemoryRepository};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// The sync server.
///
/// Owns a [`SyncOrchestrator`] and exposes it over HTTP.
///
/// # Example
///
/// ```
/// use crmsync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::in_memory(ServerConfig::default());
/// let status = server.orchestrator().status();
/// assert!(status.sync_available);
/// ```
pub struct SyncServer {
    orchestrator: Arc<SyncOrchestrator>,
}

impl SyncServer {
    /// Creates a server over an existing repository.
    pub fn new(repo: Arc<dyn EntityRepository>, config: ServerConfig) -> Self {
        Self {
            orchestrator: Arc::new(SyncOrchestrator::new(repo, config)),
        }
    }

    /// Creates a server over an empty in-memory repository.
    pub fn in_memory(config: ServerConfig) -> Self {
        Self::new(Arc::new(MemoryRepository::new()), config)
    }

    /// Returns the orchestrator.
    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Builds the HTTP router.
    pub fn router(&self) -> Router {
        sync_router(AppState::new(Arc::clone(&self.orchestrator)))
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.orchestrator.config().bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("failed to bind {addr}: {e}")))?;
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        info!(addr = %local, "sync server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        info!("sync server stopped");
        Ok(())
    }
}
