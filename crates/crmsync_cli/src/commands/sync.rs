//! Sync command implementation.

use crmsync_engine::{
    ClientConfig, HttpTransport, MemoryReplicaStore, ReqwestClient, SyncClient, SyncStatus,
    TriggerOutcome,
};
use crmsync_protocol::ConflictStrategy;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Loads the replica at `path` (or starts empty), runs one cycle, saves the
/// replica back and returns the resulting status.
pub async fn run(
    url: &str,
    path: &Path,
    strategy: ConflictStrategy,
    timeout_secs: u64,
) -> Result<SyncStatus, Box<dyn std::error::Error>> {
    let store = if path.exists() {
        MemoryReplicaStore::load_from(path)?
    } else {
        info!(path = %path.display(), "starting with an empty replica");
        MemoryReplicaStore::new()
    };
    let store = Arc::new(store);

    let transport = HttpTransport::new(url, ReqwestClient::new(Duration::from_secs(timeout_secs))?);
    let config = ClientConfig::new().with_conflict_strategy(strategy);
    let client = SyncClient::new(config, store.clone(), Arc::new(transport));

    if let TriggerOutcome::Failed(err) = client.sync_now().await {
        // The replica is still saved: confirmed operations left the queue.
        warn!(error = %err, "sync failed");
    }
    store.save_to(path)?;
    Ok(client.status()?)
}
