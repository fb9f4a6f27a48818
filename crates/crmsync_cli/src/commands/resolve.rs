//! Resolve command implementation.

use crmsync_protocol::{resolve, ConflictStrategy, ResolveOutcome, SyncRecord};
use serde_json::Value;
use std::path::Path;

/// Reads a record from a JSON file.
fn read_record(path: &Path) -> Result<SyncRecord, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let value: Value = serde_json::from_slice(&bytes)?;
    Ok(SyncRecord::from_value(value)?)
}

/// Resolves the two records and returns the result as JSON: the resolved
/// record for automatic strategies, the review payload for `manual`.
pub fn run(
    server: &Path,
    client: &Path,
    strategy: &ConflictStrategy,
) -> Result<Value, Box<dyn std::error::Error>> {
    let server = read_record(server)?;
    let client = read_record(client)?;

    let output = match resolve(&server, &client, *strategy) {
        ResolveOutcome::Resolved(resolved) => serde_json::to_value(resolved)?,
        ResolveOutcome::Manual(manual) => serde_json::to_value(manual)?,
    };
    Ok(output)
}
