//! Destroy command implementation.

use super::VolumePaths;
use nodestore_server::RecordIndex;
use nodestore_storage::FileBackend;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Writes a tombstone for `key` into an offline record log.
///
/// Without a timestamp the current Unix time in seconds is used.
pub fn run(
    paths: &VolumePaths,
    key: &str,
    timestamp: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    paths.require_record_log()?;
    let timestamp = match timestamp {
        Some(timestamp) => timestamp,
        None => SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs(),
    };

    let index = RecordIndex::open(Arc::new(FileBackend::open(&paths.record_log)?), true)?;
    if index.latest_version(key).is_none() {
        return Err(format!("no live record for key {key}").into());
    }
    let tombstone = index.insert_tombstone(key, timestamp)?;
    println!(
        "destroyed {key} at {} (through version {})",
        tombstone.timestamp(),
        tombstone.version_number()
    );
    Ok(())
}
