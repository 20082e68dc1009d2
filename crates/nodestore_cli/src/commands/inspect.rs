//! Inspect command implementation.

use super::VolumePaths;
use nodestore_server::replay_log;
use nodestore_storage::{FileBackend, StorageBackend};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Volume inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Volume name.
    pub volume: String,
    /// Record log size in bytes.
    pub record_log_size: u64,
    /// Volume file size in bytes.
    pub volume_size: u64,
    /// Number of log entries.
    pub entry_count: usize,
    /// Number of tombstones.
    pub tombstone_count: usize,
    /// Number of distinct keys.
    pub key_count: usize,
    /// Sum of live segment sizes.
    pub segment_bytes: u64,
    /// Bytes of a torn entry at the end of the log.
    pub torn_bytes: u64,
    /// Per-key details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<KeyStats>>,
}

/// Statistics for a single key.
#[derive(Debug, Serialize)]
pub struct KeyStats {
    /// Object key.
    pub key: String,
    /// Versions with at least one segment.
    pub versions: Vec<u64>,
    /// Live segments across all versions.
    pub segments: usize,
    /// Timestamp of the newest tombstone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destroyed_at: Option<u64>,
}

#[derive(Default)]
struct KeyAccumulator {
    versions: BTreeSet<u64>,
    segments: usize,
    destroyed_at: Option<u64>,
}

/// Runs the inspect command.
pub fn run(
    paths: &VolumePaths,
    volume: &str,
    show_keys: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    paths.require_record_log()?;
    let log = FileBackend::open(&paths.record_log)?;
    let replay = replay_log(&log)?;
    let volume_size = if paths.volume.exists() {
        FileBackend::open(&paths.volume)?.size()?
    } else {
        0
    };

    let mut keys: BTreeMap<String, KeyAccumulator> = BTreeMap::new();
    let mut tombstone_count = 0;
    let mut segment_bytes = 0;
    for (_, entry) in &replay.entries {
        let acc = keys.entry(entry.key.clone()).or_default();
        if entry.record.is_tombstone() {
            tombstone_count += 1;
            acc.destroyed_at = acc.destroyed_at.max(Some(entry.record.timestamp()));
        } else {
            segment_bytes += entry.location.length;
            acc.segments += 1;
            acc.versions.insert(entry.record.version_number());
        }
    }

    let result = InspectResult {
        volume: volume.to_string(),
        record_log_size: log.size()?,
        volume_size,
        entry_count: replay.entries.len(),
        tombstone_count,
        key_count: keys.len(),
        segment_bytes,
        torn_bytes: replay.torn_bytes,
        keys: show_keys.then(|| {
            keys.into_iter()
                .map(|(key, acc)| KeyStats {
                    key,
                    versions: acc.versions.into_iter().collect(),
                    segments: acc.segments,
                    destroyed_at: acc.destroyed_at,
                })
                .collect()
        }),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Volume: {}", result.volume);
    println!("================");
    println!("Record log:   {} bytes", result.record_log_size);
    println!("Volume file:  {} bytes", result.volume_size);
    println!("Entries:      {}", result.entry_count);
    println!("Tombstones:   {}", result.tombstone_count);
    println!("Keys:         {}", result.key_count);
    println!("Segment data: {} bytes", result.segment_bytes);
    if result.torn_bytes > 0 {
        println!("Torn tail:    {} bytes", result.torn_bytes);
    }

    if let Some(keys) = &result.keys {
        println!();
        println!("Keys:");
        for stats in keys {
            print!(
                "  {} versions={:?} segments={}",
                stats.key, stats.versions, stats.segments
            );
            if let Some(at) = stats.destroyed_at {
                print!(" destroyed_at={at}");
            }
            println!();
        }
    }
}
