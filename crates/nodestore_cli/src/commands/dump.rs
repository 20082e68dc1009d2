//! Dump command implementation.

use super::{hex_encode, VolumePaths};
use nodestore_server::{replay_log, IndexEntry};
use nodestore_storage::FileBackend;
use serde::Serialize;

/// Record log entry representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Offset in the record log.
    pub log_offset: u64,
    /// Object key.
    pub key: String,
    /// True for a tombstone.
    pub tombstone: bool,
    /// Record timestamp.
    pub timestamp: u64,
    /// Version number.
    pub version: u64,
    /// Segment number.
    pub segment: u32,
    /// Segments in the version.
    pub segment_count: u64,
    /// Segment size in bytes.
    pub segment_size: u64,
    /// Object size in bytes.
    pub total_size: u64,
    /// Adler-32 of the segment.
    pub adler32: u64,
    /// MD5 of the segment, hex-encoded.
    pub md5: String,
    /// Original file name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_name: String,
    /// Offset of the segment bytes on the volume.
    pub volume_offset: u64,
    /// Length of the segment bytes.
    pub volume_length: u64,
}

impl RecordInfo {
    fn new(log_offset: u64, entry: &IndexEntry) -> Self {
        let record = &entry.record;
        Self {
            log_offset,
            key: entry.key.clone(),
            tombstone: record.is_tombstone(),
            timestamp: record.timestamp(),
            version: record.version_number(),
            segment: record.segment_number(),
            segment_count: record.segment_count(),
            segment_size: record.segment_size(),
            total_size: record.total_size(),
            adler32: record.adler32(),
            md5: hex_encode(record.md5()),
            file_name: record.file_name().to_string(),
            volume_offset: entry.location.offset,
            volume_length: entry.location.length,
        }
    }
}

/// Runs the dump command.
pub fn run(
    paths: &VolumePaths,
    limit: Option<usize>,
    start_offset: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    paths.require_record_log()?;
    let backend = FileBackend::open(&paths.record_log)?;
    let replay = replay_log(&backend)?;

    let records: Vec<RecordInfo> = replay
        .entries
        .iter()
        .filter(|(offset, _)| *offset >= start_offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(offset, entry)| RecordInfo::new(*offset, entry))
        .collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
            if replay.torn_bytes > 0 {
                println!();
                println!("torn tail: {} bytes after offset {}", replay.torn_bytes, replay.valid_len);
            }
        }
    }

    Ok(())
}

fn print_text_output(records: &[RecordInfo]) {
    println!("Record Log ({} entries)", records.len());
    println!("================");
    println!();

    for record in records {
        let kind = if record.tombstone { "TOMBSTONE" } else { "SEGMENT" };
        print!(
            "[{:08}] {:9} {} v{} seg={}",
            record.log_offset, kind, record.key, record.version, record.segment
        );
        print!(" ts={}", record.timestamp);
        if !record.tombstone {
            print!(
                " of={} size={} at={}+{}",
                record.segment_count, record.segment_size, record.volume_offset, record.volume_length
            );
            if !record.file_name.is_empty() {
                print!(" file={}", record.file_name);
            }
        }
        println!();
    }
}
