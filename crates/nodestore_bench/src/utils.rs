//! Benchmark utilities.

use bytes::Bytes;
use nodestore_coordinator::{InlineDispatch, VolumeIo};
use nodestore_protocol::{ArchiveKeyNext, RequestId};
use nodestore_record::{ContentFields, ContentRecord};
use nodestore_server::{NodeServer, ServerConfig};
use nodestore_storage::InMemoryBackend;
use rand::Rng;
use std::sync::Arc;

/// Generate random segment data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// A record describing one segment of `size` bytes.
pub fn sample_record(file_name: &str, size: u64) -> ContentRecord {
    ContentRecord::from_fields(ContentFields {
        timestamp: 1_700_000_000,
        version_number: 7,
        segment_number: 1,
        segment_count: 4,
        segment_size: size,
        total_size: size * 4,
        adler32: 0x1234_5678,
        md5: [0xAB; 16],
        file_name: file_name.to_string(),
    })
}

/// A node whose volume and record log live in memory, with inline I/O.
pub fn memory_node() -> NodeServer {
    let dispatch = InlineDispatch::new(VolumeIo::new(Arc::new(InMemoryBackend::new())));
    NodeServer::open(
        ServerConfig::new("bench"),
        Arc::new(InMemoryBackend::new()),
        Arc::new(dispatch),
    )
    .expect("Failed to open in-memory node")
}

/// Builds the requests of one archive transfer.
pub fn archive_transfer(key: &str, segments: usize, segment_size: usize) -> Vec<ArchiveKeyNext> {
    let request_id = RequestId::generate();
    let data = Bytes::from(random_data(segment_size));
    (0..segments)
        .map(|i| ArchiveKeyNext {
            request_id,
            key: key.to_string(),
            timestamp: 1_700_000_000,
            version_number: 1,
            segment_number: i as u8,
            segment_count: segments as u32,
            total_size: (segments * segment_size) as u64,
            adler32: 0,
            md5: [0u8; 16],
            file_name: format!("{key}.bin"),
            data: data.clone(),
        })
        .collect()
}
