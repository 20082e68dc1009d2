//! Test fixtures and storage node helpers.
//!
//! Provides convenience functions for setting up test nodes and driving
//! whole archive and retrieve transfers against them.

use bytes::Bytes;
use nodestore_coordinator::{InlineDispatch, VolumeIo};
use nodestore_protocol::{
    ArchiveKeyNext, ArchiveKeyNextReply, RequestId, RetrieveKeyNext, RetrieveKeyNextReply,
};
use nodestore_server::{NodeServer, ServerConfig};
use nodestore_storage::{FileBackend, InMemoryBackend, SharedBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A storage node running its I/O inline, with automatic cleanup.
pub struct TestNode {
    /// The node instance.
    pub server: NodeServer,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestNode {
    /// Creates a node whose volume and record log live in memory.
    pub fn memory() -> Self {
        let volume: SharedBackend = Arc::new(InMemoryBackend::new());
        let server = NodeServer::open(
            ServerConfig::new("test"),
            Arc::new(InMemoryBackend::new()),
            Arc::new(InlineDispatch::new(VolumeIo::new(volume))),
        )
        .expect("Failed to open in-memory node");
        Self {
            server,
            _temp_dir: None,
        }
    }

    /// Creates a node backed by files in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let server = open_file_node(&temp_dir);
        Self {
            server,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Reopens a file-based node over the same files, as after a restart.
    ///
    /// # Panics
    ///
    /// Panics if the node is in-memory.
    pub fn reopen(self) -> Self {
        let temp_dir = self._temp_dir.expect("Only file nodes can be reopened");
        drop(self.server);
        let server = open_file_node(&temp_dir);
        Self {
            server,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the data directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Archives `segments` as version `version` of `key` under a fresh
    /// request-id, stopping at the first error reply.
    pub fn archive(&self, key: &str, version: u32, segments: &[Bytes]) -> Vec<ArchiveKeyNextReply> {
        let mut replies = Vec::with_capacity(segments.len());
        for request in archive_requests(RequestId::generate(), key, version, segments) {
            let reply = self.server.archive_key_next(request);
            let failed = reply.is_error();
            replies.push(reply);
            if failed {
                break;
            }
        }
        replies
    }

    /// Retrieves `segment_count` segments of `key` under a fresh request-id.
    ///
    /// Returns the payloads, or the first error reply.
    pub fn retrieve(
        &self,
        key: &str,
        version: u32,
        segment_count: u8,
    ) -> Result<Vec<Bytes>, RetrieveKeyNextReply> {
        let request_id = RequestId::generate();
        (0..segment_count)
            .map(|segment_number| {
                let reply = self.server.retrieve_key_next(RetrieveKeyNext {
                    request_id,
                    key: key.to_string(),
                    version_number: version,
                    segment_number,
                });
                if reply.is_error() {
                    Err(reply)
                } else {
                    Ok(reply.into_payload())
                }
            })
            .collect()
    }
}

impl std::ops::Deref for TestNode {
    type Target = NodeServer;

    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

fn open_file_node(temp_dir: &TempDir) -> NodeServer {
    let volume: SharedBackend = Arc::new(
        FileBackend::open_with_create_dirs(&temp_dir.path().join("volume.dat"))
            .expect("Failed to create volume backend"),
    );
    let record_log: SharedBackend = Arc::new(
        FileBackend::open_with_create_dirs(&temp_dir.path().join("records.log"))
            .expect("Failed to create record log backend"),
    );
    NodeServer::open(
        ServerConfig::new("test").with_sync_on_insert(true),
        record_log,
        Arc::new(InlineDispatch::new(VolumeIo::new(volume))),
    )
    .expect("Failed to open file node")
}

/// Builds the archive requests of one transfer, one per segment.
pub fn archive_requests(
    request_id: RequestId,
    key: &str,
    version: u32,
    segments: &[Bytes],
) -> Vec<ArchiveKeyNext> {
    let total_size = segments.iter().map(|s| s.len() as u64).sum();
    segments
        .iter()
        .enumerate()
        .map(|(i, data)| ArchiveKeyNext {
            request_id,
            key: key.to_string(),
            timestamp: 1_700_000_000,
            version_number: version,
            segment_number: i as u8,
            segment_count: segments.len() as u32,
            total_size,
            adler32: 0,
            md5: [0u8; 16],
            file_name: format!("{key}.bin"),
            data: data.clone(),
        })
        .collect()
}

/// Builds `count` distinct segment payloads for `key`.
pub fn segment_payloads(key: &str, count: usize) -> Vec<Bytes> {
    (0..count)
        .map(|i| Bytes::from(format!("{key}:segment-{i}").into_bytes()))
        .collect()
}

/// Runs a test with a temporary in-memory node.
pub fn with_temp_node<F, R>(f: F) -> R
where
    F: FnOnce(&TestNode) -> R,
{
    let node = TestNode::memory();
    f(&node)
}

/// Runs a test with a temporary file-based node.
pub fn with_file_node<F, R>(f: F) -> R
where
    F: FnOnce(&TestNode) -> R,
{
    let node = TestNode::file();
    f(&node)
}
