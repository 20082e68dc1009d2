//! Segment I/O against a volume.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::messages::{IoOperation, IoOutcome, SegmentDescriptor};
use bytes::Bytes;
use nodestore_storage::SharedBackend;
use tracing::debug;

/// Performs the I/O a descriptor asks for.
pub trait SegmentIo: Send + Sync {
    /// Executes one descriptor.
    fn execute(&self, descriptor: &SegmentDescriptor) -> CoordinatorResult<IoOutcome>;
}

/// Segment I/O over a volume's storage backend.
///
/// Writes append; reads are addressed by the offset a write returned.
#[derive(Clone)]
pub struct VolumeIo {
    backend: SharedBackend,
}

impl VolumeIo {
    /// Wraps a backend.
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }
}

impl SegmentIo for VolumeIo {
    fn execute(&self, descriptor: &SegmentDescriptor) -> CoordinatorResult<IoOutcome> {
        match &descriptor.operation {
            IoOperation::Write { data } => {
                let offset = self.backend.append(data)?;
                debug!(
                    key = %descriptor.key,
                    version = descriptor.version_number,
                    segment = descriptor.segment_number,
                    offset,
                    length = data.len(),
                    "segment written"
                );
                Ok(IoOutcome::Written {
                    offset,
                    length: data.len() as u64,
                })
            }
            IoOperation::Read { offset, length } => {
                let length = usize::try_from(*length).map_err(|_| {
                    CoordinatorError::malformed(format!("read length {length} too large"))
                })?;
                let data = self.backend.read_at(*offset, length)?;
                debug!(
                    key = %descriptor.key,
                    version = descriptor.version_number,
                    segment = descriptor.segment_number,
                    offset,
                    length,
                    "segment read"
                );
                Ok(IoOutcome::Read {
                    data: Bytes::from(data),
                })
            }
        }
    }
}
