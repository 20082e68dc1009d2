//! Error types for the storage node server.

use crate::tracker::SequenceError;
use nodestore_coordinator::CoordinatorError;
use nodestore_protocol::ProtocolError;
use nodestore_record::RecordError;
use nodestore_storage::StorageError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the storage node server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A request or reply could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A content record could not be encoded or decoded.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The record log backend failed.
    #[error("database error: {0}")]
    Storage(#[from] StorageError),

    /// Segment I/O through the worker pool failed.
    #[error("segment io failed: {0}")]
    Io(#[from] CoordinatorError),

    /// A "next" call arrived in the wrong order.
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// A record for this key, version and segment already exists.
    #[error("duplicate record: key {key} version {version_number} segment {segment_number}")]
    DuplicateRecord {
        /// Key of the record.
        key: String,
        /// Version of the record.
        version_number: u64,
        /// Segment of the record.
        segment_number: u32,
    },

    /// A record declares a different segment count than the other records of
    /// its version.
    #[error(
        "segment count mismatch: key {key} version {version_number} has {expected} segments, got {actual}"
    )]
    SegmentCountMismatch {
        /// Key of the record.
        key: String,
        /// Version of the record.
        version_number: u64,
        /// Count declared by the version's existing records.
        expected: u64,
        /// Count declared by the new record.
        actual: u64,
    },

    /// No live record exists for the request.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A request field is outside what the node accepts.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The record log holds an entry that does not decode.
    #[error("corrupt record log at offset {offset}: {message}")]
    CorruptLog {
        /// Byte offset of the bad entry.
        offset: u64,
        /// What was wrong.
        message: String,
    },
}

impl ServerError {
    /// Returns true if the client caused this error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Protocol(_)
                | ServerError::Sequence(_)
                | ServerError::DuplicateRecord { .. }
                | ServerError::SegmentCountMismatch { .. }
                | ServerError::KeyNotFound(_)
                | ServerError::InvalidRequest(_)
        )
    }

    /// Returns true if the node's record log failed.
    pub fn is_database_error(&self) -> bool {
        matches!(
            self,
            ServerError::Storage(_) | ServerError::Record(_) | ServerError::CorruptLog { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::KeyNotFound("k".into()).is_client_error());
        assert!(ServerError::Sequence(SequenceError::DirectionMismatch).is_client_error());
        assert!(ServerError::Storage(StorageError::ReadPastEnd {
            offset: 10,
            len: 5,
            size: 12
        })
        .is_database_error());
        assert!(!ServerError::Io(CoordinatorError::Shutdown).is_client_error());
        assert!(!ServerError::Io(CoordinatorError::Shutdown).is_database_error());
    }

    #[test]
    fn error_display() {
        let err = ServerError::DuplicateRecord {
            key: "photos/cat".into(),
            version_number: 3,
            segment_number: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("photos/cat"));
        assert!(msg.contains("version 3"));
    }
}
