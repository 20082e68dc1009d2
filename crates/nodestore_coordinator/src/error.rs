//! Error types for the worker pool.

use nodestore_record::RecordError;
use nodestore_storage::StorageError;
use thiserror::Error;

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures of the frame transport between a worker and its controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A blocking receive was cut short.
    #[error("interrupted receive")]
    Interrupted,

    /// The other end has gone away.
    #[error("transport disconnected")]
    Disconnected,

    /// The transport was closed locally.
    #[error("transport closed")]
    Closed,

    /// The peer refused a message.
    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Errors raised by workers, the controller and segment I/O.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A control document or descriptor did not parse or validate.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// JSON control document error.
    #[error("invalid control document: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary descriptor error.
    #[error("descriptor error: {0}")]
    Record(#[from] RecordError),

    /// Volume I/O failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A worker reported that it could not perform the I/O.
    #[error("segment I/O failed: {0}")]
    IoFailed(String),

    /// The worker holding an assignment disconnected before completing it.
    #[error("worker {worker} lost while holding assignment {assignment_id}")]
    WorkerLost {
        /// Worker that went away.
        worker: u64,
        /// Assignment it held.
        assignment_id: u64,
    },

    /// Too many submissions are waiting for a worker.
    #[error("pending queue full ({capacity} items)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The controller is shutting down.
    #[error("controller shut down")]
    Shutdown,
}

impl CoordinatorError {
    /// Create a malformed message error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Returns the classification reported with unhandled exceptions.
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::Transport(TransportError::Interrupted) => "TransportInterrupted",
            CoordinatorError::Transport(_) => "TransportError",
            CoordinatorError::Malformed(_)
            | CoordinatorError::Json(_)
            | CoordinatorError::Record(_) => "MalformedMessage",
            CoordinatorError::Storage(_) | CoordinatorError::IoFailed(_) => "DatabaseError",
            CoordinatorError::WorkerLost { .. }
            | CoordinatorError::QueueFull { .. }
            | CoordinatorError::Shutdown => "UnclassifiedException",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            CoordinatorError::from(TransportError::Interrupted).kind(),
            "TransportInterrupted"
        );
        assert_eq!(
            CoordinatorError::from(TransportError::Disconnected).kind(),
            "TransportError"
        );
        assert_eq!(CoordinatorError::malformed("x").kind(), "MalformedMessage");
        assert_eq!(
            CoordinatorError::IoFailed("disk".into()).kind(),
            "DatabaseError"
        );
        assert_eq!(CoordinatorError::Shutdown.kind(), "UnclassifiedException");
    }

    #[test]
    fn error_display() {
        let err = CoordinatorError::WorkerLost {
            worker: 3,
            assignment_id: 9,
        };
        assert_eq!(err.to_string(), "worker 3 lost while holding assignment 9");
        assert_eq!(
            CoordinatorError::from(TransportError::Closed).to_string(),
            "transport error: transport closed"
        );
    }
}
