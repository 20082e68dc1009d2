//! Error types for the protocol crate.

use nodestore_record::RecordError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while marshalling or unmarshalling messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The buffer is shorter than the fixed header or a length prefix
    /// requires, or a field holds a value the protocol does not define.
    #[error("malformed message: {message}")]
    MalformedMessage {
        /// Description of what was wrong.
        message: String,
    },

    /// A field could not be encoded.
    #[error("record error: {0}")]
    Record(RecordError),
}

impl ProtocolError {
    /// Create a malformed message error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            message: message.into(),
        }
    }

    /// Returns true if the bytes themselves were at fault.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedMessage { .. }
                | ProtocolError::Record(RecordError::MalformedMessage { .. })
        )
    }
}

impl From<RecordError> for ProtocolError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::MalformedMessage { message } => Self::MalformedMessage { message },
            other => Self::Record(other),
        }
    }
}
