//! Error types for the record crate.

use thiserror::Error;

/// Result type for record operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors that can occur while encoding or decoding records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The decoded record was written by an unsupported codec version.
    #[error("format version mismatch: expected {expected}, found {actual}")]
    FormatVersionMismatch {
        /// Version this codec supports.
        expected: u16,
        /// Version found in the buffer.
        actual: u16,
    },

    /// The buffer is shorter than a header or a length prefix requires,
    /// or its contents cannot be interpreted.
    #[error("malformed message: {message}")]
    MalformedMessage {
        /// Description of what was wrong.
        message: String,
    },

    /// A variable-length field does not fit its 32-bit length prefix.
    #[error("field {field} is too long to encode: {len} bytes")]
    FieldTooLong {
        /// Name of the field.
        field: &'static str,
        /// Actual length in bytes.
        len: usize,
    },
}

impl RecordError {
    /// Create a malformed message error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            message: message.into(),
        }
    }

    /// Create a malformed message error for a buffer that ended early.
    pub fn truncated(what: &str, needed: usize, available: usize) -> Self {
        Self::malformed(format!(
            "{what} needs {needed} bytes, only {available} available"
        ))
    }
}
