//! Messages exchanged between I/O workers and their controller.
//!
//! Control documents are JSON objects tagged by `message-type`. A work
//! assignment is always two frames: the JSON envelope followed by a binary
//! [`SegmentDescriptor`]. A completion is also two frames: the JSON document
//! followed by the bytes read (empty for writes).

use crate::error::{CoordinatorError, CoordinatorResult};
use bytes::Bytes;
use nodestore_record::marshalling::{put_bytes, put_string, Cursor};
use serde::{Deserialize, Serialize};

/// Messages a worker sends to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message-type", rename_all = "kebab-case")]
pub enum WorkerMessage {
    /// The worker is idle and will block until it is given work.
    #[serde(rename_all = "kebab-case")]
    ReadyForWork {
        /// Volume the worker serves.
        volume_name: String,
    },
    /// The worker finished an assignment.
    #[serde(rename_all = "kebab-case")]
    WorkComplete {
        /// Volume the worker serves.
        volume_name: String,
        /// Assignment being completed.
        assignment_id: u64,
        /// What happened.
        outcome: CompletionStatus,
    },
}

impl WorkerMessage {
    /// Encodes as a JSON frame.
    pub fn to_frame(&self) -> CoordinatorResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decodes a JSON frame.
    pub fn from_frame(frame: &[u8]) -> CoordinatorResult<Self> {
        Ok(serde_json::from_slice(frame)?)
    }
}

/// How an assignment ended, as reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CompletionStatus {
    /// Segment bytes were appended at `offset`.
    Written {
        /// Volume offset of the first byte.
        offset: u64,
        /// Number of bytes written.
        length: u64,
    },
    /// Segment bytes were read; they travel in the next frame.
    Read {
        /// Number of bytes read.
        length: u64,
    },
    /// The I/O failed.
    Failed {
        /// Error text.
        message: String,
    },
}

/// The kind of I/O an assignment asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IoCommand {
    /// Read a segment.
    Read,
    /// Write a segment.
    Write,
}

/// Messages the controller sends to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message-type", rename_all = "kebab-case")]
pub enum ControllerMessage {
    /// One unit of work; a [`SegmentDescriptor`] frame follows.
    WorkAssignment(WorkEnvelope),
}

/// Header frame of a work assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkEnvelope {
    /// What the descriptor asks for.
    pub command: IoCommand,
    /// Controller-assigned id, echoed back in `work-complete`.
    pub assignment_id: u64,
}

impl WorkEnvelope {
    /// Encodes as a `work-assignment` JSON frame.
    pub fn to_frame(&self) -> CoordinatorResult<Bytes> {
        let message = ControllerMessage::WorkAssignment(self.clone());
        Ok(Bytes::from(serde_json::to_vec(&message)?))
    }

    /// Decodes a `work-assignment` JSON frame.
    pub fn from_frame(frame: &[u8]) -> CoordinatorResult<Self> {
        let message: ControllerMessage = serde_json::from_slice(frame)?;
        let ControllerMessage::WorkAssignment(envelope) = message;
        Ok(envelope)
    }
}

/// The I/O a descriptor asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoOperation {
    /// Read `length` bytes at `offset` in the volume.
    Read {
        /// Volume offset.
        offset: u64,
        /// Number of bytes.
        length: u64,
    },
    /// Append `data` to the volume.
    Write {
        /// Segment bytes.
        data: Bytes,
    },
}

impl IoOperation {
    /// Returns the command matching this operation.
    pub fn command(&self) -> IoCommand {
        match self {
            IoOperation::Read { .. } => IoCommand::Read,
            IoOperation::Write { .. } => IoCommand::Write,
        }
    }
}

/// One segment of I/O to perform.
///
/// ```text
/// key (length-prefixed) version u32 segment u8 tag u8
/// tag 1: offset u64 length u64
/// tag 2: data (length-prefixed)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// Object key.
    pub key: String,
    /// Version of the key.
    pub version_number: u32,
    /// Segment within the version.
    pub segment_number: u8,
    /// What to do.
    pub operation: IoOperation,
}

const READ_TAG: u8 = 1;
const WRITE_TAG: u8 = 2;

impl SegmentDescriptor {
    /// Encodes the descriptor frame.
    pub fn marshall(&self) -> CoordinatorResult<Bytes> {
        let mut buf = Vec::with_capacity(32 + self.key.len());
        put_string(&mut buf, "key", &self.key)?;
        buf.extend_from_slice(&self.version_number.to_be_bytes());
        buf.push(self.segment_number);
        match &self.operation {
            IoOperation::Read { offset, length } => {
                buf.push(READ_TAG);
                buf.extend_from_slice(&offset.to_be_bytes());
                buf.extend_from_slice(&length.to_be_bytes());
            }
            IoOperation::Write { data } => {
                buf.push(WRITE_TAG);
                put_bytes(&mut buf, "data", data)?;
            }
        }
        Ok(Bytes::from(buf))
    }

    /// Decodes a descriptor frame.
    pub fn unmarshall(frame: &[u8]) -> CoordinatorResult<Self> {
        let mut cursor = Cursor::at(frame, 0);
        let key = cursor.read_string()?;
        let version_number = cursor.read_u32()?;
        let segment_number = cursor.read_u8()?;
        let operation = match cursor.read_u8()? {
            READ_TAG => IoOperation::Read {
                offset: cursor.read_u64()?,
                length: cursor.read_u64()?,
            },
            WRITE_TAG => IoOperation::Write {
                data: Bytes::from(cursor.read_bytes()?),
            },
            other => {
                return Err(CoordinatorError::malformed(format!(
                    "unknown operation tag {other}"
                )))
            }
        };
        if cursor.remaining() != 0 {
            return Err(CoordinatorError::malformed("trailing bytes after descriptor"));
        }
        Ok(Self {
            key,
            version_number,
            segment_number,
            operation,
        })
    }
}

/// Result of one segment of I/O, as handed back to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoOutcome {
    /// Bytes were appended.
    Written {
        /// Volume offset of the first byte.
        offset: u64,
        /// Number of bytes written.
        length: u64,
    },
    /// Bytes were read.
    Read {
        /// The segment bytes.
        data: Bytes,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ready_for_work_wire_shape() {
        let message = WorkerMessage::ReadyForWork {
            volume_name: "vol-1".into(),
        };
        let json: serde_json::Value = serde_json::from_slice(&message.to_frame().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"message-type": "ready-for-work", "volume-name": "vol-1"})
        );
    }

    #[test]
    fn work_complete_roundtrip() {
        let message = WorkerMessage::WorkComplete {
            volume_name: "vol-1".into(),
            assignment_id: 12,
            outcome: CompletionStatus::Written {
                offset: 100,
                length: 5,
            },
        };
        let frame = message.to_frame().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(json["message-type"], "work-complete");
        assert_eq!(json["assignment-id"], 12);
        assert_eq!(json["outcome"]["status"], "written");
        assert_eq!(WorkerMessage::from_frame(&frame).unwrap(), message);
    }

    #[test]
    fn envelope_wire_shape() {
        let envelope = WorkEnvelope {
            command: IoCommand::Read,
            assignment_id: 3,
        };
        let frame = envelope.to_frame().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"message-type": "work-assignment", "command": "read", "assignment-id": 3})
        );
        assert_eq!(WorkEnvelope::from_frame(&frame).unwrap(), envelope);
    }

    #[test]
    fn envelope_rejects_other_documents() {
        let frame = WorkerMessage::ReadyForWork {
            volume_name: "v".into(),
        }
        .to_frame()
        .unwrap();
        assert!(matches!(
            WorkEnvelope::from_frame(&frame),
            Err(CoordinatorError::Json(_))
        ));
        assert!(WorkEnvelope::from_frame(b"not json").is_err());
    }

    #[test]
    fn descriptor_roundtrip() {
        for operation in [
            IoOperation::Read {
                offset: 4096,
                length: 512,
            },
            IoOperation::Write {
                data: Bytes::from_static(b"segment"),
            },
        ] {
            let descriptor = SegmentDescriptor {
                key: "bucket/key".into(),
                version_number: 2,
                segment_number: 1,
                operation,
            };
            let frame = descriptor.marshall().unwrap();
            assert_eq!(SegmentDescriptor::unmarshall(&frame).unwrap(), descriptor);
        }
    }

    #[test]
    fn descriptor_rejects_bad_tag_and_trailing_bytes() {
        let descriptor = SegmentDescriptor {
            key: "k".into(),
            version_number: 1,
            segment_number: 0,
            operation: IoOperation::Read {
                offset: 0,
                length: 1,
            },
        };
        let mut frame = descriptor.marshall().unwrap().to_vec();
        frame.push(0);
        assert!(SegmentDescriptor::unmarshall(&frame).is_err());

        let tag_at = 4 + 1 + 4 + 1;
        frame[tag_at] = 9;
        assert!(matches!(
            SegmentDescriptor::unmarshall(&frame),
            Err(CoordinatorError::Malformed(_))
        ));
    }

    fn operation_strategy() -> impl Strategy<Value = IoOperation> {
        prop_oneof![
            (any::<u64>(), any::<u64>())
                .prop_map(|(offset, length)| IoOperation::Read { offset, length }),
            prop::collection::vec(any::<u8>(), 0..512)
                .prop_map(|data| IoOperation::Write { data: Bytes::from(data) }),
        ]
    }

    proptest! {
        #[test]
        fn prop_descriptor_roundtrip(
            key in "[a-z0-9/._-]{1,64}",
            version_number in any::<u32>(),
            segment_number in any::<u8>(),
            operation in operation_strategy(),
        ) {
            let descriptor = SegmentDescriptor {
                key,
                version_number,
                segment_number,
                operation,
            };
            let frame = descriptor.marshall().unwrap();
            prop_assert_eq!(SegmentDescriptor::unmarshall(&frame).unwrap(), descriptor);
        }

        #[test]
        fn prop_truncated_descriptor_is_rejected(
            data in prop::collection::vec(any::<u8>(), 0..64),
            cut in any::<prop::sample::Index>(),
        ) {
            let descriptor = SegmentDescriptor {
                key: "k".into(),
                version_number: 1,
                segment_number: 0,
                operation: IoOperation::Write { data: Bytes::from(data) },
            };
            let frame = descriptor.marshall().unwrap();
            let cut = cut.index(frame.len());
            prop_assert!(SegmentDescriptor::unmarshall(&frame[..cut]).is_err());
        }
    }
}
