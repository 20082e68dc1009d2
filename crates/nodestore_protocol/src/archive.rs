//! Archive-next: one segment of a key being written.

use crate::error::{ProtocolError, ProtocolResult};
use crate::header::{put_reply_header, read_reply_header, read_request_id};
use crate::request_id::RequestId;
use bytes::Bytes;
use nodestore_record::marshalling::{put_string, Cursor, LENGTH_PREFIX_SIZE};

/// Size of the fixed fields at the front of an archive-next request.
const ARCHIVE_FIXED_SIZE: usize = 77;

/// Most segments one version can have; segment numbers are a single byte.
pub const MAX_SEGMENT_COUNT: u32 = 256;

/// Outcome of one archive-next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveResult {
    /// The segment was stored.
    Successful,
    /// The segment number was already seen for this request.
    InvalidDuplicate,
    /// The node failed while handling the segment.
    Exception,
    /// The segment number skipped ahead of the expected one.
    OutOfSequence,
}

impl ArchiveResult {
    /// Returns the wire code.
    pub fn to_code(self) -> u8 {
        match self {
            ArchiveResult::Successful => 0,
            ArchiveResult::InvalidDuplicate => 1,
            ArchiveResult::Exception => 2,
            ArchiveResult::OutOfSequence => 3,
        }
    }

    /// Converts from a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ArchiveResult::Successful),
            1 => Some(ArchiveResult::InvalidDuplicate),
            2 => Some(ArchiveResult::Exception),
            3 => Some(ArchiveResult::OutOfSequence),
            _ => None,
        }
    }

    /// Returns the symbolic name.
    pub fn name(self) -> &'static str {
        match self {
            ArchiveResult::Successful => "successful",
            ArchiveResult::InvalidDuplicate => "error_invalid_duplicate",
            ArchiveResult::Exception => "error_exception",
            ArchiveResult::OutOfSequence => "error_out_of_sequence",
        }
    }
}

/// Request to store one segment of one version of a key.
///
/// ```text
/// request-id[32] timestamp u64 version u32 segment u8 segment_count u32
/// total_size u64 adler32 u32 md5[16]
/// key (length-prefixed) file_name (length-prefixed) data (rest)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveKeyNext {
    /// Transfer this segment belongs to.
    pub request_id: RequestId,
    /// Object key.
    pub key: String,
    /// Time of the write.
    pub timestamp: u64,
    /// Version of the key being written.
    pub version_number: u32,
    /// Position of this segment, starting at 0.
    pub segment_number: u8,
    /// Total segments in the version.
    pub segment_count: u32,
    /// Size of the whole object.
    pub total_size: u64,
    /// Adler-32 of this segment.
    pub adler32: u32,
    /// MD5 of this segment.
    pub md5: [u8; 16],
    /// Original file name.
    pub file_name: String,
    /// Segment bytes.
    pub data: Bytes,
}

impl ArchiveKeyNext {
    /// Returns true if this is the final segment of its version.
    pub fn is_last(&self) -> bool {
        u32::from(self.segment_number) + 1 >= self.segment_count
    }

    /// Appends the encoded request to `buf`.
    pub fn marshall_into(&self, buf: &mut Vec<u8>) -> ProtocolResult<()> {
        buf.extend_from_slice(self.request_id.as_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.version_number.to_be_bytes());
        buf.push(self.segment_number);
        buf.extend_from_slice(&self.segment_count.to_be_bytes());
        buf.extend_from_slice(&self.total_size.to_be_bytes());
        buf.extend_from_slice(&self.adler32.to_be_bytes());
        buf.extend_from_slice(&self.md5);
        put_string(buf, "key", &self.key)?;
        put_string(buf, "file_name", &self.file_name)?;
        buf.extend_from_slice(&self.data);
        Ok(())
    }

    /// Encodes the request.
    pub fn marshall(&self) -> ProtocolResult<Vec<u8>> {
        let body = self.key.len() + self.file_name.len() + self.data.len();
        let mut buf = Vec::with_capacity(ARCHIVE_FIXED_SIZE + 2 * LENGTH_PREFIX_SIZE + body);
        self.marshall_into(&mut buf)?;
        Ok(buf)
    }

    /// Decodes a request.
    pub fn unmarshall(buf: &[u8]) -> ProtocolResult<Self> {
        let mut cursor = Cursor::at(buf, 0);
        Ok(Self {
            request_id: read_request_id(&mut cursor)?,
            timestamp: cursor.read_u64()?,
            version_number: cursor.read_u32()?,
            segment_number: cursor.read_u8()?,
            segment_count: cursor.read_u32()?,
            total_size: cursor.read_u64()?,
            adler32: cursor.read_u32()?,
            md5: cursor.read_digest()?,
            key: cursor.read_string()?,
            file_name: cursor.read_string()?,
            data: Bytes::copy_from_slice(cursor.read_rest()),
        })
    }
}

/// Reply to one archive-next call.
///
/// Success carries nothing after the header; every error carries a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveKeyNextReply {
    request_id: RequestId,
    result: ArchiveResult,
    error_message: String,
}

impl ArchiveKeyNextReply {
    /// Builds a successful reply.
    pub fn success(request_id: RequestId) -> Self {
        Self {
            request_id,
            result: ArchiveResult::Successful,
            error_message: String::new(),
        }
    }

    /// Builds an error reply. A message passed with
    /// [`ArchiveResult::Successful`] is dropped.
    pub fn error(request_id: RequestId, result: ArchiveResult, message: impl Into<String>) -> Self {
        let error_message = if result == ArchiveResult::Successful {
            String::new()
        } else {
            message.into()
        };
        Self {
            request_id,
            result,
            error_message,
        }
    }

    /// Transfer this reply answers.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Outcome of the call.
    pub fn result(&self) -> ArchiveResult {
        self.result
    }

    /// Error text; empty on success.
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Returns true unless the result is [`ArchiveResult::Successful`].
    pub fn is_error(&self) -> bool {
        self.result != ArchiveResult::Successful
    }

    /// Encodes the reply.
    ///
    /// # Errors
    ///
    /// Fails only if the error message exceeds 4 GiB.
    pub fn marshall(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(crate::REPLY_HEADER_SIZE + 4 + self.error_message.len());
        put_reply_header(&mut buf, &self.request_id, self.result.to_code());
        if self.is_error() {
            put_string(&mut buf, "error_message", &self.error_message)?;
        }
        Ok(buf)
    }

    /// Decodes a reply.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] if the buffer is shorter
    /// than the header, the result code is unknown, or an error reply lacks
    /// its message.
    pub fn unmarshall(buf: &[u8]) -> ProtocolResult<Self> {
        let (request_id, code, mut cursor) = read_reply_header(buf)?;
        let result = ArchiveResult::from_code(code).ok_or_else(|| {
            ProtocolError::malformed(format!("unknown archive result code {code}"))
        })?;
        let error_message = if result == ArchiveResult::Successful {
            String::new()
        } else {
            cursor.read_string()?
        };
        Ok(Self {
            request_id,
            result,
            error_message,
        })
    }
}
