//! Retrieve-next: one segment of a key being read back.

use crate::error::{ProtocolError, ProtocolResult};
use crate::header::{put_reply_header, read_reply_header, read_request_id};
use crate::request_id::RequestId;
use crate::REPLY_HEADER_SIZE;
use bytes::Bytes;
use nodestore_record::marshalling::{put_string, Cursor, LENGTH_PREFIX_SIZE};

/// Outcome of one retrieve-next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrieveResult {
    /// The segment was found; the payload follows.
    Successful,
    /// No live record exists for the key, version and segment.
    KeyNotFound,
    /// The node failed while handling the request.
    Exception,
    /// The record index could not be read.
    Database,
    /// The segment number was already served for this request.
    InvalidDuplicate,
}

impl RetrieveResult {
    /// Returns the wire code.
    pub fn to_code(self) -> u8 {
        match self {
            RetrieveResult::Successful => 0,
            RetrieveResult::KeyNotFound => 1,
            RetrieveResult::Exception => 2,
            RetrieveResult::Database => 3,
            RetrieveResult::InvalidDuplicate => 4,
        }
    }

    /// Converts from a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RetrieveResult::Successful),
            1 => Some(RetrieveResult::KeyNotFound),
            2 => Some(RetrieveResult::Exception),
            3 => Some(RetrieveResult::Database),
            4 => Some(RetrieveResult::InvalidDuplicate),
            _ => None,
        }
    }

    /// Returns the symbolic name.
    pub fn name(self) -> &'static str {
        match self {
            RetrieveResult::Successful => "successful",
            RetrieveResult::KeyNotFound => "error_key_not_found",
            RetrieveResult::Exception => "error_exception",
            RetrieveResult::Database => "error_database",
            RetrieveResult::InvalidDuplicate => "error_invalid_duplicate",
        }
    }
}

/// Request for one segment of a stored key.
///
/// A `version_number` of 0 asks for the latest live version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveKeyNext {
    /// Transfer this segment belongs to.
    pub request_id: RequestId,
    /// Object key.
    pub key: String,
    /// Version to read, or 0 for the latest.
    pub version_number: u32,
    /// Segment to read, starting at 0.
    pub segment_number: u8,
}

impl RetrieveKeyNext {
    /// Appends the encoded request to `buf`.
    pub fn marshall_into(&self, buf: &mut Vec<u8>) -> ProtocolResult<()> {
        buf.extend_from_slice(self.request_id.as_bytes());
        buf.extend_from_slice(&self.version_number.to_be_bytes());
        buf.push(self.segment_number);
        put_string(buf, "key", &self.key)?;
        Ok(())
    }

    /// Encodes the request.
    pub fn marshall(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(37 + LENGTH_PREFIX_SIZE + self.key.len());
        self.marshall_into(&mut buf)?;
        Ok(buf)
    }

    /// Decodes a request.
    pub fn unmarshall(buf: &[u8]) -> ProtocolResult<Self> {
        let mut cursor = Cursor::at(buf, 0);
        Ok(Self {
            request_id: read_request_id(&mut cursor)?,
            version_number: cursor.read_u32()?,
            segment_number: cursor.read_u8()?,
            key: cursor.read_string()?,
        })
    }
}

/// Reply to one retrieve-next call.
///
/// A successful reply carries the segment bytes as the trailing part of the
/// message; an error reply carries a length-prefixed message instead. A reply
/// never holds both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveKeyNextReply {
    request_id: RequestId,
    result: RetrieveResult,
    payload: Bytes,
    error_message: String,
}

impl RetrieveKeyNextReply {
    /// Builds a successful reply carrying `payload`.
    pub fn success(request_id: RequestId, payload: impl Into<Bytes>) -> Self {
        Self {
            request_id,
            result: RetrieveResult::Successful,
            payload: payload.into(),
            error_message: String::new(),
        }
    }

    /// Builds an error reply with no payload. A message passed with
    /// [`RetrieveResult::Successful`] is dropped.
    pub fn error(
        request_id: RequestId,
        result: RetrieveResult,
        message: impl Into<String>,
    ) -> Self {
        let error_message = if result == RetrieveResult::Successful {
            String::new()
        } else {
            message.into()
        };
        Self {
            request_id,
            result,
            payload: Bytes::new(),
            error_message,
        }
    }

    /// Transfer this reply answers.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Outcome of the call.
    pub fn result(&self) -> RetrieveResult {
        self.result
    }

    /// Segment bytes; empty on error.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Error text; empty on success.
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Returns true unless the result is [`RetrieveResult::Successful`].
    pub fn is_error(&self) -> bool {
        self.result != RetrieveResult::Successful
    }

    /// Consumes the reply, returning the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Encodes the reply.
    ///
    /// # Errors
    ///
    /// Fails only if the error message exceeds 4 GiB.
    pub fn marshall(&self) -> ProtocolResult<Vec<u8>> {
        let body = if self.is_error() {
            LENGTH_PREFIX_SIZE + self.error_message.len()
        } else {
            self.payload.len()
        };
        let mut buf = Vec::with_capacity(REPLY_HEADER_SIZE + body);
        put_reply_header(&mut buf, &self.request_id, self.result.to_code());
        if self.is_error() {
            put_string(&mut buf, "error_message", &self.error_message)?;
        } else {
            buf.extend_from_slice(&self.payload);
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
        let result = RetrieveResult::from_code(code).ok_or_else(|| {
            ProtocolError::malformed(format!("unknown retrieve result code {code}"))
        })?;
        if result == RetrieveResult::Successful {
            return Ok(Self::success(
                request_id,
                Bytes::copy_from_slice(cursor.read_rest()),
            ));
        }
        let message = cursor.read_string()?;
        Ok(Self::error(request_id, result, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id() -> RequestId {
        RequestId::parse("0123456789abcdef0123456789ABCDEF").unwrap()
    }

    #[test]
    fn result_codes() {
        for (code, result) in [
            (0, RetrieveResult::Successful),
            (1, RetrieveResult::KeyNotFound),
            (2, RetrieveResult::Exception),
            (3, RetrieveResult::Database),
            (4, RetrieveResult::InvalidDuplicate),
        ] {
            assert_eq!(result.to_code(), code);
            assert_eq!(RetrieveResult::from_code(code), Some(result));
        }
        assert_eq!(RetrieveResult::from_code(5), None);
        assert_eq!(RetrieveResult::Database.name(), "error_database");
    }

    #[test]
    fn success_payload_follows_header() {
        let reply = RetrieveKeyNextReply::success(id(), Bytes::from_static(b"segment"));
        let encoded = reply.marshall().unwrap();
        assert_eq!(encoded.len(), REPLY_HEADER_SIZE + 7);
        assert_eq!(&encoded[REPLY_HEADER_SIZE..], b"segment");

        let decoded = RetrieveKeyNextReply::unmarshall(&encoded).unwrap();
        assert_eq!(decoded, reply);
        assert!(!decoded.is_error());
        assert_eq!(decoded.error_message(), "");
    }

    #[test]
    fn empty_payload_success() {
        let encoded = RetrieveKeyNextReply::success(id(), Vec::new())
            .marshall()
            .unwrap();
        assert_eq!(encoded.len(), REPLY_HEADER_SIZE);
        let decoded = RetrieveKeyNextReply::unmarshall(&encoded).unwrap();
        assert!(decoded.payload().is_empty());
    }

    #[test]
    fn error_never_carries_payload() {
        let reply = RetrieveKeyNextReply::error(id(), RetrieveResult::KeyNotFound, "no such key");
        assert!(reply.payload().is_empty());

        let encoded = reply.marshall().unwrap();
        let decoded = RetrieveKeyNextReply::unmarshall(&encoded).unwrap();
        assert!(decoded.is_error());
        assert_eq!(decoded.result(), RetrieveResult::KeyNotFound);
        assert_eq!(decoded.error_message(), "no such key");
        assert!(decoded.payload().is_empty());
    }

    #[test]
    fn every_error_code_is_an_error() {
        for result in [
            RetrieveResult::KeyNotFound,
            RetrieveResult::Exception,
            RetrieveResult::Database,
            RetrieveResult::InvalidDuplicate,
        ] {
            assert!(RetrieveKeyNextReply::error(id(), result, "x").is_error());
        }
    }

    #[test]
    fn unknown_code_and_short_buffer_are_malformed() {
        let mut encoded = RetrieveKeyNextReply::success(id(), vec![1u8])
            .marshall()
            .unwrap();
        assert!(RetrieveKeyNextReply::unmarshall(&encoded[..20])
            .unwrap_err()
            .is_malformed());
        encoded[32] = 200;
        assert!(RetrieveKeyNextReply::unmarshall(&encoded)
            .unwrap_err()
            .is_malformed());
    }

    #[test]
    fn request_roundtrip() {
        let request = RetrieveKeyNext {
            request_id: id(),
            key: "bucket/a".into(),
            version_number: 0,
            segment_number: 2,
        };
        let encoded = request.marshall().unwrap();
        assert_eq!(encoded.len(), 37 + 4 + 8);
        assert_eq!(RetrieveKeyNext::unmarshall(&encoded).unwrap(), request);
    }

    proptest! {
        #[test]
        fn prop_payload_isolation(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
            let encoded = RetrieveKeyNextReply::success(id(), payload.clone()).marshall().unwrap();
            prop_assert_eq!(&encoded[REPLY_HEADER_SIZE..], &payload[..]);
            let decoded = RetrieveKeyNextReply::unmarshall(&encoded).unwrap();
            prop_assert_eq!(decoded.payload().as_ref(), &payload[..]);
        }

        #[test]
        fn prop_errors_hold_only_the_message(code in 1u8..=4, message in ".{0,64}") {
            let result = RetrieveResult::from_code(code).unwrap();
            let encoded = RetrieveKeyNextReply::error(id(), result, message.clone())
                .marshall()
                .unwrap();
            prop_assert_eq!(encoded.len(), REPLY_HEADER_SIZE + LENGTH_PREFIX_SIZE + message.len());
            let decoded = RetrieveKeyNextReply::unmarshall(&encoded).unwrap();
            prop_assert!(decoded.payload().is_empty());
            prop_assert_eq!(decoded.error_message(), message.as_str());
        }
    }
}
