//! Tagged request envelope.

use crate::archive::ArchiveKeyNext;
use crate::error::{ProtocolError, ProtocolResult};
use crate::request_id::{RequestId, REQUEST_ID_LEN};
use crate::retrieve::RetrieveKeyNext;

/// Kind byte of an archive-key-next request.
pub const ARCHIVE_KEY_NEXT_KIND: u8 = 1;
/// Kind byte of a retrieve-key-next request.
pub const RETRIEVE_KEY_NEXT_KIND: u8 = 2;

/// A request as it arrives at a storage node.
///
/// On the wire a single kind byte precedes the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Store one segment.
    ArchiveKeyNext(ArchiveKeyNext),
    /// Read one segment.
    RetrieveKeyNext(RetrieveKeyNext),
}

impl Request {
    /// Returns the kind byte.
    pub fn type_code(&self) -> u8 {
        match self {
            Request::ArchiveKeyNext(_) => ARCHIVE_KEY_NEXT_KIND,
            Request::RetrieveKeyNext(_) => RETRIEVE_KEY_NEXT_KIND,
        }
    }

    /// Returns the request-id.
    pub fn request_id(&self) -> &RequestId {
        match self {
            Request::ArchiveKeyNext(r) => &r.request_id,
            Request::RetrieveKeyNext(r) => &r.request_id,
        }
    }

    /// Encodes the kind byte and the body.
    pub fn marshall(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = vec![self.type_code()];
        match self {
            Request::ArchiveKeyNext(r) => r.marshall_into(&mut buf)?,
            Request::RetrieveKeyNext(r) => r.marshall_into(&mut buf)?,
        }
        Ok(buf)
    }

    /// Decodes a tagged request.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] for an empty buffer, an
    /// unknown kind byte, or a body that does not decode.
    pub fn unmarshall(buf: &[u8]) -> ProtocolResult<Self> {
        let (&kind, body) = buf
            .split_first()
            .ok_or_else(|| ProtocolError::malformed("empty request"))?;
        match kind {
            ARCHIVE_KEY_NEXT_KIND => Ok(Request::ArchiveKeyNext(ArchiveKeyNext::unmarshall(body)?)),
            RETRIEVE_KEY_NEXT_KIND => Ok(Request::RetrieveKeyNext(RetrieveKeyNext::unmarshall(body)?)),
            other => Err(ProtocolError::malformed(format!(
                "unknown request kind {other}"
            ))),
        }
    }
}

/// Reads the kind byte and request-id of a tagged request without decoding
/// the rest, so a reply can still be addressed when the body is damaged.
pub fn peek_request_id(buf: &[u8]) -> Option<(u8, RequestId)> {
    let kind = *buf.first()?;
    let id = RequestId::from_wire(buf.get(1..1 + REQUEST_ID_LEN)?).ok()?;
    Some((kind, id))
}
