//! Reply header shared by every reply type.
//!
//! ```text
//! offset size field
//!      0   32 request-id (ASCII hex)
//!     32    1 result code
//!     33    - body: nothing, raw payload, or a length-prefixed error string
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::request_id::{RequestId, REQUEST_ID_LEN};
use nodestore_record::marshalling::Cursor;

/// Size of the fixed reply header.
pub const REPLY_HEADER_SIZE: usize = REQUEST_ID_LEN + 1;

/// Appends the reply header.
pub(crate) fn put_reply_header(buf: &mut Vec<u8>, request_id: &RequestId, code: u8) {
    buf.extend_from_slice(request_id.as_bytes());
    buf.push(code);
}

/// Reads the reply header, returning the request-id, the raw result code and
/// a cursor positioned at the body.
pub(crate) fn read_reply_header(buf: &[u8]) -> ProtocolResult<(RequestId, u8, Cursor<'_>)> {
    if buf.len() < REPLY_HEADER_SIZE {
        return Err(ProtocolError::malformed(format!(
            "reply needs {REPLY_HEADER_SIZE} header bytes, got {}",
            buf.len()
        )));
    }
    let mut cursor = Cursor::at(buf, 0);
    let request_id = RequestId::from_wire(cursor.read_slice(REQUEST_ID_LEN, "request-id")?)?;
    let code = cursor.read_u8()?;
    Ok((request_id, code, cursor))
}

/// Reads the request-id from the start of a buffer without decoding the rest.
pub(crate) fn read_request_id(cursor: &mut Cursor<'_>) -> ProtocolResult<RequestId> {
    RequestId::from_wire(cursor.read_slice(REQUEST_ID_LEN, "request-id")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_id_then_code() {
        let id = RequestId::parse(&"a".repeat(32)).unwrap();
        let mut buf = Vec::new();
        put_reply_header(&mut buf, &id, 3);
        assert_eq!(buf.len(), REPLY_HEADER_SIZE);
        assert_eq!(&buf[..32], "a".repeat(32).as_bytes());
        assert_eq!(buf[32], 3);

        let (read_id, code, cursor) = read_reply_header(&buf).unwrap();
        assert_eq!(read_id, id);
        assert_eq!(code, 3);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn short_header_is_malformed() {
        let err = read_reply_header(&[b'a'; 32]).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn non_hex_id_is_malformed() {
        let mut buf = vec![b'z'; 32];
        buf.push(0);
        assert!(read_reply_header(&buf).unwrap_err().is_malformed());
    }
}
