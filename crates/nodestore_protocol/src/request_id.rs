//! Request-id: the correlation identity of one multi-part transfer.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of a request-id on the wire, in ASCII hex characters.
pub const REQUEST_ID_LEN: usize = 32;

/// A 32-character hex identifier binding a sequence of "next" calls into
/// one transfer.
///
/// Stored as the ASCII bytes that travel on the wire, so marshalling is a
/// plain copy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestId([u8; REQUEST_ID_LEN]);

impl RequestId {
    /// Generates a fresh request-id from a random v4 UUID.
    #[must_use]
    pub fn generate() -> Self {
        let mut buf = [0u8; REQUEST_ID_LEN];
        Uuid::new_v4().simple().encode_lower(&mut buf);
        Self(buf)
    }

    /// Parses a request-id from its 32 hex characters.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] if the length is wrong or a
    /// character is not a hex digit.
    pub fn parse(s: &str) -> ProtocolResult<Self> {
        Self::from_wire(s.as_bytes())
    }

    /// Reads a request-id from exactly [`REQUEST_ID_LEN`] wire bytes.
    ///
    /// Hex digits are lowercased, so ids differing only in case are the
    /// same transfer.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedMessage`] if the slice has the wrong
    /// length or holds anything other than ASCII hex digits.
    pub fn from_wire(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut raw: [u8; REQUEST_ID_LEN] = bytes.try_into().map_err(|_| {
            ProtocolError::malformed(format!(
                "request-id must be {REQUEST_ID_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        if !raw.iter().all(u8::is_ascii_hexdigit) {
            return Err(ProtocolError::malformed("request-id is not hex"));
        }
        raw.make_ascii_lowercase();
        Ok(Self(raw))
    }

    /// Returns the wire bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; REQUEST_ID_LEN] {
        &self.0
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII hex digits.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.as_str())
    }
}

impl FromStr for RequestId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RequestId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.as_str().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), REQUEST_ID_LEN);
        assert_eq!(RequestId::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(RequestId::parse("abc").is_err());
        assert!(RequestId::parse(&"g".repeat(32)).is_err());
        assert!(RequestId::parse(&"a".repeat(33)).is_err());
    }

    #[test]
    fn case_is_folded() {
        let upper = RequestId::parse(&"AB".repeat(16)).unwrap();
        let lower = RequestId::parse(&"ab".repeat(16)).unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "ab".repeat(16));
        let wire = RequestId::from_wire("Cd".repeat(16).as_bytes()).unwrap();
        assert_eq!(&wire.as_bytes()[..], "cd".repeat(16).as_bytes());
    }

    #[test]
    fn display_and_from_str() {
        let id: RequestId = "a".repeat(32).parse().unwrap();
        assert_eq!(id.to_string(), "a".repeat(32));
    }

    #[test]
    fn serde_as_string() {
        let id = RequestId::parse(&"0f".repeat(16)).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "0f".repeat(16)));
        let back: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<RequestId>("\"nothex\"").is_err());
    }
}
