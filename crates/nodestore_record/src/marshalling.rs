//! Big-endian primitives and length-prefixed fields.
//!
//! Every variable-length field on the wire is a 32-bit big-endian length
//! followed by that many bytes. These helpers are shared by the record codec
//! and the reply protocol.

use crate::error::{RecordError, RecordResult};

/// Size of the length prefix in front of strings and byte strings.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Appends a length-prefixed UTF-8 string.
///
/// # Errors
///
/// Returns [`RecordError::FieldTooLong`] if the string exceeds `u32::MAX` bytes.
pub fn put_string(buf: &mut Vec<u8>, field: &'static str, value: &str) -> RecordResult<()> {
    put_bytes(buf, field, value.as_bytes())
}

/// Appends a length-prefixed byte string.
///
/// # Errors
///
/// Returns [`RecordError::FieldTooLong`] if the value exceeds `u32::MAX` bytes.
pub fn put_bytes(buf: &mut Vec<u8>, field: &'static str, value: &[u8]) -> RecordResult<()> {
    let len = u32::try_from(value.len()).map_err(|_| RecordError::FieldTooLong {
        field,
        len: value.len(),
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(value);
    Ok(())
}

/// Reads a length-prefixed UTF-8 string at `offset`.
///
/// Returns the string and the offset just past it.
///
/// # Errors
///
/// Returns [`RecordError::MalformedMessage`] if the buffer is shorter than the
/// prefix or than the length it claims, or if the bytes are not UTF-8.
pub fn get_string(buf: &[u8], offset: usize) -> RecordResult<(String, usize)> {
    let (bytes, next) = get_bytes(buf, offset)?;
    let value = String::from_utf8(bytes)
        .map_err(|_| RecordError::malformed("length-prefixed string is not valid UTF-8"))?;
    Ok((value, next))
}

/// Reads a length-prefixed byte string at `offset`.
///
/// # Errors
///
/// Returns [`RecordError::MalformedMessage`] if the buffer is too short.
pub fn get_bytes(buf: &[u8], offset: usize) -> RecordResult<(Vec<u8>, usize)> {
    let mut cursor = Cursor::at(buf, offset);
    let len = cursor.read_u32()? as usize;
    let bytes = cursor.read_slice(len, "length-prefixed body")?.to_vec();
    Ok((bytes, cursor.position()))
}

/// A forward-only reader over a borrowed buffer.
///
/// Every read checks the remaining length first and fails with
/// [`RecordError::MalformedMessage`] instead of panicking.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor positioned at `offset`.
    #[must_use]
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self { buf, pos: offset }
    }

    /// Returns the current position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Fails unless at least `needed` bytes remain.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedMessage`] naming `what`.
    pub fn require(&self, needed: usize, what: &str) -> RecordResult<()> {
        if self.remaining() < needed {
            return Err(RecordError::truncated(what, needed, self.remaining()));
        }
        Ok(())
    }

    /// Reads `len` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedMessage`] if fewer bytes remain.
    pub fn read_slice(&mut self, len: usize, what: &str) -> RecordResult<&'a [u8]> {
        self.require(len, what)?;
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Reads everything that is left.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let start = self.pos.min(self.buf.len());
        self.pos = self.buf.len();
        &self.buf[start..]
    }

    fn read_array<const N: usize>(&mut self) -> RecordResult<[u8; N]> {
        let slice = self.read_slice(N, "fixed-width field")?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedMessage`] if the buffer is exhausted.
    pub fn read_u8(&mut self) -> RecordResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a big-endian `u16`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedMessage`] if fewer than 2 bytes remain.
    pub fn read_u16(&mut self) -> RecordResult<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Reads a big-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedMessage`] if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> RecordResult<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Reads a big-endian `u64`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedMessage`] if fewer than 8 bytes remain.
    pub fn read_u64(&mut self) -> RecordResult<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Reads a 16-byte digest.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MalformedMessage`] if fewer than 16 bytes remain.
    pub fn read_digest(&mut self) -> RecordResult<[u8; 16]> {
        self.read_array()
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// See [`get_string`].
    pub fn read_string(&mut self) -> RecordResult<String> {
        let (value, next) = get_string(self.buf, self.pos)?;
        self.pos = next;
        Ok(value)
    }

    /// Reads a length-prefixed byte string.
    ///
    /// # Errors
    ///
    /// See [`get_bytes`].
    pub fn read_bytes(&mut self) -> RecordResult<Vec<u8>> {
        let (value, next) = get_bytes(self.buf, self.pos)?;
        self.pos = next;
        Ok(value)
    }
}
