//! Binary layout of a content record.
//!
//! ```text
//! offset size field
//!      0    2 format_version
//!      2    1 is_tombstone
//!      3    8 timestamp
//!     11    4 version_number
//!     15    1 segment_number
//!     16    4 segment_count
//!     20    4 segment_size
//!     24    8 total_size
//!     32    4 adler32
//!     36   16 md5
//!     52    2 userid
//!     54    2 groupid
//!     56    2 permissions
//!     58    4 file_name length, followed by the UTF-8 bytes
//! ```
//!
//! All integers are big-endian. Changing the order or width of any field
//! requires bumping [`CURRENT_FORMAT_VERSION`].

use crate::error::{RecordError, RecordResult};
use crate::marshalling::{put_string, Cursor};
use crate::record::{ContentRecord, CURRENT_FORMAT_VERSION};
use crate::truncate::{truncate_to_u16, truncate_to_u32, truncate_to_u8};

/// Size of the fixed-width header, before the file name.
pub const HEADER_SIZE: usize = 58;

/// Encodes a record, appending to `buf`.
///
/// Numeric fields are masked to their wire widths.
///
/// # Errors
///
/// Returns [`RecordError::FieldTooLong`] if the file name exceeds 4 GiB.
pub fn encode_into(record: &ContentRecord, buf: &mut Vec<u8>) -> RecordResult<()> {
    buf.reserve(HEADER_SIZE + 4 + record.file_name.len());

    buf.extend_from_slice(&record.format_version.to_be_bytes());
    buf.push(u8::from(record.is_tombstone));
    buf.extend_from_slice(&record.timestamp.to_be_bytes());
    buf.extend_from_slice(&truncate_to_u32(record.version_number).to_be_bytes());
    buf.push(truncate_to_u8(u64::from(record.segment_number)));
    buf.extend_from_slice(&truncate_to_u32(record.segment_count).to_be_bytes());
    buf.extend_from_slice(&truncate_to_u32(record.segment_size).to_be_bytes());
    buf.extend_from_slice(&record.total_size.to_be_bytes());
    buf.extend_from_slice(&truncate_to_u32(record.adler32).to_be_bytes());
    buf.extend_from_slice(&record.md5);
    buf.extend_from_slice(&truncate_to_u16(u64::from(record.userid)).to_be_bytes());
    buf.extend_from_slice(&truncate_to_u16(u64::from(record.groupid)).to_be_bytes());
    buf.extend_from_slice(&truncate_to_u16(u64::from(record.permissions)).to_be_bytes());

    put_string(buf, "file_name", &record.file_name)
}

/// Encodes a record to a new buffer.
///
/// # Errors
///
/// See [`encode_into`].
pub fn encode(record: &ContentRecord) -> RecordResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + 4 + record.file_name.len());
    encode_into(record, &mut buf)?;
    Ok(buf)
}

/// Decodes one record starting at `offset`.
///
/// Returns the record and the offset immediately after it, so records can
/// be read back to back out of a larger buffer.
///
/// # Errors
///
/// - [`RecordError::MalformedMessage`] if fewer than [`HEADER_SIZE`] bytes
///   remain, or the file name's length prefix runs past the buffer
/// - [`RecordError::FormatVersionMismatch`] if the record was written by a
///   different format version
pub fn decode(buf: &[u8], offset: usize) -> RecordResult<(ContentRecord, usize)> {
    let mut cursor = Cursor::at(buf, offset);
    cursor.require(HEADER_SIZE, "content record header")?;

    let format_version = cursor.read_u16()?;
    if format_version != CURRENT_FORMAT_VERSION {
        return Err(RecordError::FormatVersionMismatch {
            expected: CURRENT_FORMAT_VERSION,
            actual: format_version,
        });
    }

    let record = ContentRecord {
        format_version,
        is_tombstone: cursor.read_u8()? != 0,
        timestamp: cursor.read_u64()?,
        version_number: u64::from(cursor.read_u32()?),
        segment_number: u32::from(cursor.read_u8()?),
        segment_count: u64::from(cursor.read_u32()?),
        segment_size: u64::from(cursor.read_u32()?),
        total_size: cursor.read_u64()?,
        adler32: u64::from(cursor.read_u32()?),
        md5: cursor.read_digest()?,
        userid: u32::from(cursor.read_u16()?),
        groupid: u32::from(cursor.read_u16()?),
        permissions: u32::from(cursor.read_u16()?),
        file_name: cursor.read_string()?,
    };

    Ok((record, cursor.position()))
}

/// Decodes a buffer holding zero or more records back to back.
///
/// # Errors
///
/// Fails on the first record that does not decode.
pub fn decode_all(buf: &[u8]) -> RecordResult<Vec<ContentRecord>> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < buf.len() {
        let (record, next) = decode(buf, offset)?;
        records.push(record);
        offset = next;
    }
    Ok(records)
}

impl ContentRecord {
    /// Encodes this record. See [`encode`].
    ///
    /// # Errors
    ///
    /// See [`encode_into`].
    pub fn encode(&self) -> RecordResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes a record at `offset`. See [`decode`].
    ///
    /// # Errors
    ///
    /// See [`decode`].
    pub fn decode(buf: &[u8], offset: usize) -> RecordResult<(Self, usize)> {
        decode(buf, offset)
    }

    /// Returns the number of bytes this record occupies when encoded.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + crate::marshalling::LENGTH_PREFIX_SIZE + self.file_name.len()
    }
}
