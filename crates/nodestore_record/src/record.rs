//! The content record value type.

use crate::truncate::{truncate_to_u16, truncate_to_u32, truncate_to_u8};

/// The only record format version this codec reads and writes.
pub const CURRENT_FORMAT_VERSION: u16 = 1;

/// An all-zero MD5 digest, used by tombstones.
pub const EMPTY_MD5: [u8; 16] = [0u8; 16];

/// Caller-supplied fields for a non-tombstone record.
///
/// Numeric fields are wider than their wire widths; anything out of range
/// is masked when the record is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFields {
    /// Wall-clock or logical timestamp.
    pub timestamp: u64,
    /// Version of the key this segment belongs to (32 bits on the wire).
    pub version_number: u64,
    /// Position of the segment within its version (8 bits on the wire).
    pub segment_number: u32,
    /// Total segments in the version (32 bits on the wire).
    pub segment_count: u64,
    /// Size of this segment in bytes (32 bits on the wire).
    pub segment_size: u64,
    /// Size of the whole object in bytes.
    pub total_size: u64,
    /// Adler-32 checksum of the segment (32 bits on the wire).
    pub adler32: u64,
    /// MD5 digest of the segment.
    pub md5: [u8; 16],
    /// Original file name.
    pub file_name: String,
}

/// One persisted metadata entry for one segment of one version of one key.
///
/// Records are immutable: they are created through [`ContentRecord::from_fields`]
/// or [`ContentRecord::make_tombstone`], or decoded from bytes, and are never
/// modified afterwards. A change to a key is a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub(crate) format_version: u16,
    pub(crate) is_tombstone: bool,
    pub(crate) timestamp: u64,
    pub(crate) version_number: u64,
    pub(crate) segment_number: u32,
    pub(crate) segment_count: u64,
    pub(crate) segment_size: u64,
    pub(crate) total_size: u64,
    pub(crate) adler32: u64,
    pub(crate) md5: [u8; 16],
    pub(crate) userid: u32,
    pub(crate) groupid: u32,
    pub(crate) permissions: u32,
    pub(crate) file_name: String,
}

impl ContentRecord {
    /// Builds a live (non-tombstone) record.
    ///
    /// Ownership fields are zero: they are not used at this layer.
    #[must_use]
    pub fn from_fields(fields: ContentFields) -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            is_tombstone: false,
            timestamp: fields.timestamp,
            version_number: fields.version_number,
            segment_number: fields.segment_number,
            segment_count: fields.segment_count,
            segment_size: fields.segment_size,
            total_size: fields.total_size,
            adler32: fields.adler32,
            md5: fields.md5,
            userid: 0,
            groupid: 0,
            permissions: 0,
            file_name: fields.file_name,
        }
    }

    /// Builds a tombstone marking a key as deleted at `timestamp`.
    ///
    /// Sizes, checksums, digest and file name are always empty.
    #[must_use]
    pub fn make_tombstone(timestamp: u64, version_number: u64, segment_number: u32) -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            is_tombstone: true,
            timestamp,
            version_number,
            segment_number,
            segment_count: 0,
            segment_size: 0,
            total_size: 0,
            adler32: 0,
            md5: EMPTY_MD5,
            userid: 0,
            groupid: 0,
            permissions: 0,
            file_name: String::new(),
        }
    }

    /// Returns a copy carrying the given ownership metadata.
    #[must_use]
    pub fn with_ownership(mut self, userid: u32, groupid: u32, permissions: u32) -> Self {
        self.userid = userid;
        self.groupid = groupid;
        self.permissions = permissions;
        self
    }

    /// Returns the copy that decoding this record's encoding produces:
    /// every numeric field masked to its wire width.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            format_version: self.format_version,
            is_tombstone: self.is_tombstone,
            timestamp: self.timestamp,
            version_number: u64::from(truncate_to_u32(self.version_number)),
            segment_number: u32::from(truncate_to_u8(u64::from(self.segment_number))),
            segment_count: u64::from(truncate_to_u32(self.segment_count)),
            segment_size: u64::from(truncate_to_u32(self.segment_size)),
            total_size: self.total_size,
            adler32: u64::from(truncate_to_u32(self.adler32)),
            md5: self.md5,
            userid: u32::from(truncate_to_u16(u64::from(self.userid))),
            groupid: u32::from(truncate_to_u16(u64::from(self.groupid))),
            permissions: u32::from(truncate_to_u16(u64::from(self.permissions))),
            file_name: self.file_name.clone(),
        }
    }

    /// Returns true if every field fits its wire width, so the record
    /// survives an encode/decode round trip unchanged.
    #[must_use]
    pub fn is_in_range(&self) -> bool {
        *self == self.normalized()
    }

    /// Format version of the codec that produced this record.
    #[must_use]
    pub fn format_version(&self) -> u16 {
        self.format_version
    }

    /// Whether this record marks a deletion.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.is_tombstone
    }

    /// Timestamp of the write or deletion.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Version number of the key.
    #[must_use]
    pub fn version_number(&self) -> u64 {
        self.version_number
    }

    /// Segment position within the version.
    #[must_use]
    pub fn segment_number(&self) -> u32 {
        self.segment_number
    }

    /// Total number of segments in the version.
    #[must_use]
    pub fn segment_count(&self) -> u64 {
        self.segment_count
    }

    /// Size of this segment in bytes.
    #[must_use]
    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    /// Size of the whole object in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Adler-32 checksum of the segment.
    #[must_use]
    pub fn adler32(&self) -> u64 {
        self.adler32
    }

    /// MD5 digest of the segment.
    #[must_use]
    pub fn md5(&self) -> &[u8; 16] {
        &self.md5
    }

    /// Owning user id.
    #[must_use]
    pub fn userid(&self) -> u32 {
        self.userid
    }

    /// Owning group id.
    #[must_use]
    pub fn groupid(&self) -> u32 {
        self.groupid
    }

    /// Permission bits.
    #[must_use]
    pub fn permissions(&self) -> u32 {
        self.permissions
    }

    /// Original file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}
