//! Field-width truncation applied when a record is encoded.
//!
//! Values wider than the wire width of their field are masked, never
//! rejected: a segment number of 256 is written as 0. Callers that need
//! stricter checking must validate before building the record.

/// Keeps the low 8 bits.
#[must_use]
pub const fn truncate_to_u8(value: u64) -> u8 {
    (value & 0xFF) as u8
}

/// Keeps the low 16 bits.
#[must_use]
pub const fn truncate_to_u16(value: u64) -> u16 {
    (value & 0xFFFF) as u16
}

/// Keeps the low 32 bits.
#[must_use]
pub const fn truncate_to_u32(value: u64) -> u32 {
    (value & 0xFFFF_FFFF) as u32
}
