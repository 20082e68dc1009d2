//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use bytes::Bytes;
use nodestore_coordinator::{IoOperation, SegmentDescriptor};
use nodestore_protocol::{
    ArchiveKeyNext, ArchiveKeyNextReply, ArchiveResult, RequestId, RetrieveKeyNext,
    RetrieveKeyNextReply, RetrieveResult,
};
use nodestore_record::{ContentFields, ContentRecord};
use proptest::prelude::*;

/// Strategy for generating request-ids.
pub fn request_id_strategy() -> impl Strategy<Value = RequestId> {
    prop::array::uniform16(any::<u8>()).prop_map(|bytes| {
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        RequestId::parse(&hex).unwrap_or_else(|_| RequestId::generate())
    })
}

/// Strategy for generating object keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}(/[a-z0-9._-]{1,16}){0,3}")
        .expect("Invalid regex")
}

/// Strategy for generating file names, including non-ASCII ones.
pub fn file_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        prop::string::string_regex("[a-zA-Z0-9_]{1,24}\\.[a-z]{1,4}").expect("Invalid regex"),
        "\\PC{0,40}",
    ]
}

/// Strategy for record fields that fit their wire widths.
pub fn content_fields_strategy() -> impl Strategy<Value = ContentFields> {
    (
        any::<u64>(),
        any::<u32>(),
        any::<u8>(),
        any::<u32>(),
        any::<u32>(),
        any::<u64>(),
        any::<u32>(),
        prop::array::uniform16(any::<u8>()),
        file_name_strategy(),
    )
        .prop_map(
            |(
                timestamp,
                version_number,
                segment_number,
                segment_count,
                segment_size,
                total_size,
                adler32,
                md5,
                file_name,
            )| ContentFields {
                timestamp,
                version_number: u64::from(version_number),
                segment_number: u32::from(segment_number),
                segment_count: u64::from(segment_count),
                segment_size: u64::from(segment_size),
                total_size,
                adler32: u64::from(adler32),
                md5,
                file_name,
            },
        )
}

/// Strategy for record fields with values wider than their wire widths.
pub fn wide_content_fields_strategy() -> impl Strategy<Value = ContentFields> {
    (content_fields_strategy(), any::<u64>(), any::<u32>(), any::<u64>()).prop_map(
        |(mut fields, version_number, segment_number, adler32)| {
            fields.version_number = version_number;
            fields.segment_number = segment_number;
            fields.adler32 = adler32;
            fields
        },
    )
}

/// Strategy for in-range records: live ones with ownership, and tombstones.
pub fn content_record_strategy() -> impl Strategy<Value = ContentRecord> {
    prop_oneof![
        3 => (content_fields_strategy(), any::<u16>(), any::<u16>(), any::<u16>()).prop_map(
            |(fields, userid, groupid, permissions)| {
                ContentRecord::from_fields(fields).with_ownership(
                    u32::from(userid),
                    u32::from(groupid),
                    u32::from(permissions),
                )
            }
        ),
        1 => (any::<u64>(), any::<u32>(), any::<u8>()).prop_map(|(timestamp, version, segment)| {
            ContentRecord::make_tombstone(timestamp, u64::from(version), u32::from(segment))
        }),
    ]
}

/// Strategy for archive result codes.
pub fn archive_result_strategy() -> impl Strategy<Value = ArchiveResult> {
    prop_oneof![
        Just(ArchiveResult::Successful),
        Just(ArchiveResult::InvalidDuplicate),
        Just(ArchiveResult::Exception),
        Just(ArchiveResult::OutOfSequence),
    ]
}

/// Strategy for retrieve result codes.
pub fn retrieve_result_strategy() -> impl Strategy<Value = RetrieveResult> {
    prop_oneof![
        Just(RetrieveResult::Successful),
        Just(RetrieveResult::KeyNotFound),
        Just(RetrieveResult::Exception),
        Just(RetrieveResult::Database),
        Just(RetrieveResult::InvalidDuplicate),
    ]
}

/// Strategy for segment payloads.
pub fn payload_strategy() -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..2048).prop_map(Bytes::from)
}

/// Strategy for archive replies of any result.
pub fn archive_reply_strategy() -> impl Strategy<Value = ArchiveKeyNextReply> {
    (request_id_strategy(), archive_result_strategy(), "\\PC{0,64}")
        .prop_map(|(id, result, message)| ArchiveKeyNextReply::error(id, result, message))
}

/// Strategy for retrieve replies of any result.
pub fn retrieve_reply_strategy() -> impl Strategy<Value = RetrieveKeyNextReply> {
    (
        request_id_strategy(),
        retrieve_result_strategy(),
        payload_strategy(),
        "\\PC{0,64}",
    )
        .prop_map(|(id, result, payload, message)| match result {
            RetrieveResult::Successful => RetrieveKeyNextReply::success(id, payload),
            _ => RetrieveKeyNextReply::error(id, result, message),
        })
}

/// Strategy for the segments of one archive transfer, in order.
pub fn archive_transfer_strategy() -> impl Strategy<Value = Vec<ArchiveKeyNext>> {
    (
        request_id_strategy(),
        key_strategy(),
        1u32..1000,
        prop::collection::vec(payload_strategy(), 1..6),
        file_name_strategy(),
    )
        .prop_map(|(request_id, key, version_number, payloads, file_name)| {
            let segment_count = payloads.len() as u32;
            let total_size = payloads.iter().map(|p| p.len() as u64).sum();
            payloads
                .into_iter()
                .enumerate()
                .map(|(segment, data)| ArchiveKeyNext {
                    request_id,
                    key: key.clone(),
                    timestamp: 1_700_000_000,
                    version_number,
                    segment_number: segment as u8,
                    segment_count,
                    total_size,
                    adler32: 0,
                    md5: [0u8; 16],
                    file_name: file_name.clone(),
                    data,
                })
                .collect()
        })
}

/// Strategy for retrieve requests.
pub fn retrieve_request_strategy() -> impl Strategy<Value = RetrieveKeyNext> {
    (request_id_strategy(), key_strategy(), any::<u32>(), any::<u8>()).prop_map(
        |(request_id, key, version_number, segment_number)| RetrieveKeyNext {
            request_id,
            key,
            version_number,
            segment_number,
        },
    )
}

/// Strategy for segment descriptors of either operation.
pub fn segment_descriptor_strategy() -> impl Strategy<Value = SegmentDescriptor> {
    let operation = prop_oneof![
        (any::<u64>(), any::<u64>()).prop_map(|(offset, length)| IoOperation::Read {
            offset,
            length
        }),
        payload_strategy().prop_map(|data| IoOperation::Write { data }),
    ];
    (key_strategy(), any::<u32>(), any::<u8>(), operation).prop_map(
        |(key, version_number, segment_number, operation)| SegmentDescriptor {
            key,
            version_number,
            segment_number,
            operation,
        },
    )
}
