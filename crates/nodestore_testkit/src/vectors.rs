//! Wire-format test vectors for NodeStore.
//!
//! Fixed byte strings for records and replies, shared with clients written
//! against the same formats.

use serde::{Deserialize, Serialize};

/// A test vector that can be shared across implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Encoded bytes (hex).
    pub input_hex: String,
    /// Expected error kind (if decoding should fail).
    pub expected_error: Option<String>,
}

const TOMBSTONE_HEX: &str = concat!(
    "0001",
    "01",
    "0102030405060708",
    "00000003",
    "00",
    "00000000",
    "00000000",
    "0000000000000000",
    "00000000",
    "00000000000000000000000000000000",
    "000000000000",
    "00000000",
);

const LIVE_RECORD_HEX: &str = concat!(
    "0001",
    "00",
    "0000000000000001",
    "00000001",
    "02",
    "00000003",
    "0000000a",
    "000000000000001e",
    "deadbeef",
    "11111111111111111111111111111111",
    "000000000000",
    "00000005",
    "612e747874",
);

/// Content record vectors.
pub fn record_vectors() -> Vec<TestVector> {
    vec![
        TestVector {
            id: "record_tombstone".into(),
            description: "Tombstone at 0x0102030405060708, version 3, segment 0".into(),
            input_hex: TOMBSTONE_HEX.into(),
            expected_error: None,
        },
        TestVector {
            id: "record_live".into(),
            description: "Segment 2 of 3 of a.txt, version 1".into(),
            input_hex: LIVE_RECORD_HEX.into(),
            expected_error: None,
        },
        TestVector {
            id: "record_future_version".into(),
            description: "Header written by format version 2".into(),
            input_hex: format!("0002{}", &TOMBSTONE_HEX[4..]),
            expected_error: Some("format_version_mismatch".into()),
        },
        TestVector {
            id: "record_short_header".into(),
            description: "Header one byte short".into(),
            input_hex: TOMBSTONE_HEX[..114].into(),
            expected_error: Some("malformed".into()),
        },
        TestVector {
            id: "record_short_file_name".into(),
            description: "File name shorter than its length prefix".into(),
            input_hex: LIVE_RECORD_HEX[..LIVE_RECORD_HEX.len() - 2].into(),
            expected_error: Some("malformed".into()),
        },
    ]
}

/// Archive and retrieve reply vectors.
pub fn reply_vectors() -> Vec<TestVector> {
    vec![
        TestVector {
            id: "archive_successful".into(),
            description: "Archive success: header only".into(),
            input_hex: format!("{}00", "61".repeat(32)),
            expected_error: None,
        },
        TestVector {
            id: "archive_out_of_sequence".into(),
            description: "Archive out-of-sequence with message \"x\"".into(),
            input_hex: format!("{}03{}78", "62".repeat(32), "00000001"),
            expected_error: None,
        },
        TestVector {
            id: "retrieve_successful".into(),
            description: "Retrieve success: payload runs to the end".into(),
            input_hex: format!("{}00{}", "63".repeat(32), "7061796c6f6164"),
            expected_error: None,
        },
        TestVector {
            id: "retrieve_key_not_found".into(),
            description: "Retrieve key-not-found with message \"abc\"".into(),
            input_hex: format!("{}01{}616263", "64".repeat(32), "00000003"),
            expected_error: None,
        },
        TestVector {
            id: "reply_short_header".into(),
            description: "Reply shorter than its 33-byte header".into(),
            input_hex: "61".repeat(32),
            expected_error: Some("malformed".into()),
        },
    ]
}

/// Returns all test vectors.
pub fn all_vectors() -> Vec<TestVector> {
    let mut vectors = Vec::new();
    vectors.extend(record_vectors());
    vectors.extend(reply_vectors());
    vectors
}

/// Exports all vectors as JSON.
pub fn export_vectors_json() -> String {
    serde_json::to_string_pretty(&all_vectors()).unwrap_or_else(|_| "[]".to_string())
}

/// Decodes a hex string. Returns `None` on odd length or a non-hex digit.
pub fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
