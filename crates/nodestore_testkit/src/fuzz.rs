//! Fuzz testing harnesses for NodeStore.
//!
//! Each target takes arbitrary bytes and must return without panicking,
//! whether or not the bytes decode. They can be driven by cargo-fuzz or
//! by the proptest runners below.

use nodestore_coordinator::{SegmentDescriptor, WorkEnvelope, WorkerMessage};
use nodestore_protocol::{ArchiveKeyNextReply, Request, RetrieveKeyNextReply};
use nodestore_record::{decode, decode_all, encode};

/// Fuzz target for content record decoding.
///
/// A record that decodes must survive a second encode/decode unchanged.
pub fn fuzz_record_decode(data: &[u8]) {
    if let Ok((record, end)) = decode(data, 0) {
        assert!(end <= data.len(), "decode ran past the buffer");
        if let Ok(encoded) = encode(&record) {
            let redecoded = decode(&encoded, 0).map(|(r, _)| r);
            assert_eq!(redecoded, Ok(record), "record changed on re-encoding");
        }
    }
    let _ = decode_all(data);
}

/// Fuzz target for request decoding.
///
/// A request that decodes must survive a second encode/decode unchanged.
pub fn fuzz_request_decode(data: &[u8]) {
    if let Ok(request) = Request::unmarshall(data) {
        if let Ok(encoded) = request.marshall() {
            assert_eq!(
                Request::unmarshall(&encoded),
                Ok(request),
                "request changed on re-encoding"
            );
        }
    }
}

/// Fuzz target for reply decoding.
pub fn fuzz_reply_decode(data: &[u8]) {
    if let Ok(reply) = ArchiveKeyNextReply::unmarshall(data) {
        let _ = reply.marshall();
    }
    if let Ok(reply) = RetrieveKeyNextReply::unmarshall(data) {
        if let Ok(encoded) = reply.marshall() {
            assert_eq!(
                RetrieveKeyNextReply::unmarshall(&encoded),
                Ok(reply),
                "retrieve reply changed on re-encoding"
            );
        }
    }
}

/// Fuzz target for the controller/worker frames.
pub fn fuzz_worker_frames(data: &[u8]) {
    let _ = WorkerMessage::from_frame(data);
    let _ = WorkEnvelope::from_frame(data);
    let _ = SegmentDescriptor::unmarshall(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{archive_transfer_strategy, content_record_strategy};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        #[test]
        fn record_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
            fuzz_record_decode(&data);
        }

        #[test]
        fn request_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
            fuzz_request_decode(&data);
        }

        #[test]
        fn reply_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
            fuzz_reply_decode(&data);
        }

        #[test]
        fn worker_frames_never_panic(data in prop::collection::vec(any::<u8>(), 0..128)) {
            fuzz_worker_frames(&data);
        }

        #[test]
        fn mutated_records_never_panic(
            record in content_record_strategy(),
            index in any::<prop::sample::Index>(),
            byte in any::<u8>(),
        ) {
            let mut bytes = encode(&record).unwrap();
            let i = index.index(bytes.len());
            bytes[i] = byte;
            fuzz_record_decode(&bytes);
        }

        #[test]
        fn truncated_requests_never_panic(
            transfer in archive_transfer_strategy(),
            cut in any::<prop::sample::Index>(),
        ) {
            let bytes = Request::ArchiveKeyNext(transfer[0].clone()).marshall().unwrap();
            fuzz_request_decode(&bytes[..cut.index(bytes.len())]);
            fuzz_request_decode(&bytes);
        }
    }

    #[test]
    fn empty_input() {
        fuzz_record_decode(&[]);
        fuzz_request_decode(&[]);
        fuzz_reply_decode(&[]);
        fuzz_worker_frames(&[]);
    }
}
