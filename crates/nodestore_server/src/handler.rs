//! Request handlers for archive and retrieve "next" calls.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::index::{RecordIndex, SegmentLocation};
use crate::tracker::{Direction, RequestTracker, SequenceError};
use bytes::Bytes;
use nodestore_coordinator::{
    CoordinatorError, IoOperation, IoOutcome, SegmentDescriptor, SegmentDispatch,
};
use nodestore_protocol::{
    ArchiveKeyNext, ArchiveKeyNextReply, ArchiveResult, RetrieveKeyNext, RetrieveKeyNextReply,
    RetrieveResult, MAX_SEGMENT_COUNT,
};
use nodestore_record::truncate::truncate_to_u32;
use nodestore_record::{ContentFields, ContentRecord};
use std::sync::Arc;

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Record index for the volume.
    pub index: RecordIndex,
    /// Sequencing state for transfers in progress.
    pub tracker: RequestTracker,
    dispatch: Arc<dyn SegmentDispatch>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, index: RecordIndex, dispatch: Arc<dyn SegmentDispatch>) -> Self {
        let tracker = RequestTracker::new(
            config.completed_request_capacity,
            config.max_active_transfers,
        );
        Self {
            config,
            index,
            tracker,
            dispatch,
        }
    }
}

/// Handler for archive and retrieve requests.
///
/// Handlers never fail: every error becomes a reply carrying a result code
/// and a message for the same request-id.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles one archive-key-next call.
    pub fn archive_key_next(&self, request: ArchiveKeyNext) -> ArchiveKeyNextReply {
        let request_id = request.request_id;
        match self.archive_segment(&request) {
            Ok(()) => {
                tracing::debug!(
                    request_id = %request_id,
                    key = %request.key,
                    segment = request.segment_number,
                    "segment archived"
                );
                ArchiveKeyNextReply::success(request_id)
            }
            Err(err) => {
                let result = archive_result_for(&err);
                tracing::warn!(
                    request_id = %request_id,
                    key = %request.key,
                    result = result.name(),
                    error = %err,
                    "archive-key-next failed"
                );
                ArchiveKeyNextReply::error(request_id, result, err.to_string())
            }
        }
    }

    /// Handles one retrieve-key-next call.
    pub fn retrieve_key_next(&self, request: RetrieveKeyNext) -> RetrieveKeyNextReply {
        let request_id = request.request_id;
        match self.retrieve_segment(&request) {
            Ok(data) => RetrieveKeyNextReply::success(request_id, data),
            Err(err) => {
                let result = retrieve_result_for(&err);
                tracing::warn!(
                    request_id = %request_id,
                    key = %request.key,
                    result = result.name(),
                    error = %err,
                    "retrieve-key-next failed"
                );
                RetrieveKeyNextReply::error(request_id, result, err.to_string())
            }
        }
    }

    fn archive_segment(&self, request: &ArchiveKeyNext) -> ServerResult<()> {
        let segment_number = u32::from(request.segment_number);
        if request.segment_count == 0 || request.segment_count > MAX_SEGMENT_COUNT {
            return Err(ServerError::InvalidRequest(format!(
                "segment count {} outside 1..={MAX_SEGMENT_COUNT}",
                request.segment_count
            )));
        }
        if segment_number >= request.segment_count {
            return Err(ServerError::InvalidRequest(format!(
                "segment {segment_number} of {}",
                request.segment_count
            )));
        }
        if request.data.len() > self.context.config.max_segment_size {
            return Err(ServerError::InvalidRequest(format!(
                "segment of {} bytes exceeds {}",
                request.data.len(),
                self.context.config.max_segment_size
            )));
        }

        let tracker = &self.context.tracker;
        tracker.advance(
            &request.request_id,
            Direction::Archive,
            &request.key,
            request.version_number,
            segment_number,
            Some(request.segment_count),
        )?;
        match self.store_segment(request) {
            Ok(()) => {
                if request.is_last() {
                    tracker.finish(&request.request_id);
                }
                Ok(())
            }
            Err(err) => {
                tracker.rewind(&request.request_id, segment_number);
                Err(err)
            }
        }
    }

    fn store_segment(&self, request: &ArchiveKeyNext) -> ServerResult<()> {
        let version_number = u64::from(request.version_number);
        let segment_number = u32::from(request.segment_number);
        let index = &self.context.index;
        if index.contains(&request.key, version_number, segment_number) {
            return Err(ServerError::DuplicateRecord {
                key: request.key.clone(),
                version_number,
                segment_number,
            });
        }

        let outcome = self.context.dispatch.dispatch(SegmentDescriptor {
            key: request.key.clone(),
            version_number: request.version_number,
            segment_number: request.segment_number,
            operation: IoOperation::Write {
                data: request.data.clone(),
            },
        })?;
        let IoOutcome::Written { offset, length } = outcome else {
            return Err(CoordinatorError::malformed("write answered with a read outcome").into());
        };

        let record = ContentRecord::from_fields(ContentFields {
            timestamp: request.timestamp,
            version_number,
            segment_number,
            segment_count: u64::from(request.segment_count),
            segment_size: request.data.len() as u64,
            total_size: request.total_size,
            adler32: u64::from(request.adler32),
            md5: request.md5,
            file_name: request.file_name.clone(),
        });
        index.insert(&request.key, record, SegmentLocation { offset, length })
    }

    fn retrieve_segment(&self, request: &RetrieveKeyNext) -> ServerResult<Bytes> {
        let tracker = &self.context.tracker;
        let segment_number = u32::from(request.segment_number);
        let pinned_version = tracker.advance(
            &request.request_id,
            Direction::Retrieve,
            &request.key,
            request.version_number,
            segment_number,
            None,
        )?;
        match self.load_segment(request, pinned_version) {
            Ok(loaded) => {
                if loaded.is_last {
                    tracker.finish(&request.request_id);
                } else if request.version_number == 0 {
                    tracker.pin_version(&request.request_id, loaded.version_number);
                }
                Ok(loaded.data)
            }
            Err(err) => {
                tracker.rewind(&request.request_id, segment_number);
                Err(err)
            }
        }
    }

    fn load_segment(
        &self,
        request: &RetrieveKeyNext,
        pinned_version: Option<u64>,
    ) -> ServerResult<LoadedSegment> {
        let index = &self.context.index;
        let segment_number = u32::from(request.segment_number);
        let version_number = match (request.version_number, pinned_version) {
            (0, Some(version)) => version,
            (0, None) => index
                .latest_version(&request.key)
                .ok_or_else(|| ServerError::KeyNotFound(request.key.clone()))?,
            (version, _) => u64::from(version),
        };

        let entry = index
            .lookup(&request.key, version_number, segment_number)?
            .ok_or_else(|| {
                ServerError::KeyNotFound(format!(
                    "{} version {version_number} segment {segment_number}",
                    request.key
                ))
            })?;

        let outcome = self.context.dispatch.dispatch(SegmentDescriptor {
            key: request.key.clone(),
            version_number: truncate_to_u32(version_number),
            segment_number: request.segment_number,
            operation: IoOperation::Read {
                offset: entry.location.offset,
                length: entry.location.length,
            },
        })?;
        let IoOutcome::Read { data } = outcome else {
            return Err(CoordinatorError::malformed("read answered with a write outcome").into());
        };

        Ok(LoadedSegment {
            data,
            version_number,
            is_last: u64::from(segment_number) + 1 >= entry.record.segment_count(),
        })
    }
}

/// One segment read for a retrieve call.
struct LoadedSegment {
    data: Bytes,
    /// Version the segment was read from, after resolving version 0.
    version_number: u64,
    /// Whether this is the last segment of its version.
    is_last: bool,
}

fn archive_result_for(err: &ServerError) -> ArchiveResult {
    match err {
        ServerError::Sequence(SequenceError::OutOfSequence { .. }) => ArchiveResult::OutOfSequence,
        ServerError::Sequence(SequenceError::Duplicate { .. })
        | ServerError::DuplicateRecord { .. } => ArchiveResult::InvalidDuplicate,
        _ => ArchiveResult::Exception,
    }
}

fn retrieve_result_for(err: &ServerError) -> RetrieveResult {
    match err {
        ServerError::KeyNotFound(_) => RetrieveResult::KeyNotFound,
        ServerError::Sequence(SequenceError::Duplicate { .. }) => RetrieveResult::InvalidDuplicate,
        err if err.is_database_error() => RetrieveResult::Database,
        _ => RetrieveResult::Exception,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodestore_coordinator::{CoordinatorResult, InlineDispatch, VolumeIo};
    use nodestore_protocol::RequestId;
    use nodestore_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A record log whose reads can be made to fail after it is opened.
    #[derive(Default)]
    struct FlakyLog {
        inner: InMemoryBackend,
        fail_reads: AtomicBool,
    }

    impl StorageBackend for FlakyLog {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("disk on fire")));
            }
            self.inner.read_at(offset, len)
        }
        fn append(&self, data: &[u8]) -> StorageResult<u64> {
            self.inner.append(data)
        }
        fn flush(&self) -> StorageResult<()> {
            self.inner.flush()
        }
        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }
        fn sync(&self) -> StorageResult<()> {
            self.inner.sync()
        }
        fn truncate(&self, new_size: u64) -> StorageResult<()> {
            self.inner.truncate(new_size)
        }
    }

    /// Segment I/O that can be told to fail its next dispatch.
    struct FailOnce {
        inner: InlineDispatch<VolumeIo>,
        fail_next: AtomicBool,
    }

    impl FailOnce {
        fn new() -> Self {
            Self {
                inner: InlineDispatch::new(VolumeIo::new(Arc::new(InMemoryBackend::new()))),
                fail_next: AtomicBool::new(false),
            }
        }
    }

    impl SegmentDispatch for FailOnce {
        fn dispatch(&self, descriptor: SegmentDescriptor) -> CoordinatorResult<IoOutcome> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(CoordinatorError::IoFailed("worker crashed".into()));
            }
            self.inner.dispatch(descriptor)
        }
    }

    fn build_handler(
        config: ServerConfig,
        log: Arc<FlakyLog>,
        dispatch: Arc<dyn SegmentDispatch>,
    ) -> RequestHandler {
        let index = RecordIndex::open(log, false).unwrap();
        RequestHandler::new(Arc::new(HandlerContext::new(config, index, dispatch)))
    }

    fn test_config() -> ServerConfig {
        ServerConfig::new("vol").with_max_segment_size(64)
    }

    fn create_handler_with_log(log: Arc<FlakyLog>) -> RequestHandler {
        build_handler(test_config(), log, Arc::new(FailOnce::new()))
    }

    fn create_handler() -> RequestHandler {
        create_handler_with_log(Arc::new(FlakyLog::default()))
    }

    fn archive(id: RequestId, key: &str, segment: u8, count: u32, data: &str) -> ArchiveKeyNext {
        ArchiveKeyNext {
            request_id: id,
            key: key.into(),
            timestamp: 1_000,
            version_number: 1,
            segment_number: segment,
            segment_count: count,
            total_size: 12,
            adler32: 0,
            md5: [0u8; 16],
            file_name: "notes.txt".into(),
            data: Bytes::copy_from_slice(data.as_bytes()),
        }
    }

    fn retrieve(id: RequestId, key: &str, version: u32, segment: u8) -> RetrieveKeyNext {
        RetrieveKeyNext {
            request_id: id,
            key: key.into(),
            version_number: version,
            segment_number: segment,
        }
    }

    fn archive_version(handler: &RequestHandler, key: &str, version: u32, parts: &[&str]) {
        let id = RequestId::generate();
        for (segment, part) in parts.iter().enumerate() {
            let reply = handler.archive_key_next(ArchiveKeyNext {
                version_number: version,
                ..archive(id, key, segment as u8, parts.len() as u32, part)
            });
            assert_eq!(reply.result(), ArchiveResult::Successful, "{}", reply.error_message());
        }
    }

    fn archive_object(handler: &RequestHandler, key: &str, parts: &[&str]) {
        archive_version(handler, key, 1, parts);
    }

    #[test]
    fn archive_in_order_succeeds() {
        let handler = create_handler();
        let id = RequestId::generate();
        for segment in 0..3 {
            let reply = handler.archive_key_next(archive(id, "k", segment, 3, "abcd"));
            assert!(!reply.is_error());
            assert_eq!(reply.request_id(), &id);
        }
        assert!(handler.context.tracker.is_completed(&id));
        assert_eq!(handler.context.index.len(), 3);
    }

    #[test]
    fn archive_skip_is_out_of_sequence() {
        let handler = create_handler();
        let id = RequestId::generate();
        handler.archive_key_next(archive(id, "k", 0, 3, "abcd"));

        let reply = handler.archive_key_next(archive(id, "k", 2, 3, "abcd"));
        assert_eq!(reply.result(), ArchiveResult::OutOfSequence);
        assert!(reply.error_message().contains("expected segment 1"));
        assert_eq!(handler.context.index.len(), 1);
    }

    #[test]
    fn archive_repeat_is_duplicate() {
        let handler = create_handler();
        let id = RequestId::generate();
        handler.archive_key_next(archive(id, "k", 0, 2, "abcd"));

        let reply = handler.archive_key_next(archive(id, "k", 0, 2, "abcd"));
        assert_eq!(reply.result(), ArchiveResult::InvalidDuplicate);
    }

    #[test]
    fn archive_existing_segment_under_new_request_is_duplicate() {
        let handler = create_handler();
        archive_object(&handler, "k", &["only"]);

        let reply = handler.archive_key_next(archive(RequestId::generate(), "k", 0, 1, "again"));
        assert_eq!(reply.result(), ArchiveResult::InvalidDuplicate);
        assert_eq!(handler.context.index.len(), 1);
    }

    #[test]
    fn archive_rejects_bad_segment_fields() {
        let handler = create_handler();
        let reply = handler.archive_key_next(archive(RequestId::generate(), "k", 3, 3, "x"));
        assert_eq!(reply.result(), ArchiveResult::Exception);

        let big = "x".repeat(65);
        let reply = handler.archive_key_next(archive(RequestId::generate(), "k", 0, 1, &big));
        assert_eq!(reply.result(), ArchiveResult::Exception);

        for count in [0, MAX_SEGMENT_COUNT + 1] {
            let reply = handler.archive_key_next(archive(RequestId::generate(), "k", 0, count, "x"));
            assert_eq!(reply.result(), ArchiveResult::Exception);
            assert!(reply.error_message().contains("segment count"));
        }
        assert_eq!(handler.context.tracker.active_len(), 0);
        assert!(handler.context.index.is_empty());
    }

    #[test]
    fn archive_segment_count_change_is_rejected() {
        let handler = create_handler();
        let id = RequestId::generate();
        let first = handler.archive_key_next(archive(id, "k", 0, 3, "abcd"));
        assert_eq!(first.result(), ArchiveResult::Successful);

        let changed = handler.archive_key_next(archive(id, "k", 1, 2, "abcd"));
        assert_eq!(changed.result(), ArchiveResult::Exception);
        assert!(changed.error_message().contains("segment count changed from 3 to 2"));
        assert_eq!(handler.context.index.len(), 1);

        let kept = handler.archive_key_next(archive(id, "k", 1, 3, "abcd"));
        assert_eq!(kept.result(), ArchiveResult::Successful);
    }

    #[test]
    fn archive_store_failure_can_be_retried_with_same_id() {
        let dispatch = Arc::new(FailOnce::new());
        let handler = build_handler(test_config(), Arc::default(), dispatch.clone());
        let id = RequestId::generate();
        let first = handler.archive_key_next(archive(id, "k", 0, 2, "hello "));
        assert_eq!(first.result(), ArchiveResult::Successful);

        dispatch.fail_next.store(true, Ordering::SeqCst);
        let failed = handler.archive_key_next(archive(id, "k", 1, 2, "world"));
        assert_eq!(failed.result(), ArchiveResult::Exception);
        assert!(failed.error_message().contains("worker crashed"));

        let retried = handler.archive_key_next(archive(id, "k", 1, 2, "world"));
        assert_eq!(retried.result(), ArchiveResult::Successful, "{}", retried.error_message());
        assert!(handler.context.tracker.is_completed(&id));
        assert_eq!(handler.context.index.len(), 2);

        let reader = RequestId::generate();
        assert_eq!(
            handler.retrieve_key_next(retrieve(reader, "k", 1, 0)).payload().as_ref(),
            b"hello "
        );
        assert_eq!(
            handler.retrieve_key_next(retrieve(reader, "k", 1, 1)).payload().as_ref(),
            b"world"
        );
    }

    #[test]
    fn archive_first_segment_failure_restarts_cleanly() {
        let dispatch = Arc::new(FailOnce::new());
        let handler = build_handler(test_config(), Arc::default(), dispatch.clone());
        let id = RequestId::generate();

        dispatch.fail_next.store(true, Ordering::SeqCst);
        let failed = handler.archive_key_next(archive(id, "k", 0, 1, "data"));
        assert_eq!(failed.result(), ArchiveResult::Exception);
        assert_eq!(handler.context.tracker.active_len(), 0);

        let retried = handler.archive_key_next(archive(id, "k", 0, 1, "data"));
        assert_eq!(retried.result(), ArchiveResult::Successful);
    }

    #[test]
    fn idle_transfers_are_evicted_past_the_limit() {
        let config = test_config().with_max_active_transfers(1);
        let handler = build_handler(config, Arc::default(), Arc::new(FailOnce::new()));
        let (a, b) = (RequestId::generate(), RequestId::generate());
        handler.archive_key_next(archive(a, "a", 0, 2, "a0"));
        handler.archive_key_next(archive(b, "b", 0, 2, "b0"));
        assert_eq!(handler.context.tracker.active_len(), 1);

        let evicted = handler.archive_key_next(archive(a, "a", 1, 2, "a1"));
        assert_eq!(evicted.result(), ArchiveResult::OutOfSequence);
        let kept = handler.archive_key_next(archive(b, "b", 1, 2, "b1"));
        assert_eq!(kept.result(), ArchiveResult::Successful);
        assert_eq!(handler.context.tracker.active_len(), 0);
    }

    #[test]
    fn retrieve_returns_archived_segments() {
        let handler = create_handler();
        archive_object(&handler, "k", &["hello ", "world"]);

        let id = RequestId::generate();
        let first = handler.retrieve_key_next(retrieve(id, "k", 1, 0));
        assert_eq!(first.result(), RetrieveResult::Successful);
        assert_eq!(first.payload().as_ref(), b"hello ");
        let second = handler.retrieve_key_next(retrieve(id, "k", 1, 1));
        assert_eq!(second.payload().as_ref(), b"world");
        assert!(handler.context.tracker.is_completed(&id));
    }

    #[test]
    fn retrieve_version_zero_reads_latest() {
        let handler = create_handler();
        archive_object(&handler, "k", &["v1"]);
        let id = RequestId::generate();
        handler.archive_key_next(ArchiveKeyNext {
            version_number: 2,
            ..archive(id, "k", 0, 1, "v2")
        });

        let reply = handler.retrieve_key_next(retrieve(RequestId::generate(), "k", 0, 0));
        assert_eq!(reply.payload().as_ref(), b"v2");
    }

    #[test]
    fn retrieve_version_zero_stays_on_the_first_resolved_version() {
        let handler = create_handler();
        archive_version(&handler, "k", 1, &["a1", "b1"]);

        let id = RequestId::generate();
        let first = handler.retrieve_key_next(retrieve(id, "k", 0, 0));
        assert_eq!(first.payload().as_ref(), b"a1");

        archive_version(&handler, "k", 2, &["a2", "b2", "c2"]);

        let second = handler.retrieve_key_next(retrieve(id, "k", 0, 1));
        assert_eq!(second.result(), RetrieveResult::Successful);
        assert_eq!(second.payload().as_ref(), b"b1");
        assert!(handler.context.tracker.is_completed(&id));

        let fresh = handler.retrieve_key_next(retrieve(RequestId::generate(), "k", 0, 0));
        assert_eq!(fresh.payload().as_ref(), b"a2");
    }

    #[test]
    fn retrieve_missing_key() {
        let handler = create_handler();
        let reply = handler.retrieve_key_next(retrieve(RequestId::generate(), "nope", 0, 0));
        assert_eq!(reply.result(), RetrieveResult::KeyNotFound);
        assert!(reply.payload().is_empty());
        assert_eq!(handler.context.tracker.active_len(), 0);
    }

    #[test]
    fn retrieve_skip_is_an_exception() {
        let handler = create_handler();
        archive_object(&handler, "k", &["a", "b", "c"]);

        let id = RequestId::generate();
        handler.retrieve_key_next(retrieve(id, "k", 1, 0));
        let reply = handler.retrieve_key_next(retrieve(id, "k", 1, 2));
        assert_eq!(reply.result(), RetrieveResult::Exception);
        assert!(reply.error_message().contains("out of sequence"));
    }

    #[test]
    fn retrieve_repeat_is_duplicate() {
        let handler = create_handler();
        archive_object(&handler, "k", &["a", "b"]);

        let id = RequestId::generate();
        handler.retrieve_key_next(retrieve(id, "k", 1, 0));
        let reply = handler.retrieve_key_next(retrieve(id, "k", 1, 0));
        assert_eq!(reply.result(), RetrieveResult::InvalidDuplicate);
    }

    #[test]
    fn retrieve_log_failure_is_database_error() {
        let log = Arc::new(FlakyLog::default());
        let handler = create_handler_with_log(log.clone());
        archive_object(&handler, "k", &["data"]);

        log.fail_reads.store(true, Ordering::SeqCst);
        let reply = handler.retrieve_key_next(retrieve(RequestId::generate(), "k", 1, 0));
        assert_eq!(reply.result(), RetrieveResult::Database);
        assert!(reply.error_message().contains("disk on fire"));
    }
}
