//! Main storage node server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use crate::index::RecordIndex;
use nodestore_coordinator::SegmentDispatch;
use nodestore_protocol::{
    peek_request_id, ArchiveKeyNext, ArchiveKeyNextReply, ArchiveResult, Request,
    RetrieveKeyNext, RetrieveKeyNextReply, RetrieveResult, ARCHIVE_KEY_NEXT_KIND,
    RETRIEVE_KEY_NEXT_KIND,
};
use nodestore_record::ContentRecord;
use nodestore_storage::SharedBackend;
use std::sync::Arc;

/// The storage node server for one volume.
///
/// The server sequences archive and retrieve transfers, keeps the record
/// index, and hands segment bytes to a [`SegmentDispatch`] (usually an
/// `IoController` backed by a worker pool).
///
/// # Example
///
/// ```
/// use nodestore_coordinator::{InlineDispatch, VolumeIo};
/// use nodestore_protocol::{RequestId, RetrieveKeyNext, RetrieveResult};
/// use nodestore_server::{NodeServer, ServerConfig};
/// use nodestore_storage::InMemoryBackend;
/// use std::sync::Arc;
///
/// let volume = Arc::new(InMemoryBackend::new());
/// let dispatch = Arc::new(InlineDispatch::new(VolumeIo::new(volume)));
/// let server = NodeServer::open(
///     ServerConfig::new("vol"),
///     Arc::new(InMemoryBackend::new()),
///     dispatch,
/// )
/// .unwrap();
///
/// let reply = server.retrieve_key_next(RetrieveKeyNext {
///     request_id: RequestId::generate(),
///     key: "missing".into(),
///     version_number: 0,
///     segment_number: 0,
/// });
/// assert_eq!(reply.result(), RetrieveResult::KeyNotFound);
/// ```
pub struct NodeServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl NodeServer {
    /// Creates a server over an already opened record index.
    pub fn new(config: ServerConfig, index: RecordIndex, dispatch: Arc<dyn SegmentDispatch>) -> Self {
        let context = Arc::new(HandlerContext::new(config, index, dispatch));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Opens the record log and creates a server over it.
    ///
    /// # Errors
    ///
    /// Fails if the record log cannot be replayed.
    pub fn open(
        config: ServerConfig,
        record_log: SharedBackend,
        dispatch: Arc<dyn SegmentDispatch>,
    ) -> ServerResult<Self> {
        let index = RecordIndex::open(record_log, config.sync_on_insert)?;
        tracing::info!(
            volume = %config.volume_name,
            records = index.len(),
            "storage node server opened"
        );
        Ok(Self::new(config, index, dispatch))
    }

    /// Handles an archive-key-next call.
    pub fn archive_key_next(&self, request: ArchiveKeyNext) -> ArchiveKeyNextReply {
        self.handler.archive_key_next(request)
    }

    /// Handles a retrieve-key-next call.
    pub fn retrieve_key_next(&self, request: RetrieveKeyNext) -> RetrieveKeyNextReply {
        self.handler.retrieve_key_next(request)
    }

    /// Handles an encoded request and returns the encoded reply.
    ///
    /// A request that does not decode still gets an `error_exception` reply
    /// when its kind and request-id can be read.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Protocol`](crate::ServerError::Protocol) if not
    /// even the request-id can be read, or if the reply cannot be encoded.
    pub fn handle_message(&self, message: &[u8]) -> ServerResult<Vec<u8>> {
        let request = match Request::unmarshall(message) {
            Ok(request) => request,
            Err(err) => {
                let Some((kind, request_id)) = peek_request_id(message) else {
                    return Err(err.into());
                };
                tracing::warn!(request_id = %request_id, kind, error = %err, "undecodable request");
                let reply = match kind {
                    ARCHIVE_KEY_NEXT_KIND => {
                        ArchiveKeyNextReply::error(request_id, ArchiveResult::Exception, err.to_string())
                            .marshall()?
                    }
                    RETRIEVE_KEY_NEXT_KIND => RetrieveKeyNextReply::error(
                        request_id,
                        RetrieveResult::Exception,
                        err.to_string(),
                    )
                    .marshall()?,
                    _ => return Err(err.into()),
                };
                return Ok(reply);
            }
        };

        let reply = match request {
            Request::ArchiveKeyNext(request) => self.archive_key_next(request).marshall()?,
            Request::RetrieveKeyNext(request) => self.retrieve_key_next(request).marshall()?,
        };
        Ok(reply)
    }

    /// Marks every stored version of `key` destroyed at `timestamp`.
    ///
    /// # Errors
    ///
    /// Fails if the tombstone cannot be written to the record log.
    pub fn destroy_key(&self, key: &str, timestamp: u64) -> ServerResult<ContentRecord> {
        let tombstone = self.context.index.insert_tombstone(key, timestamp)?;
        tracing::info!(key, timestamp, "key destroyed");
        Ok(tombstone)
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the record index.
    pub fn index(&self) -> &RecordIndex {
        &self.context.index
    }

    /// Number of transfers in progress.
    pub fn active_transfers(&self) -> usize {
        self.context.tracker.active_len()
    }
}

impl std::fmt::Debug for NodeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeServer")
            .field("volume", &self.context.config.volume_name)
            .field("index", &self.context.index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use nodestore_coordinator::{InlineDispatch, VolumeIo};
    use nodestore_protocol::RequestId;
    use nodestore_storage::InMemoryBackend;

    fn create_server() -> NodeServer {
        let dispatch = Arc::new(InlineDispatch::new(VolumeIo::new(Arc::new(
            InMemoryBackend::new(),
        ))));
        NodeServer::open(
            ServerConfig::new("vol"),
            Arc::new(InMemoryBackend::new()),
            dispatch,
        )
        .unwrap()
    }

    fn archive(id: RequestId, segment: u8, count: u32) -> ArchiveKeyNext {
        ArchiveKeyNext {
            request_id: id,
            key: "k".into(),
            timestamp: 10,
            version_number: 1,
            segment_number: segment,
            segment_count: count,
            total_size: 3,
            adler32: 0,
            md5: [0u8; 16],
            file_name: "f".into(),
            data: Bytes::from_static(b"abc"),
        }
    }

    #[test]
    fn encoded_archive_round_trip() {
        let server = create_server();
        let id = RequestId::generate();

        let bytes = Request::ArchiveKeyNext(archive(id, 0, 1)).marshall().unwrap();
        let reply = ArchiveKeyNextReply::unmarshall(&server.handle_message(&bytes).unwrap()).unwrap();
        assert_eq!(reply.result(), ArchiveResult::Successful);
        assert_eq!(reply.request_id(), &id);

        let bytes = Request::RetrieveKeyNext(RetrieveKeyNext {
            request_id: RequestId::generate(),
            key: "k".into(),
            version_number: 1,
            segment_number: 0,
        })
        .marshall()
        .unwrap();
        let reply =
            RetrieveKeyNextReply::unmarshall(&server.handle_message(&bytes).unwrap()).unwrap();
        assert_eq!(reply.payload().as_ref(), b"abc");
    }

    #[test]
    fn truncated_request_gets_exception_reply() {
        let server = create_server();
        let id = RequestId::generate();
        let bytes = Request::ArchiveKeyNext(archive(id, 0, 1)).marshall().unwrap();

        let reply = server.handle_message(&bytes[..40]).unwrap();
        let reply = ArchiveKeyNextReply::unmarshall(&reply).unwrap();
        assert_eq!(reply.result(), ArchiveResult::Exception);
        assert_eq!(reply.request_id(), &id);
        assert_eq!(server.index().len(), 0);
    }

    #[test]
    fn garbage_is_an_error() {
        let server = create_server();
        let err = server.handle_message(b"\x01nope").unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn destroy_hides_key() {
        let server = create_server();
        server.archive_key_next(archive(RequestId::generate(), 0, 1));

        let tombstone = server.destroy_key("k", 10).unwrap();
        assert!(tombstone.is_tombstone());
        let reply = server.retrieve_key_next(RetrieveKeyNext {
            request_id: RequestId::generate(),
            key: "k".into(),
            version_number: 0,
            segment_number: 0,
        });
        assert_eq!(reply.result(), RetrieveResult::KeyNotFound);
    }
}
