//! Per-request sequencing of "next" calls.
//!
//! A transfer starts with segment 0 and advances one segment per call. The
//! tracker is the only place ordering is decided; replies are built from
//! what it returns.

use nodestore_protocol::RequestId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Which way data moves in a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to node.
    Archive,
    /// Node to client.
    Retrieve,
}

/// A rejected "next" call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// The segment number skipped ahead.
    #[error("out of sequence: expected segment {expected}, got {actual}")]
    OutOfSequence {
        /// Segment the tracker was waiting for.
        expected: u32,
        /// Segment that arrived.
        actual: u32,
    },

    /// The segment was already handled for this request.
    #[error("duplicate segment {segment_number}")]
    Duplicate {
        /// Segment that arrived again.
        segment_number: u32,
    },

    /// An archive request-id was reused for a retrieve, or the reverse.
    #[error("request-id already used for the other direction")]
    DirectionMismatch,

    /// The request-id was already used for another key or version.
    #[error("request-id already used for key {key} version {version_number}")]
    TransferMismatch {
        /// Key the transfer was started for.
        key: String,
        /// Version the transfer was started for.
        version_number: u32,
    },

    /// A segment declared a different segment count than the transfer's
    /// first segment.
    #[error("segment count changed from {expected} to {actual}")]
    SegmentCountMismatch {
        /// Count declared by segment 0.
        expected: u32,
        /// Count declared by this segment.
        actual: u32,
    },
}

#[derive(Debug)]
struct Transfer {
    direction: Direction,
    key: String,
    version_number: u32,
    segment_count: Option<u32>,
    pinned_version: Option<u64>,
    next_segment: u32,
    last_touched: u64,
}

#[derive(Debug)]
struct TrackerState {
    active: HashMap<RequestId, Transfer>,
    idle_order: BTreeMap<u64, RequestId>,
    clock: u64,
    completed_order: VecDeque<RequestId>,
    completed: HashSet<RequestId>,
}

impl TrackerState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove_active(&mut self, request_id: &RequestId) -> Option<Transfer> {
        let transfer = self.active.remove(request_id)?;
        self.idle_order.remove(&transfer.last_touched);
        Some(transfer)
    }

    fn evict_idlest(&mut self) {
        let Some((_, request_id)) = self.idle_order.pop_first() else {
            return;
        };
        if let Some(transfer) = self.active.remove(&request_id) {
            tracing::warn!(
                request_id = %request_id,
                key = %transfer.key,
                next_segment = transfer.next_segment,
                "evicting idle transfer"
            );
        }
    }
}

/// Sequencing state for every transfer in progress.
///
/// Finished request-ids are remembered in a bounded FIFO so late repeats are
/// reported as duplicates rather than as new transfers. Transfers in progress
/// are bounded too: starting one past the limit evicts the transfer that has
/// been idle longest, and a later call for it is treated as a new transfer.
#[derive(Debug)]
pub struct RequestTracker {
    capacity: usize,
    max_active: usize,
    state: Mutex<TrackerState>,
}

impl RequestTracker {
    /// Creates a tracker remembering up to `completed_capacity` finished ids
    /// and following at most `max_active` transfers at once.
    pub fn new(completed_capacity: usize, max_active: usize) -> Self {
        Self {
            capacity: completed_capacity,
            max_active: max_active.max(1),
            state: Mutex::new(TrackerState {
                active: HashMap::new(),
                idle_order: BTreeMap::new(),
                clock: 0,
                completed_order: VecDeque::new(),
                completed: HashSet::new(),
            }),
        }
    }

    /// Accepts or rejects the next segment of a transfer.
    ///
    /// Archive calls pass the declared `segment_count`; the count of segment 0
    /// is held for the rest of the transfer. On success, returns the version
    /// pinned with [`pin_version`](Self::pin_version), if any.
    ///
    /// The caller reports the end of the transfer with
    /// [`finish`](Self::finish) once the last segment has been handled, or
    /// undoes the call with [`rewind`](Self::rewind) if handling it failed.
    ///
    /// # Errors
    ///
    /// - [`SequenceError::Duplicate`] for a segment already handled, including
    ///   any segment of a finished transfer
    /// - [`SequenceError::OutOfSequence`] for a segment past the expected one;
    ///   a new transfer must start at 0
    /// - [`SequenceError::DirectionMismatch`] or
    ///   [`SequenceError::TransferMismatch`] if the request-id is reused
    /// - [`SequenceError::SegmentCountMismatch`] if the declared count differs
    ///   from segment 0's
    pub fn advance(
        &self,
        request_id: &RequestId,
        direction: Direction,
        key: &str,
        version_number: u32,
        segment_number: u32,
        segment_count: Option<u32>,
    ) -> Result<Option<u64>, SequenceError> {
        let mut state = self.state.lock();
        if state.completed.contains(request_id) {
            return Err(SequenceError::Duplicate { segment_number });
        }

        let now = state.tick();
        let state = &mut *state;
        if let Some(transfer) = state.active.get_mut(request_id) {
            if transfer.direction != direction {
                return Err(SequenceError::DirectionMismatch);
            }
            if transfer.key != key || transfer.version_number != version_number {
                return Err(SequenceError::TransferMismatch {
                    key: transfer.key.clone(),
                    version_number: transfer.version_number,
                });
            }
            if let (Some(expected), Some(actual)) = (transfer.segment_count, segment_count) {
                if expected != actual {
                    return Err(SequenceError::SegmentCountMismatch { expected, actual });
                }
            }
            if segment_number < transfer.next_segment {
                return Err(SequenceError::Duplicate { segment_number });
            }
            if segment_number > transfer.next_segment {
                return Err(SequenceError::OutOfSequence {
                    expected: transfer.next_segment,
                    actual: segment_number,
                });
            }
            transfer.next_segment += 1;
            state.idle_order.remove(&transfer.last_touched);
            state.idle_order.insert(now, *request_id);
            transfer.last_touched = now;
            return Ok(transfer.pinned_version);
        }

        if segment_number != 0 {
            return Err(SequenceError::OutOfSequence {
                expected: 0,
                actual: segment_number,
            });
        }
        if state.active.len() >= self.max_active {
            state.evict_idlest();
        }
        state.active.insert(
            *request_id,
            Transfer {
                direction,
                key: key.to_string(),
                version_number,
                segment_count,
                pinned_version: None,
                next_segment: 1,
                last_touched: now,
            },
        );
        state.idle_order.insert(now, *request_id);
        Ok(None)
    }

    /// Holds `version_number` for the rest of a transfer, so later segments
    /// read the same version even if a newer one is archived meanwhile.
    pub fn pin_version(&self, request_id: &RequestId, version_number: u64) {
        if let Some(transfer) = self.state.lock().active.get_mut(request_id) {
            if transfer.pinned_version.is_none() {
                transfer.pinned_version = Some(version_number);
            }
        }
    }

    /// Marks a transfer finished.
    pub fn finish(&self, request_id: &RequestId) {
        let mut state = self.state.lock();
        Self::complete(&mut state, self.capacity, request_id);
    }

    /// Undoes the accepted call for `segment_number` after handling it failed,
    /// so the same request-id can send that segment again.
    ///
    /// Rewinding segment 0 forgets the transfer. Does nothing unless
    /// `segment_number` is the segment most recently accepted.
    pub fn rewind(&self, request_id: &RequestId, segment_number: u32) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(transfer) = state.active.get_mut(request_id) else {
            return;
        };
        if transfer.next_segment != segment_number.saturating_add(1) {
            return;
        }
        if segment_number == 0 {
            state.remove_active(request_id);
        } else {
            transfer.next_segment = segment_number;
        }
    }

    /// Number of transfers in progress.
    pub fn active_len(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Returns true if `request_id` finished and is still remembered.
    pub fn is_completed(&self, request_id: &RequestId) -> bool {
        self.state.lock().completed.contains(request_id)
    }

    fn complete(state: &mut TrackerState, capacity: usize, request_id: &RequestId) {
        state.remove_active(request_id);
        if capacity == 0 || !state.completed.insert(*request_id) {
            return;
        }
        state.completed_order.push_back(*request_id);
        while state.completed_order.len() > capacity {
            if let Some(evicted) = state.completed_order.pop_front() {
                state.completed.remove(&evicted);
            }
        }
    }
}
