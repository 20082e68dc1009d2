//! The record index: which segments a node holds, and where.
//!
//! Every insert appends one entry to a record log on a [`StorageBackend`].
//! The in-memory map only keeps slots pointing into the log; lookups read
//! the record back from the log.
//!
//! # Log entry layout
//!
//! ```text
//! | body length: u32 | key: u32-prefixed UTF-8 | content record | offset: u64 | length: u64 |
//! ```
//!
//! All integers are big-endian. An entry cut short at the end of the log is a
//! torn write and is truncated on open; anything else that fails to decode is
//! corruption.

use crate::error::{ServerError, ServerResult};
use nodestore_record::marshalling::{get_string, put_string, Cursor, LENGTH_PREFIX_SIZE};
use nodestore_record::{decode, encode_into, ContentRecord, RecordError};
use nodestore_storage::{SharedBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::HashMap;

const ENTRY_PREFIX_SIZE: usize = LENGTH_PREFIX_SIZE;

/// Where a segment's bytes live on the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentLocation {
    /// Byte offset on the volume.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
}

/// One record log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Key the record belongs to.
    pub key: String,
    /// The content record.
    pub record: ContentRecord,
    /// Where the segment's bytes are. Zero for tombstones.
    pub location: SegmentLocation,
}

impl IndexEntry {
    fn encode_body(&self) -> ServerResult<Vec<u8>> {
        let mut body = Vec::with_capacity(64 + self.key.len() + self.record.file_name().len());
        put_string(&mut body, "key", &self.key)?;
        encode_into(&self.record, &mut body)?;
        body.extend_from_slice(&self.location.offset.to_be_bytes());
        body.extend_from_slice(&self.location.length.to_be_bytes());
        Ok(body)
    }

    fn decode_body(body: &[u8]) -> ServerResult<Self> {
        let (key, next) = get_string(body, 0)?;
        let (record, next) = decode(body, next)?;
        let mut cursor = Cursor::at(body, next);
        let location = SegmentLocation {
            offset: cursor.read_u64()?,
            length: cursor.read_u64()?,
        };
        if cursor.remaining() != 0 {
            return Err(RecordError::malformed(format!(
                "{} trailing bytes after log entry",
                cursor.remaining()
            ))
            .into());
        }
        Ok(Self {
            key,
            record,
            location,
        })
    }
}

/// The result of scanning a record log from the start.
#[derive(Debug, Clone, Default)]
pub struct LogReplay {
    /// Every complete entry in log order, paired with its log offset.
    pub entries: Vec<(u64, IndexEntry)>,
    /// Length of the log up to the end of the last complete entry.
    pub valid_len: u64,
    /// Bytes past `valid_len` belonging to a torn entry.
    pub torn_bytes: u64,
}

/// Scans a record log without modifying it.
///
/// # Errors
///
/// Returns [`ServerError::CorruptLog`] for a complete entry that does not
/// decode, and [`ServerError::Storage`] if the log cannot be read.
pub fn replay_log(log: &dyn StorageBackend) -> ServerResult<LogReplay> {
    let size = log.size()?;
    let data = log.read_at(0, size as usize)?;

    let mut replay = LogReplay::default();
    let mut pos = 0usize;
    while pos < data.len() {
        let available = data.len() - pos;
        if available < ENTRY_PREFIX_SIZE {
            break;
        }
        let mut prefix = Cursor::at(&data, pos);
        let body_len = prefix.read_u32()? as usize;
        if available - ENTRY_PREFIX_SIZE < body_len {
            break;
        }
        let body_start = pos + ENTRY_PREFIX_SIZE;
        let body = &data[body_start..body_start + body_len];
        let entry = IndexEntry::decode_body(body).map_err(|err| ServerError::CorruptLog {
            offset: pos as u64,
            message: err.to_string(),
        })?;
        replay.entries.push((pos as u64, entry));
        pos = body_start + body_len;
    }

    replay.valid_len = pos as u64;
    replay.torn_bytes = size - replay.valid_len;
    Ok(replay)
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    is_tombstone: bool,
    timestamp: u64,
    version_number: u64,
    segment_number: u32,
    segment_count: u64,
    log_offset: u64,
    log_len: usize,
}

impl Slot {
    fn for_entry(entry: &IndexEntry, log_offset: u64, log_len: usize) -> Self {
        Self {
            is_tombstone: entry.record.is_tombstone(),
            timestamp: entry.record.timestamp(),
            version_number: entry.record.version_number(),
            segment_number: entry.record.segment_number(),
            segment_count: entry.record.segment_count(),
            log_offset,
            log_len,
        }
    }
}

/// Slots for one key, in log order.
#[derive(Debug, Default)]
struct KeySlots {
    slots: Vec<Slot>,
}

impl KeySlots {
    /// Newest tombstone timestamp, if the key was ever destroyed.
    fn deleted_at(&self) -> Option<u64> {
        self.slots
            .iter()
            .filter(|slot| slot.is_tombstone)
            .map(|slot| slot.timestamp)
            .max()
    }

    fn visible(&self) -> impl Iterator<Item = &Slot> {
        let deleted_at = self.deleted_at();
        self.slots.iter().filter(move |slot| {
            !slot.is_tombstone && !deleted_at.is_some_and(|at| slot.timestamp <= at)
        })
    }

    fn contains_live(&self, version_number: u64, segment_number: u32) -> bool {
        self.slots.iter().any(|slot| {
            !slot.is_tombstone
                && slot.version_number == version_number
                && slot.segment_number == segment_number
        })
    }

    /// Segment count declared by the existing records of a version.
    fn segment_count_of(&self, version_number: u64) -> Option<u64> {
        self.slots
            .iter()
            .find(|slot| !slot.is_tombstone && slot.version_number == version_number)
            .map(|slot| slot.segment_count)
    }
}

/// Index of content records for one volume, persisted in a record log.
pub struct RecordIndex {
    log: SharedBackend,
    sync_on_insert: bool,
    keys: RwLock<HashMap<String, KeySlots>>,
}

impl RecordIndex {
    /// Opens the index, replaying the record log.
    ///
    /// A torn entry at the end of the log is truncated away.
    ///
    /// # Errors
    ///
    /// Fails if the log cannot be read or holds a corrupt entry.
    pub fn open(log: SharedBackend, sync_on_insert: bool) -> ServerResult<Self> {
        let replay = replay_log(log.as_ref())?;
        if replay.torn_bytes > 0 {
            tracing::warn!(
                valid_len = replay.valid_len,
                torn_bytes = replay.torn_bytes,
                "truncating torn record log entry"
            );
            log.truncate(replay.valid_len)?;
        }

        let mut keys: HashMap<String, KeySlots> = HashMap::new();
        for (i, (offset, entry)) in replay.entries.iter().enumerate() {
            let end = replay
                .entries
                .get(i + 1)
                .map_or(replay.valid_len, |(next, _)| *next);
            let slot = Slot::for_entry(entry, *offset, (end - offset) as usize);
            keys.entry(entry.key.clone()).or_default().slots.push(slot);
        }

        tracing::debug!(
            entries = replay.entries.len(),
            keys = keys.len(),
            "record index opened"
        );
        Ok(Self {
            log,
            sync_on_insert,
            keys: RwLock::new(keys),
        })
    }

    /// Records that `key` holds `record`, with its bytes at `location`.
    ///
    /// # Errors
    ///
    /// - [`ServerError::DuplicateRecord`] if a live record already exists for
    ///   this key, version and segment
    /// - [`ServerError::SegmentCountMismatch`] if the version's other records
    ///   declare a different segment count
    /// - [`ServerError::Storage`] if the log append fails
    pub fn insert(
        &self,
        key: &str,
        record: ContentRecord,
        location: SegmentLocation,
    ) -> ServerResult<()> {
        let mut keys = self.keys.write();
        if let Some(slots) = keys.get(key).filter(|_| !record.is_tombstone()) {
            let version_number = record.version_number();
            if slots.contains_live(version_number, record.segment_number()) {
                return Err(ServerError::DuplicateRecord {
                    key: key.to_string(),
                    version_number,
                    segment_number: record.segment_number(),
                });
            }
            if let Some(expected) = slots.segment_count_of(version_number) {
                if expected != record.segment_count() {
                    return Err(ServerError::SegmentCountMismatch {
                        key: key.to_string(),
                        version_number,
                        expected,
                        actual: record.segment_count(),
                    });
                }
            }
        }

        let entry = IndexEntry {
            key: key.to_string(),
            record,
            location,
        };
        let body = entry.encode_body()?;
        let mut framed = Vec::with_capacity(ENTRY_PREFIX_SIZE + body.len());
        framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
        framed.extend_from_slice(&body);

        let log_offset = self.log.append(&framed)?;
        if self.sync_on_insert {
            self.log.sync()?;
        }
        keys.entry(entry.key.clone())
            .or_default()
            .slots
            .push(Slot::for_entry(&entry, log_offset, framed.len()));
        Ok(())
    }

    /// Marks `key` destroyed at `timestamp`.
    ///
    /// Records with a timestamp at or before the tombstone stop being visible.
    /// Returns the tombstone written.
    ///
    /// # Errors
    ///
    /// Fails if the log append fails.
    pub fn insert_tombstone(&self, key: &str, timestamp: u64) -> ServerResult<ContentRecord> {
        let version_number = self
            .keys
            .read()
            .get(key)
            .and_then(|slots| slots.slots.iter().map(|slot| slot.version_number).max())
            .unwrap_or(0);
        let tombstone = ContentRecord::make_tombstone(timestamp, version_number, 0);
        self.insert(key, tombstone.clone(), SegmentLocation::default())?;
        Ok(tombstone)
    }

    /// Looks up the visible record for one segment.
    ///
    /// Returns `Ok(None)` if there is none, or if it is hidden by a tombstone.
    ///
    /// # Errors
    ///
    /// Fails if the log entry cannot be read back.
    pub fn lookup(
        &self,
        key: &str,
        version_number: u64,
        segment_number: u32,
    ) -> ServerResult<Option<IndexEntry>> {
        let slot = {
            let keys = self.keys.read();
            let Some(slots) = keys.get(key) else {
                return Ok(None);
            };
            let found = slots.visible().find(|slot| {
                slot.version_number == version_number && slot.segment_number == segment_number
            });
            match found {
                Some(slot) => *slot,
                None => return Ok(None),
            }
        };
        self.read_slot(key, &slot).map(Some)
    }

    /// Returns true if a live record exists for this segment, visible or not.
    pub fn contains(&self, key: &str, version_number: u64, segment_number: u32) -> bool {
        self.keys
            .read()
            .get(key)
            .is_some_and(|slots| slots.contains_live(version_number, segment_number))
    }

    /// Highest visible version of `key`.
    pub fn latest_version(&self, key: &str) -> Option<u64> {
        self.keys
            .read()
            .get(key)
            .and_then(|slots| slots.visible().map(|slot| slot.version_number).max())
    }

    /// Keys with at least one visible record, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .keys
            .read()
            .iter()
            .filter(|(_, slots)| slots.visible().next().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of log entries, tombstones included.
    pub fn len(&self) -> usize {
        self.keys.read().values().map(|slots| slots.slots.len()).sum()
    }

    /// Returns true if the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_slot(&self, key: &str, slot: &Slot) -> ServerResult<IndexEntry> {
        let framed = self.log.read_at(slot.log_offset, slot.log_len)?;
        let corrupt = |message: String| ServerError::CorruptLog {
            offset: slot.log_offset,
            message,
        };
        let body = framed
            .get(ENTRY_PREFIX_SIZE..)
            .ok_or_else(|| corrupt("entry shorter than its prefix".into()))?;
        let entry = IndexEntry::decode_body(body).map_err(|err| corrupt(err.to_string()))?;
        if entry.key != key {
            return Err(corrupt(format!(
                "entry belongs to {}, expected {key}",
                entry.key
            )));
        }
        Ok(entry)
    }
}

impl std::fmt::Debug for RecordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordIndex")
            .field("entries", &self.len())
            .field("sync_on_insert", &self.sync_on_insert)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodestore_record::{ContentFields, EMPTY_MD5};
    use nodestore_storage::{FileBackend, InMemoryBackend};
    use std::sync::Arc;

    fn live(timestamp: u64, version_number: u64, segment_number: u32) -> ContentRecord {
        ContentRecord::from_fields(ContentFields {
            timestamp,
            version_number,
            segment_number,
            segment_count: 2,
            segment_size: 10,
            total_size: 20,
            adler32: 7,
            md5: EMPTY_MD5,
            file_name: "cat.jpg".into(),
        })
    }

    fn at(offset: u64) -> SegmentLocation {
        SegmentLocation { offset, length: 10 }
    }

    fn memory_index() -> (RecordIndex, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let index = RecordIndex::open(backend.clone(), false).unwrap();
        (index, backend)
    }

    #[test]
    fn insert_and_lookup() {
        let (index, _) = memory_index();
        index.insert("k", live(100, 1, 0), at(0)).unwrap();
        index.insert("k", live(100, 1, 1), at(10)).unwrap();

        let entry = index.lookup("k", 1, 1).unwrap().unwrap();
        assert_eq!(entry.location, at(10));
        assert_eq!(entry.record, live(100, 1, 1));
        assert!(index.lookup("k", 1, 2).unwrap().is_none());
        assert!(index.lookup("missing", 1, 0).unwrap().is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn duplicate_segment_is_rejected() {
        let (index, _) = memory_index();
        index.insert("k", live(100, 1, 0), at(0)).unwrap();
        let err = index.insert("k", live(200, 1, 0), at(10)).unwrap_err();
        assert!(matches!(err, ServerError::DuplicateRecord { .. }));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn segment_count_must_match_within_a_version() {
        let (index, _) = memory_index();
        index.insert("k", live(100, 1, 0), at(0)).unwrap();

        let mut fields = ContentFields {
            timestamp: 100,
            version_number: 1,
            segment_number: 1,
            segment_count: 3,
            segment_size: 10,
            total_size: 30,
            adler32: 7,
            md5: EMPTY_MD5,
            file_name: "cat.jpg".into(),
        };
        let err = index
            .insert("k", ContentRecord::from_fields(fields.clone()), at(10))
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::SegmentCountMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
        assert!(err.is_client_error());
        assert_eq!(index.len(), 1);

        // Another version may declare its own count.
        fields.version_number = 2;
        fields.segment_number = 0;
        index
            .insert("k", ContentRecord::from_fields(fields), at(20))
            .unwrap();
    }

    #[test]
    fn tombstone_hides_older_records() {
        let (index, _) = memory_index();
        index.insert("k", live(100, 1, 0), at(0)).unwrap();
        index.insert("k", live(150, 2, 0), at(10)).unwrap();
        assert_eq!(index.latest_version("k"), Some(2));

        let tombstone = index.insert_tombstone("k", 150).unwrap();
        assert!(tombstone.is_tombstone());
        assert_eq!(tombstone.version_number(), 2);
        assert!(index.lookup("k", 1, 0).unwrap().is_none());
        assert!(index.lookup("k", 2, 0).unwrap().is_none());
        assert_eq!(index.latest_version("k"), None);
        assert!(index.keys().is_empty());

        index.insert("k", live(300, 3, 0), at(20)).unwrap();
        assert_eq!(index.latest_version("k"), Some(3));
        assert_eq!(index.keys(), vec!["k".to_string()]);
    }

    #[test]
    fn reopen_replays_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");
        {
            let backend = Arc::new(FileBackend::open(&path).unwrap());
            let index = RecordIndex::open(backend, true).unwrap();
            index.insert("a", live(1, 1, 0), at(0)).unwrap();
            index.insert("b", live(2, 1, 0), at(10)).unwrap();
            index.insert_tombstone("a", 5).unwrap();
        }

        let backend = Arc::new(FileBackend::open(&path).unwrap());
        let index = RecordIndex::open(backend, false).unwrap();
        assert_eq!(index.len(), 3);
        assert!(index.lookup("a", 1, 0).unwrap().is_none());
        assert_eq!(index.lookup("b", 1, 0).unwrap().unwrap().location, at(10));
    }

    #[test]
    fn torn_tail_is_truncated() {
        let (index, backend) = memory_index();
        index.insert("k", live(1, 1, 0), at(0)).unwrap();
        let good_len = backend.size().unwrap();

        backend.append(&[0, 0, 0, 40, 1, 2, 3]).unwrap();
        let reopened = RecordIndex::open(backend.clone(), false).unwrap();
        assert_eq!(backend.size().unwrap(), good_len);
        assert_eq!(reopened.len(), 1);
        assert!(reopened.lookup("k", 1, 0).unwrap().is_some());
    }

    #[test]
    fn corrupt_entry_is_an_error() {
        let backend = Arc::new(InMemoryBackend::with_data(vec![0, 0, 0, 3, 9, 9, 9]));
        let err = RecordIndex::open(backend, false).unwrap_err();
        assert!(matches!(err, ServerError::CorruptLog { offset: 0, .. }));
        assert!(err.is_database_error());
    }

    #[test]
    fn replay_reports_entries_in_log_order() {
        let (index, backend) = memory_index();
        index.insert("z", live(1, 1, 0), at(0)).unwrap();
        index.insert("a", live(2, 1, 0), at(10)).unwrap();

        let replay = replay_log(backend.as_ref()).unwrap();
        let keys: Vec<_> = replay.entries.iter().map(|(_, e)| e.key.as_str()).collect();
        assert_eq!(keys, ["z", "a"]);
        assert_eq!(replay.entries[0].0, 0);
        assert_eq!(replay.torn_bytes, 0);
    }
}
