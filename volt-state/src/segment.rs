//! Append-only segmented storage for blocks and revert data.
//!
//! Payloads are packed into numbered segment files. Each record is framed as
//! `magic u32 | length u32 | payload`, and a record, once written, is
//! addressed forever by its `StoragePointer`. The index of the active segment
//! is persisted in a small KV entry so crash recovery deterministically
//! resumes on the right file.

use std::convert::TryInto;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use volt_chain::{SerializationError, WireDeserialize, WireSerialize};
use volt_serde_derive::{WireDeserialize, WireSerialize};

use crate::StateError;

/// The maximum size of a segment file. A write that would end past this
/// limit rotates to the next segment first.
pub const MAX_SEGMENT_BYTES: u64 = 128 * 1024 * 1024;

/// The marker in front of every stored record.
const RECORD_MAGIC: u32 = 0x544c_4f56; // "VOLT" little-endian

/// Bytes of framing (magic + length) in front of every payload.
const RECORD_HEADER_BYTES: u64 = 8;

/// The durable address of a stored record: which segment, and where in it.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Hash, WireSerialize, WireDeserialize,
)]
pub struct StoragePointer {
    /// The index of the segment file holding the record.
    pub segment: u32,
    /// The byte offset of the record's framing inside that segment.
    pub offset: u64,
}

/// One append-only store: a directory of numbered segment files plus the
/// sled tree remembering which segment is active.
pub struct SegmentStore {
    dir: PathBuf,
    prefix: &'static str,
    registry: sled::Tree,
    max_segment_bytes: u64,
    active_index: u32,
    active: File,
    active_len: u64,
}

impl SegmentStore {
    /// Open (or create) the store rooted at `dir`, resuming on the segment
    /// recorded in `registry`.
    pub fn open(
        dir: impl AsRef<Path>,
        prefix: &'static str,
        registry: sled::Tree,
    ) -> Result<SegmentStore, StateError> {
        Self::open_with_limit(dir, prefix, registry, MAX_SEGMENT_BYTES)
    }

    /// `open`, with a caller-chosen segment size limit.
    pub fn open_with_limit(
        dir: impl AsRef<Path>,
        prefix: &'static str,
        registry: sled::Tree,
        max_segment_bytes: u64,
    ) -> Result<SegmentStore, StateError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let active_index = match registry.get(prefix.as_bytes())? {
            Some(bytes) => u32::from_le_bytes(
                bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| StateError::Corruption("segment registry entry malformed"))?,
            ),
            None => 0,
        };

        let path = segment_path(&dir, prefix, active_index);
        let mut active = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let disk_len = active.metadata()?.len();

        // A crash may have left a partial record at the tail. Find the last
        // whole record and truncate anything after it, so the append offset
        // is always the start of a valid record.
        let active_len = recovered_length(&mut active, disk_len)?;
        if active_len < disk_len {
            warn!(
                segment = active_index,
                dropped = disk_len - active_len,
                "truncating partial record left by unclean shutdown"
            );
            active.set_len(active_len)?;
            active.seek(SeekFrom::End(0))?;
        }

        debug!(?path, active_len, "opened segment store");
        Ok(SegmentStore {
            dir,
            prefix,
            registry,
            max_segment_bytes,
            active_index,
            active,
            active_len,
        })
    }

    /// Append a record and return its durable address.
    pub fn store(&mut self, payload: &[u8]) -> Result<StoragePointer, StateError> {
        let record_len = RECORD_HEADER_BYTES + payload.len() as u64;
        if self.active_len > 0 && self.active_len + record_len > self.max_segment_bytes {
            self.rotate()?;
        }

        let pointer = StoragePointer {
            segment: self.active_index,
            offset: self.active_len,
        };

        self.active.write_all(&RECORD_MAGIC.to_le_bytes())?;
        self.active.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.active.write_all(payload)?;
        self.active.sync_data()?;
        self.active_len += record_len;

        Ok(pointer)
    }

    /// Read back the record at `pointer`. Pointers from any prior `store`
    /// call stay valid, including across segment rotation and restart.
    pub fn retrieve(&self, pointer: StoragePointer) -> Result<Vec<u8>, StateError> {
        let path = segment_path(&self.dir, self.prefix, pointer.segment);
        let mut file = File::open(&path).map_err(|_| StateError::NotFound)?;
        file.seek(SeekFrom::Start(pointer.offset))?;

        let mut framing = [0u8; 8];
        file.read_exact(&mut framing)?;
        let magic = u32::from_le_bytes(framing[0..4].try_into().expect("4-byte slice"));
        if magic != RECORD_MAGIC {
            return Err(StateError::Corruption("record magic mismatch"));
        }
        let len = u32::from_le_bytes(framing[4..8].try_into().expect("4-byte slice")) as u64;
        if len > self.max_segment_bytes {
            return Err(StateError::Corruption("record length exceeds segment size"));
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// The index of the segment currently being appended to.
    pub fn active_segment(&self) -> u32 {
        self.active_index
    }

    fn rotate(&mut self) -> Result<(), StateError> {
        let next_index = self.active_index + 1;
        let path = segment_path(&self.dir, self.prefix, next_index);
        let next = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        // Record the new active segment before switching, so recovery after
        // a crash mid-rotation resumes on the new (possibly empty) file.
        self.registry
            .insert(self.prefix.as_bytes(), &next_index.to_le_bytes()[..])?;
        self.registry.flush()?;

        debug!(segment = next_index, "rotated to new segment file");
        self.active = next;
        self.active_index = next_index;
        self.active_len = 0;
        Ok(())
    }
}

fn segment_path(dir: &Path, prefix: &str, index: u32) -> PathBuf {
    dir.join(format!("{}{:05}.bin", prefix, index))
}

/// Walk the records in a segment from the start and return the length of the
/// valid prefix.
fn recovered_length(file: &mut File, disk_len: u64) -> Result<u64, StateError> {
    file.seek(SeekFrom::Start(0))?;
    let mut valid = 0u64;
    let mut framing = [0u8; 8];
    loop {
        if valid + RECORD_HEADER_BYTES > disk_len {
            return Ok(valid);
        }
        file.read_exact(&mut framing)?;
        let magic = u32::from_le_bytes(framing[0..4].try_into().expect("4-byte slice"));
        if magic != RECORD_MAGIC {
            return Ok(valid);
        }
        let len = u32::from_le_bytes(framing[4..8].try_into().expect("4-byte slice")) as u64;
        if valid + RECORD_HEADER_BYTES + len > disk_len {
            return Ok(valid);
        }
        file.seek(SeekFrom::Current(len as i64))?;
        valid += RECORD_HEADER_BYTES + len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn test_store(limit: u64) -> (TempDir, SegmentStore) {
        let dir = TempDir::new("segments").unwrap();
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .unwrap();
        let registry = db.open_tree(b"segments").unwrap();
        let store =
            SegmentStore::open_with_limit(dir.path().join("blocks"), "block", registry, limit)
                .unwrap();
        (dir, store)
    }

    #[test]
    fn store_then_retrieve() {
        let (_dir, mut store) = test_store(MAX_SEGMENT_BYTES);
        let first = store.store(b"first payload").unwrap();
        let second = store.store(b"second").unwrap();

        assert_eq!(store.retrieve(first).unwrap(), b"first payload");
        assert_eq!(store.retrieve(second).unwrap(), b"second");
        assert_eq!(first.segment, second.segment);
        assert!(second.offset > first.offset);
    }

    #[test]
    fn write_past_limit_rotates_and_old_pointers_survive() {
        // Limit fits one 8-byte-framed 16-byte record but not two.
        let (_dir, mut store) = test_store(32);
        let first = store.store(&[7u8; 16]).unwrap();
        let second = store.store(&[9u8; 16]).unwrap();

        assert_eq!(first.segment, 0);
        assert_eq!(second.segment, 1);
        assert_eq!(second.offset, 0);

        // A reader using the pre-rotation pointer still succeeds.
        assert_eq!(store.retrieve(first).unwrap(), vec![7u8; 16]);
        assert_eq!(store.retrieve(second).unwrap(), vec![9u8; 16]);
    }

    #[test]
    fn reopen_resumes_active_segment_and_truncates_partial_tail() {
        let dir = TempDir::new("segments").unwrap();
        let db = sled::Config::new().temporary(true).open().unwrap();
        let registry = db.open_tree(b"segments").unwrap();

        let pointer = {
            let mut store = SegmentStore::open(dir.path().join("blocks"), "block", registry.clone())
                .unwrap();
            store.store(b"durable").unwrap()
        };

        // Simulate a crash that wrote half a record.
        let path = dir.path().join("blocks").join("block00000.bin");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&RECORD_MAGIC.to_le_bytes()).unwrap();
        file.write_all(&100u32.to_le_bytes()).unwrap();
        file.write_all(b"only part of the payload").unwrap();

        let mut store =
            SegmentStore::open(dir.path().join("blocks"), "block", registry).unwrap();
        assert_eq!(store.retrieve(pointer).unwrap(), b"durable");

        // The partial record was truncated, so the next write lands where it was.
        let next = store.store(b"after recovery").unwrap();
        assert_eq!(next.offset, pointer.offset + 8 + b"durable".len() as u64);
        assert_eq!(store.retrieve(next).unwrap(), b"after recovery");
    }

    #[test]
    fn garbage_magic_is_corruption() {
        let (_dir, mut store) = test_store(MAX_SEGMENT_BYTES);
        store.store(b"payload").unwrap();

        let bogus = StoragePointer {
            segment: 0,
            offset: 3,
        };
        match store.retrieve(bogus) {
            Err(StateError::Corruption(_)) => {}
            other => panic!("expected corruption error, got {:?}", other.map(|_| ())),
        }
    }
}
