use std::io::{Cursor, Read};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::serialization::{sha256d, SerializationError, WireDeserialize, WireSerialize};
use volt_serde_derive::WireSerialize;

use crate::{cached::Cached, work::difficulty::CompactDifficulty};

use super::{merkle, Hash, Height};

/// A block header, containing metadata about a block.
///
/// How are blocks chained together? They are chained together via the
/// backwards reference (previous header hash) present in the block
/// header. Each block points backwards to its parent, all the way
/// back to the genesis block (the first block in the blockchain).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, WireSerialize)]
pub struct Header {
    /// The block's version field.
    pub version: u32,

    /// The hash of the previous block, used to create a chain of blocks back to
    /// the genesis block.
    ///
    /// This ensures no previous block can be changed without also changing this
    /// block’s header.
    pub previous_block_hash: Hash,

    /// The root of the transaction Merkle tree, binding the block header to
    /// the transactions in the block.
    pub merkle_root: merkle::Root,

    /// The block timestamp is a Unix epoch time (UTC) when the miner
    /// started hashing the header (according to the miner).
    pub time: DateTime<Utc>,

    /// An encoded version of the target threshold this block’s header
    /// hash must be less than or equal to, in compact-target format.
    ///
    /// For a block at height `height`, the field must equal the difficulty
    /// the retarget rule expects at that height.
    pub difficulty_threshold: CompactDifficulty,

    /// An arbitrary field that miners can change to modify the header
    /// hash in order to produce a hash less than or equal to the
    /// target threshold.
    pub nonce: u32,

    /// For efficiency, we cache the hash of this block after computing it the first time
    /// This field is not part of the consensus serialization
    hash: Cached<Hash>,
}

/// The error returned when a block header's timestamp is too far in the future.
#[derive(Error, Debug)]
pub enum BlockTimeError {
    /// Timestamp past the two-hour tolerance window.
    #[error("invalid time {0:?} in block header {1:?} {2:?}: block time is more than 2 hours in the future ({3:?}). Hint: check your machine's date, time, and time zone.")]
    InvalidBlockTime(DateTime<Utc>, Height, Hash, DateTime<Utc>),
}

impl Header {
    /// Returns length of a serialized header in bytes
    pub const fn len() -> usize {
        80
    }

    /// Assemble a header. The hash cache starts empty.
    pub fn new(
        version: u32,
        previous_block_hash: Hash,
        merkle_root: merkle::Root,
        time: DateTime<Utc>,
        difficulty_threshold: CompactDifficulty,
        nonce: u32,
    ) -> Header {
        Header {
            version,
            previous_block_hash,
            merkle_root,
            time,
            difficulty_threshold,
            nonce,
            hash: Cached::new(),
        }
    }

    /// Compute the hash of this header, using the cache populated during
    /// deserialization when available.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.get() {
            return hash;
        }
        Hash::from(self)
    }

    /// The cached hash, if this header was deserialized.
    pub(super) fn cached_hash(&self) -> Option<Hash> {
        self.hash.get()
    }

    /// Returns `Ok(())` if the header time is no more than 2 hours after
    /// `now`. The boundary itself is accepted.
    pub fn time_is_valid_at(
        &self,
        now: DateTime<Utc>,
        height: &Height,
        hash: &Hash,
    ) -> Result<(), BlockTimeError> {
        let two_hours_in_the_future = now
            .checked_add_signed(Duration::hours(2))
            .expect("calculating 2 hours in the future does not overflow");
        if self.time <= two_hours_in_the_future {
            Ok(())
        } else {
            Err(BlockTimeError::InvalidBlockTime(
                self.time,
                *height,
                *hash,
                two_hours_in_the_future,
            ))
        }
    }
}

impl WireDeserialize for Header {
    /// Deserializes a header, hashing the raw bytes once so the hash never
    /// needs to be recomputed from a reserialization.
    fn wire_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut bytes = [0u8; 80];
        reader.read_exact(&mut bytes)?;
        let own_hash = Hash(sha256d::digest(&bytes));

        let mut src = Cursor::new(&bytes);
        let header = Header {
            version: u32::wire_deserialize(&mut src)?,
            previous_block_hash: Hash::wire_deserialize(&mut src)?,
            merkle_root: merkle::Root::wire_deserialize(&mut src)?,
            time: <DateTime<Utc>>::wire_deserialize(&mut src)?,
            difficulty_threshold: CompactDifficulty::wire_deserialize(&mut src)?,
            nonce: u32::wire_deserialize(&mut src)?,
            hash: Cached::filled(own_hash),
        };
        Ok(header)
    }
}

/// A header with a count of the number of transactions in its block.
///
/// This structure is used in the network protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountedHeader {
    /// The header itself.
    pub header: Header,
    /// The number of transactions in the block the header belongs to.
    pub transaction_count: u32,
}

impl WireSerialize for CountedHeader {
    fn wire_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.header.wire_serialize(&mut target)?;
        self.transaction_count.wire_serialize(&mut target)
    }
}

impl WireDeserialize for CountedHeader {
    fn wire_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(CountedHeader {
            header: Header::wire_deserialize(&mut reader)?,
            transaction_count: u32::wire_deserialize(&mut reader)?,
        })
    }
}
