//! Indexed metadata for blocks and transactions.

use std::io::{Read, Write};

use volt_chain::block::{self, Header, Height};
use volt_chain::{SerializationError, WireDeserialize, WireSerialize};
use volt_serde_derive::{WireDeserialize, WireSerialize};

use crate::segment::StoragePointer;

/// Where a stored block sits relative to the best chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlockStatus {
    /// Part of the chain the head points to.
    MainChain,
    /// Persisted, valid so far, but on a branch with less work.
    SideChain,
    /// Failed contextual validation; never to be applied again.
    Invalid,
}

impl WireSerialize for BlockStatus {
    fn wire_serialize<W: Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        let tag: u8 = match self {
            BlockStatus::MainChain => 0,
            BlockStatus::SideChain => 1,
            BlockStatus::Invalid => 2,
        };
        target.write_all(&[tag])
    }
}

impl WireDeserialize for BlockStatus {
    fn wire_deserialize<R: Read>(reader: R) -> Result<Self, SerializationError> {
        match u8::wire_deserialize(reader)? {
            0 => Ok(BlockStatus::MainChain),
            1 => Ok(BlockStatus::SideChain),
            2 => Ok(BlockStatus::Invalid),
            _ => Err(SerializationError::Parse("unknown block status")),
        }
    }
}

/// Everything the node records about a block besides its payload: chain
/// position, accumulated work, and where the payload and revert data live.
#[derive(Clone, Debug, PartialEq, WireSerialize, WireDeserialize)]
pub struct BlockMetadata {
    /// The block's header.
    pub header: Header,
    /// The block's height.
    pub height: Height,
    /// The total work of this block and all its ancestors.
    pub cumulative_work: u128,
    /// How many transactions the block holds.
    pub transaction_count: u32,
    /// Main chain, side chain, or invalid.
    pub status: BlockStatus,
    /// Where the serialized block lives in the block segment store.
    pub block_ptr: StoragePointer,
    /// Where the block's revert data lives in the revert segment store.
    pub revert_ptr: StoragePointer,
}

impl BlockMetadata {
    /// The hash of the block this metadata describes.
    pub fn hash(&self) -> block::Hash {
        self.header.hash()
    }
}

/// Where a confirmed transaction lives: which block, and where in it.
#[derive(Clone, Debug, PartialEq, WireSerialize, WireDeserialize)]
pub struct TransactionMetadata {
    /// Where the containing block lives in the block segment store.
    pub block_ptr: StoragePointer,
    /// The transaction's position within its block.
    pub position: u32,
    /// The containing block's height.
    pub height: Height,
    /// The containing block's hash.
    pub block_hash: block::Hash,
    /// The containing block's timestamp.
    pub timestamp: i64,
}
