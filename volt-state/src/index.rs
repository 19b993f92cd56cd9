//! The sled-backed metadata index, mirrored into memory at startup.

use std::collections::{BTreeMap, HashMap};
use std::convert::TryInto;

use tracing::debug;

use volt_chain::block::{self, Height};
use volt_chain::transaction;
use volt_chain::{WireDeserializeInto, WireSerialize};

use crate::meta::{BlockMetadata, BlockStatus, TransactionMetadata};
use crate::StateError;

/// The single key under which the chain head hash is stored.
const CHAIN_HEAD_KEY: &[u8] = b"head";

/// Block and transaction metadata, keyed by hash, plus the main-chain
/// height-to-hash mapping and the chain head pointer.
///
/// Cold start reads every entry into in-memory maps for O(1) lookup; writes
/// go through both the in-memory map and the persistent tree.
pub struct BlockIndex {
    block_tree: sled::Tree,
    tx_tree: sled::Tree,
    head_tree: sled::Tree,
    height_tree: sled::Tree,

    blocks: HashMap<block::Hash, BlockMetadata>,
    transactions: HashMap<transaction::Hash, TransactionMetadata>,
    main_chain: BTreeMap<u32, block::Hash>,
    chain_head: Option<block::Hash>,
}

impl BlockIndex {
    /// Open the index trees inside `db` and load them into memory.
    pub fn open(db: &sled::Db) -> Result<BlockIndex, StateError> {
        let block_tree = db.open_tree(b"block_meta")?;
        let tx_tree = db.open_tree(b"tx_meta")?;
        let head_tree = db.open_tree(b"chain_head")?;
        let height_tree = db.open_tree(b"hash_by_height")?;

        let mut blocks = HashMap::new();
        for item in block_tree.iter() {
            let (key, value) = item?;
            let hash = hash_from_key(&key)?;
            let meta: BlockMetadata = value.as_ref().wire_deserialize_into()?;
            blocks.insert(block::Hash(hash), meta);
        }

        let mut transactions = HashMap::new();
        for item in tx_tree.iter() {
            let (key, value) = item?;
            let hash = hash_from_key(&key)?;
            let meta: TransactionMetadata = value.as_ref().wire_deserialize_into()?;
            transactions.insert(transaction::Hash(hash), meta);
        }

        let mut main_chain = BTreeMap::new();
        for item in height_tree.iter() {
            let (key, value) = item?;
            let height = u32::from_le_bytes(
                key.as_ref()
                    .try_into()
                    .map_err(|_| StateError::Corruption("height index key malformed"))?,
            );
            main_chain.insert(height, block::Hash(hash_from_key(&value)?));
        }

        let chain_head = head_tree
            .get(CHAIN_HEAD_KEY)?
            .map(|value| hash_from_key(&value).map(block::Hash))
            .transpose()?;

        debug!(
            blocks = blocks.len(),
            transactions = transactions.len(),
            "loaded block index"
        );
        Ok(BlockIndex {
            block_tree,
            tx_tree,
            head_tree,
            height_tree,
            blocks,
            transactions,
            main_chain,
            chain_head,
        })
    }

    /// Record (or overwrite) a block's metadata.
    pub fn insert_block(
        &mut self,
        hash: block::Hash,
        meta: BlockMetadata,
    ) -> Result<(), StateError> {
        self.block_tree
            .insert(hash.0, meta.wire_serialize_to_vec()?)?;
        self.blocks.insert(hash, meta);
        Ok(())
    }

    /// Look up a block's metadata.
    pub fn block(&self, hash: &block::Hash) -> Option<&BlockMetadata> {
        self.blocks.get(hash)
    }

    /// Whether the index knows this block.
    pub fn contains_block(&self, hash: &block::Hash) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Rewrite a block's status in place.
    pub fn set_block_status(
        &mut self,
        hash: &block::Hash,
        status: BlockStatus,
    ) -> Result<(), StateError> {
        let meta = match self.blocks.get_mut(hash) {
            Some(meta) => meta,
            None => return Err(StateError::NotFound),
        };
        meta.status = status;
        let serialized = meta.wire_serialize_to_vec()?;
        self.block_tree.insert(hash.0, serialized)?;
        Ok(())
    }

    /// Record (or overwrite) a transaction's metadata.
    pub fn insert_transaction(
        &mut self,
        hash: transaction::Hash,
        meta: TransactionMetadata,
    ) -> Result<(), StateError> {
        self.tx_tree.insert(hash.0, meta.wire_serialize_to_vec()?)?;
        self.transactions.insert(hash, meta);
        Ok(())
    }

    /// Look up a transaction's metadata.
    pub fn transaction(&self, hash: &transaction::Hash) -> Option<&TransactionMetadata> {
        self.transactions.get(hash)
    }

    /// The current chain head's metadata, if a head has been set.
    pub fn chain_head(&self) -> Option<&BlockMetadata> {
        self.chain_head.as_ref().and_then(|hash| self.blocks.get(hash))
    }

    /// The current chain head hash.
    pub fn chain_head_hash(&self) -> Option<block::Hash> {
        self.chain_head
    }

    /// Move the chain head pointer.
    pub fn set_chain_head(&mut self, hash: block::Hash) -> Result<(), StateError> {
        self.head_tree.insert(CHAIN_HEAD_KEY, &hash.0[..])?;
        self.chain_head = Some(hash);
        Ok(())
    }

    /// Record that `hash` is the main-chain block at `height`.
    pub fn set_main_chain(&mut self, height: Height, hash: block::Hash) -> Result<(), StateError> {
        self.height_tree
            .insert(height.0.to_le_bytes(), &hash.0[..])?;
        self.main_chain.insert(height.0, hash);
        Ok(())
    }

    /// Forget the main-chain entry at `height` (the block was reverted).
    pub fn clear_main_chain(&mut self, height: Height) -> Result<(), StateError> {
        self.height_tree.remove(height.0.to_le_bytes())?;
        self.main_chain.remove(&height.0);
        Ok(())
    }

    /// The main-chain block hash at `height`.
    pub fn hash_at_height(&self, height: Height) -> Option<block::Hash> {
        self.main_chain.get(&height.0).copied()
    }

    /// Flush every tree to disk.
    pub fn flush(&self) -> Result<(), StateError> {
        self.block_tree.flush()?;
        self.tx_tree.flush()?;
        self.head_tree.flush()?;
        self.height_tree.flush()?;
        Ok(())
    }
}

fn hash_from_key(key: &[u8]) -> Result<[u8; 32], StateError> {
    key.try_into()
        .map_err(|_| StateError::Corruption("index key is not a 32-byte hash"))
}
