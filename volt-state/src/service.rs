//! The persistence façade combining the segment stores, the metadata index,
//! and the UTXO set.

use std::sync::Arc;

use tracing::{debug, info};

use volt_chain::block::{self, Block, Height};
use volt_chain::parameters::Network;
use volt_chain::transaction::{self, Transaction};
use volt_chain::transfer::OutPoint;
use volt_chain::{WireDeserializeInto, WireSerialize};

use crate::config::Config;
use crate::index::BlockIndex;
use crate::meta::{BlockMetadata, BlockStatus, TransactionMetadata};
use crate::revert::RevertData;
use crate::segment::SegmentStore;
use crate::util::block_locator_heights;
use crate::utxo::{Utxo, UtxoSet};
use crate::StateError;

/// Single façade over everything the node persists.
///
/// All mutation goes through the chain engine's serializing discipline, so
/// the façade itself needs no internal locking. A storage failure in any
/// write is surfaced as [`StateError`] and treated as fatal by the caller.
pub struct PersistenceService {
    blocks: SegmentStore,
    reverts: SegmentStore,
    index: BlockIndex,
    utxos: UtxoSet,
}

impl PersistenceService {
    /// Open (or create) all stores under the configured data directory.
    ///
    /// On-disk layout, per network:
    /// `blocks/blockNNNNN.bin`, `reverts/revertNNNNN.bin`,
    /// `metadata/blockchain/` and `metadata/state/` sled databases.
    pub fn open(config: &Config, network: Network) -> Result<PersistenceService, StateError> {
        let root = config.network_dir(network);

        let chain_db = sled::Config::new()
            .path(root.join("metadata").join("blockchain"))
            .open()?;
        let state_db = sled::Config::new()
            .path(root.join("metadata").join("state"))
            .open()?;

        let segments = chain_db.open_tree(b"segments")?;
        let blocks = SegmentStore::open(root.join("blocks"), "block", segments.clone())?;
        let reverts = SegmentStore::open(root.join("reverts"), "revert", segments)?;

        let index = BlockIndex::open(&chain_db)?;
        let utxos = UtxoSet::open(state_db.open_tree(b"utxo_by_outpoint")?)?;

        info!(?root, "opened chain state");
        Ok(PersistenceService {
            blocks,
            reverts,
            index,
            utxos,
        })
    }

    /// Append a block and its revert data, then index its metadata and the
    /// metadata of each of its transactions.
    ///
    /// `spent` is the ordered list of outputs the block consumes, which the
    /// revert store keeps so the block can later be undone.
    pub fn persist_block(
        &mut self,
        block: &Block,
        height: Height,
        cumulative_work: u128,
        status: BlockStatus,
        spent: Vec<Utxo>,
    ) -> Result<BlockMetadata, StateError> {
        let hash = block.hash();

        let block_ptr = self.blocks.store(&block.wire_serialize_to_vec()?)?;
        let revert = RevertData { spent };
        let revert_ptr = self.reverts.store(&revert.wire_serialize_to_vec()?)?;

        let meta = BlockMetadata {
            header: block.header,
            height,
            cumulative_work,
            transaction_count: block.transactions.len() as u32,
            status,
            block_ptr,
            revert_ptr,
        };
        self.index.insert_block(hash, meta.clone())?;

        for (position, transaction) in block.transactions.iter().enumerate() {
            self.index.insert_transaction(
                transaction.hash(),
                TransactionMetadata {
                    block_ptr,
                    position: position as u32,
                    height,
                    block_hash: hash,
                    timestamp: block.header.time.timestamp(),
                },
            )?;
        }

        debug!(%hash, height = height.0, "persisted block");
        Ok(meta)
    }

    /// Load a block by hash.
    pub fn get_block(&self, hash: &block::Hash) -> Result<Option<Arc<Block>>, StateError> {
        let meta = match self.index.block(hash) {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let bytes = self.blocks.retrieve(meta.block_ptr)?;
        Ok(Some(bytes.as_slice().wire_deserialize_into()?))
    }

    /// Load the main-chain block at `height`.
    pub fn get_block_by_height(&self, height: Height) -> Result<Option<Arc<Block>>, StateError> {
        match self.index.hash_at_height(height) {
            Some(hash) => self.get_block(&hash),
            None => Ok(None),
        }
    }

    /// The main-chain block hash at `height`.
    pub fn hash_at_height(&self, height: Height) -> Option<block::Hash> {
        self.index.hash_at_height(height)
    }

    /// Look up a block's metadata.
    pub fn get_block_metadata(&self, hash: &block::Hash) -> Option<&BlockMetadata> {
        self.index.block(hash)
    }

    /// Whether the store holds this block.
    pub fn contains_block(&self, hash: &block::Hash) -> bool {
        self.index.contains_block(hash)
    }

    /// Rewrite a block's status in place.
    pub fn set_block_status(
        &mut self,
        hash: &block::Hash,
        status: BlockStatus,
    ) -> Result<(), StateError> {
        self.index.set_block_status(hash, status)
    }

    /// The metadata of the current chain head.
    pub fn get_chain_head(&self) -> Option<&BlockMetadata> {
        self.index.chain_head()
    }

    /// Move the chain head pointer and update the main-chain height index.
    pub fn set_chain_head(&mut self, hash: block::Hash) -> Result<(), StateError> {
        let height = match self.index.block(&hash) {
            Some(meta) => meta.height,
            None => return Err(StateError::NotFound),
        };
        self.index.set_chain_head(hash)?;
        self.index.set_main_chain(height, hash)?;
        Ok(())
    }

    /// Forget the main-chain entry at `height` (its block was reverted).
    pub fn clear_main_chain(&mut self, height: Height) -> Result<(), StateError> {
        self.index.clear_main_chain(height)
    }

    /// Load a confirmed transaction by hash.
    pub fn get_transaction(
        &self,
        hash: &transaction::Hash,
    ) -> Result<Option<Arc<Transaction>>, StateError> {
        let meta = match self.index.transaction(hash) {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let bytes = self.blocks.retrieve(meta.block_ptr)?;
        let block: Arc<Block> = bytes.as_slice().wire_deserialize_into()?;
        Ok(block.transactions.get(meta.position as usize).cloned())
    }

    /// Look up a confirmed transaction's metadata.
    pub fn get_transaction_metadata(
        &self,
        hash: &transaction::Hash,
    ) -> Option<&TransactionMetadata> {
        self.index.transaction(hash)
    }

    /// Whether this transaction has been confirmed in a stored block.
    pub fn contains_transaction(&self, hash: &transaction::Hash) -> bool {
        self.index.transaction(hash).is_some()
    }

    /// Load the revert data recorded when `meta`'s block was persisted.
    pub fn get_revert_data(&self, meta: &BlockMetadata) -> Result<RevertData, StateError> {
        let bytes = self.reverts.retrieve(meta.revert_ptr)?;
        Ok(bytes.as_slice().wire_deserialize_into()?)
    }

    /// Append fresh revert data for an already-persisted block and point its
    /// metadata at the new record.
    ///
    /// Side-chain blocks are stored before their spends can be computed;
    /// their revert data is written when a reorganisation first applies them.
    pub fn set_block_revert_data(
        &mut self,
        hash: &block::Hash,
        spent: Vec<Utxo>,
    ) -> Result<(), StateError> {
        let mut meta = match self.index.block(hash) {
            Some(meta) => meta.clone(),
            None => return Err(StateError::NotFound),
        };
        let revert = RevertData { spent };
        meta.revert_ptr = self.reverts.store(&revert.wire_serialize_to_vec()?)?;
        self.index.insert_block(*hash, meta)
    }

    /// Look up an unspent output.
    pub fn get_unspent_output(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.utxos.get(outpoint)
    }

    /// Add an unspent output.
    pub fn add_unspent_output(&mut self, utxo: Utxo) -> Result<(), StateError> {
        self.utxos.insert(utxo)
    }

    /// Remove (spend) an output, returning what was removed.
    pub fn remove_unspent_output(
        &mut self,
        outpoint: &OutPoint,
    ) -> Result<Option<Utxo>, StateError> {
        self.utxos.remove(outpoint)
    }

    /// All unspent outputs locked to `pub_key_hash`.
    pub fn get_unspent_outputs_for_address(&self, pub_key_hash: &[u8; 20]) -> Vec<Utxo> {
        self.utxos.by_pub_key_hash(pub_key_hash)
    }

    /// The number of unspent outputs.
    pub fn unspent_output_count(&self) -> usize {
        self.utxos.len()
    }

    /// A block locator for the current chain: the head hash, ten unit steps,
    /// then exponentially spaced ancestors back to genesis.
    pub fn block_locator(&self) -> Vec<block::Hash> {
        let tip = match self.index.chain_head() {
            Some(meta) => meta.height,
            None => return Vec::new(),
        };
        block_locator_heights(tip)
            .into_iter()
            .filter_map(|height| self.index.hash_at_height(height))
            .collect()
    }

    /// Flush all persistent state to disk.
    pub fn flush(&self) -> Result<(), StateError> {
        self.index.flush()?;
        self.utxos.flush()
    }
}
