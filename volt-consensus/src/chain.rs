//! The chain engine: block validation, application, revert, fork choice by
//! cumulative work, and reorganisation.
//!
//! All mutation runs inside the node's serializing domain, so the engine
//! needs no internal locking. Listener deliveries are synchronous and must
//! not call back into the engine; anything that needs to react by mutating
//! chain state posts a message to the supervisor's queue instead.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use volt_chain::amount::Amount;
use volt_chain::block::{self, Block, Height};
use volt_chain::parameters::{genesis_block, Network};
use volt_chain::transfer::OutPoint;
use volt_chain::work::difficulty::CompactDifficulty;
use volt_state::{BlockMetadata, BlockStatus, PersistenceService, Utxo};

use crate::block::check;
use crate::difficulty;
use crate::error::{BlockError, ChainError, SubsidyError, TransactionError};
use crate::subsidy;
use crate::transaction::check as tx_check;

/// The most orphan blocks buffered while their parents are fetched. The
/// oldest entry is evicted when the buffer is full.
const MAX_ORPHAN_BLOCKS: usize = 100;

/// Observer of UTXO set changes (wallets, and the supervisor on behalf of
/// the mempool).
pub trait OutputListener: Send {
    /// Called with the net UTXO delta of a block application, a revert, or a
    /// whole reorganisation. Deliveries are synchronous under the
    /// serializing domain and must not re-enter the engine.
    fn outputs_changed(&mut self, added: &[Utxo], removed: &[OutPoint]);
}

/// Observer of blocks entering and leaving the main chain.
pub trait BlockListener: Send {
    /// `block` was connected to the main chain at `height`.
    fn block_added(&mut self, block: &Arc<Block>, height: Height);
    /// `block` was disconnected from the main chain.
    fn block_removed(&mut self, block: &Arc<Block>);
}

/// The net effect of a committed chain mutation.
///
/// For a reorganisation the UTXO vectors are coalesced across every reverted
/// and applied block, so an output restored and immediately re-spent nets
/// out to nothing.
#[derive(Debug)]
pub struct ChainDelta {
    /// Outputs the mutation created.
    pub added_utxos: Vec<Utxo>,
    /// Outputs the mutation consumed.
    pub removed_utxos: Vec<OutPoint>,
    /// Blocks newly on the main chain, oldest first.
    pub connected: Vec<(Arc<Block>, Height)>,
    /// Blocks no longer on the main chain, tip first.
    pub disconnected: Vec<Arc<Block>>,
}

/// What `add_block` did with a block.
#[derive(Debug)]
pub enum AddBlockOutcome {
    /// The block extended the head and was applied.
    Applied(ChainDelta),
    /// The block tipped a heavier branch; the chain reorganised onto it.
    Reorganized(ChainDelta),
    /// The block was persisted on a side chain; the head did not move.
    SideChained,
    /// The block's parent is unknown; it was buffered.
    Orphaned,
    /// The block is already stored.
    Duplicate,
}

/// Coalesces UTXO changes across a multi-block mutation.
#[derive(Default)]
struct DeltaBuilder {
    added: HashMap<OutPoint, Utxo>,
    removed: HashSet<OutPoint>,
}

impl DeltaBuilder {
    fn add(&mut self, utxo: Utxo) {
        // Re-adding an output removed earlier in the same mutation restores
        // identical content (the outpoint names a unique creation), so the
        // pair cancels.
        if !self.removed.remove(&utxo.outpoint) {
            self.added.insert(utxo.outpoint, utxo);
        }
    }

    fn remove(&mut self, outpoint: OutPoint) {
        if self.added.remove(&outpoint).is_none() {
            self.removed.insert(outpoint);
        }
    }

    fn finish(self) -> (Vec<Utxo>, Vec<OutPoint>) {
        (
            self.added.into_iter().map(|(_, utxo)| utxo).collect(),
            self.removed.into_iter().collect(),
        )
    }
}

/// The context-free validation phase: proof of work, timestamp tolerance,
/// coinbase placement, and the Merkle commitment. Everything here can be
/// checked without knowing the block's parent.
pub fn context_free_checks(network: Network, block: &Block) -> Result<(), BlockError> {
    check::has_transactions(block)?;
    check::coinbase_is_first(block)?;

    let hash = block.hash();
    let height = block.coinbase_height().unwrap_or(Height(0));
    check::difficulty_is_valid(&block.header, network, &height, &hash)?;
    check::time_is_valid_at(&block.header, Utc::now(), &height, &hash)?;

    let transaction_hashes: Vec<_> = block.transactions.iter().map(|tx| tx.hash()).collect();
    check::merkle_root_validity(block, &transaction_hashes)?;
    Ok(())
}

/// The chain engine.
pub struct ChainEngine {
    network: Network,
    store: PersistenceService,
    /// Blocks whose parents we have not seen yet, keyed by parent hash.
    orphans: HashMap<block::Hash, Arc<Block>>,
    orphan_order: VecDeque<block::Hash>,
    output_listeners: Vec<Box<dyn OutputListener>>,
    block_listeners: Vec<Box<dyn BlockListener>>,
}

impl ChainEngine {
    /// Build an engine over `store`, installing the genesis block on first
    /// run.
    ///
    /// The genesis block is trusted: it is never validated, and its coinbase
    /// pays to the unspendable all-zero key hash, so it contributes nothing
    /// to the UTXO set.
    pub fn new(network: Network, mut store: PersistenceService) -> Result<ChainEngine, ChainError> {
        if store.get_chain_head().is_none() {
            let genesis = genesis_block(network);
            let work = genesis
                .header
                .difficulty_threshold
                .to_work()
                .map(|work| work.value())
                .unwrap_or(1);
            store.persist_block(&genesis, Height(0), work, BlockStatus::MainChain, Vec::new())?;
            store.set_chain_head(genesis.hash())?;
            info!(hash = %genesis.hash(), %network, "initialised chain state at genesis");
        }

        Ok(ChainEngine {
            network,
            store,
            orphans: HashMap::new(),
            orphan_order: VecDeque::new(),
            output_listeners: Vec::new(),
            block_listeners: Vec::new(),
        })
    }

    /// The network this engine validates for.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Read access to the persistence façade.
    pub fn store(&self) -> &PersistenceService {
        &self.store
    }

    /// Register a UTXO delta observer.
    pub fn register_output_listener(&mut self, listener: Box<dyn OutputListener>) {
        self.output_listeners.push(listener);
    }

    /// Register a block connect/disconnect observer.
    pub fn register_block_listener(&mut self, listener: Box<dyn BlockListener>) {
        self.block_listeners.push(listener);
    }

    /// The metadata of the current chain head.
    pub fn chain_head(&self) -> BlockMetadata {
        self.store
            .get_chain_head()
            .cloned()
            .expect("a chain head exists after initialisation")
    }

    /// The height of the current chain head.
    pub fn best_height(&self) -> Height {
        self.chain_head().height
    }

    /// The height the next block will connect at.
    pub fn next_height(&self) -> Height {
        Height(self.best_height().0 + 1)
    }

    /// The difficulty the next block must carry.
    pub fn next_difficulty(&self) -> Result<CompactDifficulty, ChainError> {
        let head = self.chain_head();
        difficulty::expected_difficulty(self.network, &head, |hash| {
            self.store.get_block_metadata(hash).cloned()
        })
    }

    /// Validate and store a block, then update the chain according to fork
    /// choice. This is the single entry point for blocks from peers, from
    /// local miners, and from orphan draining.
    pub fn add_block(&mut self, block: Arc<Block>) -> Result<AddBlockOutcome, ChainError> {
        let hash = block.hash();
        if self.store.contains_block(&hash) {
            return Ok(AddBlockOutcome::Duplicate);
        }

        context_free_checks(self.network, &block)?;

        let parent_hash = block.header.previous_block_hash;
        let parent = match self.store.get_block_metadata(&parent_hash).cloned() {
            Some(parent) => parent,
            None => {
                self.buffer_orphan(parent_hash, block);
                return Ok(AddBlockOutcome::Orphaned);
            }
        };
        if parent.status == BlockStatus::Invalid {
            return Err(BlockError::InvalidParent.into());
        }

        let outcome = self.connect_block(&parent, block)?;
        self.drain_orphans(hash)?;
        Ok(outcome)
    }

    /// Revert the current head block, restoring the UTXO set to the parent
    /// state and moving the head pointer back.
    pub fn revert_head(&mut self) -> Result<ChainDelta, ChainError> {
        let mut delta = DeltaBuilder::default();
        let block = self.revert_head_collect(&mut delta)?;
        let (added, removed) = delta.finish();
        self.notify_outputs(&added, &removed);
        self.notify_block_removed(&block);
        Ok(ChainDelta {
            added_utxos: added,
            removed_utxos: removed,
            connected: Vec::new(),
            disconnected: vec![block],
        })
    }

    /// The blocks following the best locator match, in chain order, for
    /// serving a peer's block request. Stops after `max` blocks, at
    /// `stop_hash`, or at the chain head, whichever comes first.
    pub fn blocks_after_locator(
        &self,
        locator: &[block::Hash],
        stop_hash: Option<block::Hash>,
        max: usize,
    ) -> Result<Vec<Arc<Block>>, ChainError> {
        // The first locator entry that is on the main chain is the fork
        // point; an empty match means the peer shares only genesis with us.
        let mut start = Height(0);
        for hash in locator {
            if self
                .store
                .get_block_metadata(hash)
                .map(|meta| self.store.hash_at_height(meta.height) == Some(*hash))
                .unwrap_or(false)
            {
                start = self
                    .store
                    .get_block_metadata(hash)
                    .map(|meta| meta.height)
                    .unwrap_or(Height(0));
                break;
            }
        }

        let head = self.best_height();
        let mut blocks = Vec::new();
        let mut height = Height(start.0 + 1);
        while height <= head && blocks.len() < max {
            let block = match self.store.get_block_by_height(height)? {
                Some(block) => block,
                None => break,
            };
            let hash = block.hash();
            blocks.push(block);
            if Some(hash) == stop_hash {
                break;
            }
            height = Height(height.0 + 1);
        }
        Ok(blocks)
    }

    fn connect_block(
        &mut self,
        parent: &BlockMetadata,
        block: Arc<Block>,
    ) -> Result<AddBlockOutcome, ChainError> {
        let hash = block.hash();
        let height = Height(parent.height.0 + 1);

        let expected = difficulty::expected_difficulty(self.network, parent, |h| {
            self.store.get_block_metadata(h).cloned()
        })?;
        check::expected_difficulty_matches(&block.header, expected)?;
        check::coinbase_height_matches(&block, height)?;

        let work = block
            .header
            .difficulty_threshold
            .to_work()
            .ok_or(BlockError::InvalidDifficulty(height, hash))?
            .value();
        let cumulative_work = parent.cumulative_work.saturating_add(work);
        let head = self.chain_head();

        if parent.hash() == head.hash() {
            let spent = self.validate_spends(&block, height)?;
            self.store.persist_block(
                &block,
                height,
                cumulative_work,
                BlockStatus::MainChain,
                spent.clone(),
            )?;

            let mut delta = DeltaBuilder::default();
            self.apply_block(&block, height, &spent, &mut delta)?;
            let (added, removed) = delta.finish();
            self.notify_outputs(&added, &removed);
            self.notify_block_added(&block, height);

            info!(%hash, height = height.0, "extended chain head");
            Ok(AddBlockOutcome::Applied(ChainDelta {
                added_utxos: added,
                removed_utxos: removed,
                connected: vec![(block, height)],
                disconnected: Vec::new(),
            }))
        } else {
            // A branch block: persist it, but only adopt the branch if it
            // now carries more work than the head. Its spends can only be
            // validated against its own branch state, so contextual spend
            // validation waits until a reorganisation applies it.
            let meta = self.store.persist_block(
                &block,
                height,
                cumulative_work,
                BlockStatus::SideChain,
                Vec::new(),
            )?;

            if cumulative_work > head.cumulative_work {
                info!(%hash, height = height.0, "branch overtook the head, reorganising");
                self.reorganize_to(meta)
            } else {
                debug!(%hash, height = height.0, "stored side-chain block");
                Ok(AddBlockOutcome::SideChained)
            }
        }
    }

    /// Contextual validation of a block's spends against the current UTXO
    /// set, which must be the state at the block's parent. Returns the
    /// outputs the block consumes, in spend order.
    fn validate_spends(&self, block: &Block, height: Height) -> Result<Vec<Utxo>, BlockError> {
        let mut spent_in_block: HashSet<OutPoint> = HashSet::new();
        let mut spent = Vec::new();
        let mut total_fees = Amount::zero();

        for tx in block.transactions.iter().skip(1) {
            tx_check::has_inputs_and_outputs(tx)?;
            let mut input_sum = Amount::zero();

            for input in tx.inputs.iter() {
                let outpoint = tx_check::spent_outpoint(input)?;
                if !spent_in_block.insert(outpoint) {
                    return Err(TransactionError::DoubleSpend(outpoint).into());
                }
                let utxo = self
                    .store
                    .get_unspent_output(&outpoint)
                    .ok_or(TransactionError::MissingOutput(outpoint))?;
                tx_check::spend_is_authorized(tx, input, utxo)?;
                input_sum = input_sum
                    .checked_add(utxo.output.value)
                    .map_err(TransactionError::from)?;
                spent.push(utxo.clone());
            }

            let fee = tx_check::transaction_fee(input_sum, tx)?;
            total_fees = total_fees
                .checked_add(fee)
                .map_err(TransactionError::from)?;
        }

        let coinbase = block.transactions.get(0).ok_or(BlockError::NoTransactions)?;
        let coinbase_paid = Amount::sum(coinbase.outputs.iter().map(|output| output.value))
            .map_err(SubsidyError::from)?;
        subsidy::coinbase_is_valid(coinbase_paid, height, self.network, total_fees)?;

        Ok(spent)
    }

    /// Apply a validated block: spend its inputs, create its outputs, move
    /// the head.
    fn apply_block(
        &mut self,
        block: &Arc<Block>,
        height: Height,
        spent: &[Utxo],
        delta: &mut DeltaBuilder,
    ) -> Result<(), ChainError> {
        for utxo in spent {
            self.store.remove_unspent_output(&utxo.outpoint)?;
            delta.remove(utxo.outpoint);
        }

        for (position, tx) in block.transactions.iter().enumerate() {
            let tx_hash = tx.hash();
            for (index, output) in tx.outputs.iter().enumerate() {
                let utxo = Utxo {
                    outpoint: OutPoint {
                        hash: tx_hash,
                        index: index as u32,
                    },
                    version: tx.version,
                    height,
                    from_coinbase: position == 0,
                    output: output.clone(),
                };
                self.store.add_unspent_output(utxo.clone())?;
                delta.add(utxo);
            }
        }

        self.store.set_chain_head(block.hash())?;
        Ok(())
    }

    /// Revert the head block without notifying listeners, collecting the
    /// UTXO changes into `delta`. The reverted block's status drops to
    /// side-chain.
    fn revert_head_collect(&mut self, delta: &mut DeltaBuilder) -> Result<Arc<Block>, ChainError> {
        let head = self.chain_head();
        if head.height == Height(0) {
            return Err(ChainError::CannotRevertGenesis);
        }
        let hash = head.hash();
        let block = self
            .store
            .get_block(&hash)?
            .ok_or(volt_state::StateError::NotFound)?;
        let revert = self.store.get_revert_data(&head)?;

        // Delete the outputs this block created, newest first.
        for tx in block.transactions.iter().rev() {
            let tx_hash = tx.hash();
            for index in (0..tx.outputs.len()).rev() {
                let outpoint = OutPoint {
                    hash: tx_hash,
                    index: index as u32,
                };
                self.store.remove_unspent_output(&outpoint)?;
                delta.remove(outpoint);
            }
        }

        // Restore the outputs it spent, with their original context.
        for utxo in revert.spent.iter() {
            self.store.add_unspent_output(utxo.clone())?;
            delta.add(utxo.clone());
        }

        self.store.clear_main_chain(head.height)?;
        self.store.set_block_status(&hash, BlockStatus::SideChain)?;
        self.store.set_chain_head(head.header.previous_block_hash)?;
        debug!(%hash, height = head.height.0, "reverted block");
        Ok(block)
    }

    /// Switch the main chain onto the branch tipped by `new_tip`.
    ///
    /// The whole reorganisation is one logical transaction: listeners see a
    /// single coalesced UTXO delta, and a validation failure on the forward
    /// sweep restores the original branch untouched.
    fn reorganize_to(&mut self, new_tip: BlockMetadata) -> Result<AddBlockOutcome, ChainError> {
        let head = self.chain_head();
        let (ancestor, forward) = self.find_fork(head.clone(), new_tip)?;
        debug!(
            ancestor = %ancestor.hash(),
            revert_depth = head.height.0 - ancestor.height.0,
            apply_count = forward.len(),
            "reorganisation starts"
        );

        let mut delta = DeltaBuilder::default();
        let mut disconnected: Vec<Arc<Block>> = Vec::new();
        while self.chain_head().hash() != ancestor.hash() {
            disconnected.push(self.revert_head_collect(&mut delta)?);
        }

        let mut connected: Vec<(Arc<Block>, Height)> = Vec::new();
        for meta in &forward {
            let hash = meta.hash();
            let block = self
                .store
                .get_block(&hash)?
                .ok_or(volt_state::StateError::NotFound)?;

            match self.validate_spends(&block, meta.height) {
                Ok(spent) => {
                    self.store.set_block_revert_data(&hash, spent.clone())?;
                    self.store.set_block_status(&hash, BlockStatus::MainChain)?;
                    self.apply_block(&block, meta.height, &spent, &mut delta)?;
                    connected.push((block, meta.height));
                }
                Err(error) => {
                    warn!(%hash, %error, "reorganisation aborted: competing branch is invalid");
                    self.abort_reorganization(&mut delta, connected.len(), &disconnected, &forward)?;
                    return Err(ChainError::InvalidBlock(error));
                }
            }
        }

        let (added, removed) = delta.finish();
        self.notify_outputs(&added, &removed);
        for block in &disconnected {
            self.notify_block_removed(block);
        }
        for (block, height) in connected.clone() {
            self.notify_block_added(&block, height);
        }

        info!(new_head = %self.chain_head().hash(), "reorganisation complete");
        Ok(AddBlockOutcome::Reorganized(ChainDelta {
            added_utxos: added,
            removed_utxos: removed,
            connected,
            disconnected,
        }))
    }

    /// Unwind `applied_count` blocks of a failed forward sweep, re-apply the
    /// original branch from its stored revert data, and poison the
    /// competing branch.
    fn abort_reorganization(
        &mut self,
        delta: &mut DeltaBuilder,
        applied_count: usize,
        disconnected: &[Arc<Block>],
        forward: &[BlockMetadata],
    ) -> Result<(), ChainError> {
        for _ in 0..applied_count {
            self.revert_head_collect(delta)?;
        }

        // Oldest first: `disconnected` is tip-first.
        for block in disconnected.iter().rev() {
            let hash = block.hash();
            let meta = self
                .store
                .get_block_metadata(&hash)
                .cloned()
                .ok_or(volt_state::StateError::NotFound)?;
            let spent = self.store.get_revert_data(&meta)?.spent;
            self.store.set_block_status(&hash, BlockStatus::MainChain)?;
            self.apply_block(block, meta.height, &spent, delta)?;
        }

        for meta in forward {
            self.store.set_block_status(&meta.hash(), BlockStatus::Invalid)?;
        }
        Ok(())
    }

    /// The lowest common ancestor of `a` and `b`, found by walking parent
    /// links, plus the branch from just above the ancestor up to `b`,
    /// oldest first.
    fn find_fork(
        &self,
        mut a: BlockMetadata,
        mut b: BlockMetadata,
    ) -> Result<(BlockMetadata, Vec<BlockMetadata>), ChainError> {
        let mut branch = Vec::new();
        while b.height > a.height {
            branch.push(b.clone());
            b = self.parent_of(&b)?;
        }
        while a.height > b.height {
            a = self.parent_of(&a)?;
        }
        while a.hash() != b.hash() {
            branch.push(b.clone());
            a = self.parent_of(&a)?;
            b = self.parent_of(&b)?;
        }
        branch.reverse();
        Ok((b, branch))
    }

    fn parent_of(&self, meta: &BlockMetadata) -> Result<BlockMetadata, ChainError> {
        self.store
            .get_block_metadata(&meta.header.previous_block_hash)
            .cloned()
            .ok_or_else(|| volt_state::StateError::NotFound.into())
    }

    fn buffer_orphan(&mut self, parent: block::Hash, block: Arc<Block>) {
        debug!(%parent, hash = %block.hash(), "buffered orphan block");
        if self.orphans.len() >= MAX_ORPHAN_BLOCKS {
            if let Some(oldest) = self.orphan_order.pop_front() {
                self.orphans.remove(&oldest);
            }
        }
        if self.orphans.insert(parent, block).is_none() {
            self.orphan_order.push_back(parent);
        }
    }

    /// If a buffered orphan's parent just arrived, feed the orphan back
    /// through `add_block`; success cascades down the buffered chain.
    fn drain_orphans(&mut self, parent: block::Hash) -> Result<(), ChainError> {
        if let Some(block) = self.orphans.remove(&parent) {
            self.orphan_order.retain(|buffered| buffered != &parent);
            let hash = block.hash();
            match self.add_block(block) {
                Ok(_) => {}
                Err(ChainError::InvalidBlock(error)) => {
                    debug!(%hash, %error, "buffered orphan turned out invalid");
                }
                Err(fatal) => return Err(fatal),
            }
        }
        Ok(())
    }

    fn notify_outputs(&mut self, added: &[Utxo], removed: &[OutPoint]) {
        if added.is_empty() && removed.is_empty() {
            return;
        }
        for listener in &mut self.output_listeners {
            listener.outputs_changed(added, removed);
        }
    }

    fn notify_block_added(&mut self, block: &Arc<Block>, height: Height) {
        for listener in &mut self.block_listeners {
            listener.block_added(block, height);
        }
    }

    fn notify_block_removed(&mut self, block: &Arc<Block>) {
        for listener in &mut self.block_listeners {
            listener.block_removed(block);
        }
    }
}
