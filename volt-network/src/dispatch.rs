//! The dispatch queue between the networking stack and the node's
//! serializing worker.
//!
//! Peers deliver their requests as [`NodeRequest`] values on a bounded
//! channel; the supervisor's single worker consumes them in order, so every
//! chain and pool mutation is serialized. Back-pressure on the channel slows
//! the sockets that feed it.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use volt_chain::block::{self, Block, CountedHeader, Height};
use volt_chain::transaction::{self, Transaction};

/// What the worker reports back for a submitted block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlockVerdict {
    /// Accepted: applied to the main chain, or triggered a reorganisation.
    Connected,
    /// Accepted onto a side chain; the head did not move.
    SideChained,
    /// Parent unknown; buffered.
    Orphaned,
    /// Already known; ignored.
    Duplicate,
    /// Rejected as invalid. The sender earns ban score.
    Invalid,
}

/// What the worker reports back for a submitted transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TxVerdict {
    /// Admitted to the pool.
    Added,
    /// Parked in the orphan pool.
    Orphaned,
    /// Already known; ignored.
    Duplicate,
    /// Rejected as invalid. The sender earns ban score.
    Invalid,
}

/// The chain position the worker reports for status queries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChainInfo {
    /// The chain head height.
    pub height: Height,
    /// The chain head hash.
    pub hash: block::Hash,
}

/// A request consumed by the node's serializing worker.
#[derive(Debug)]
pub enum NodeRequest {
    /// Validate and store a block.
    SubmitBlock(Arc<Block>, oneshot::Sender<BlockVerdict>),
    /// Admit a transaction to the pool.
    SubmitTransaction(Arc<Transaction>, oneshot::Sender<TxVerdict>),
    /// The chain head position.
    ChainInfo(oneshot::Sender<ChainInfo>),
    /// A block locator for the current chain.
    BlockLocator(oneshot::Sender<Vec<block::Hash>>),
    /// The blocks following the best locator match.
    BlocksAfterLocator {
        /// The peer's locator hashes, newest first.
        locator: Vec<block::Hash>,
        /// Stop early at this hash.
        stop: Option<block::Hash>,
        /// At most this many blocks.
        max: usize,
        /// Where the answer goes.
        reply: oneshot::Sender<Vec<Arc<Block>>>,
    },
    /// The header of the named block, with its transaction count.
    Header(block::Hash, oneshot::Sender<Option<CountedHeader>>),
    /// Every transaction hash in the pool.
    MempoolHashes(oneshot::Sender<Vec<transaction::Hash>>),
    /// Which of these transactions the node has never seen.
    FilterUnknownTransactions(
        Vec<transaction::Hash>,
        oneshot::Sender<Vec<transaction::Hash>>,
    ),
    /// Full transactions from the pool or the chain, by hash.
    FetchTransactions(
        Vec<transaction::Hash>,
        oneshot::Sender<Vec<Arc<Transaction>>>,
    ),
}

/// Errors talking to the worker.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The worker is gone; the node is shutting down.
    #[error("node worker is gone, shutting down")]
    WorkerGone,
}

/// A clonable client for the dispatch queue.
#[derive(Clone)]
pub struct NodeClient {
    sender: mpsc::Sender<NodeRequest>,
}

impl NodeClient {
    /// A new queue of the given depth. The receiver goes to the supervisor's
    /// worker.
    pub fn new(capacity: usize) -> (NodeClient, mpsc::Receiver<NodeRequest>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (NodeClient { sender }, receiver)
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> NodeRequest,
    ) -> Result<T, DispatchError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| DispatchError::WorkerGone)?;
        response.await.map_err(|_| DispatchError::WorkerGone)
    }

    /// Validate and store a block.
    pub async fn submit_block(&self, block: Arc<Block>) -> Result<BlockVerdict, DispatchError> {
        self.call(|reply| NodeRequest::SubmitBlock(block, reply)).await
    }

    /// Admit a transaction to the pool.
    pub async fn submit_transaction(
        &self,
        transaction: Arc<Transaction>,
    ) -> Result<TxVerdict, DispatchError> {
        self.call(|reply| NodeRequest::SubmitTransaction(transaction, reply))
            .await
    }

    /// The chain head position.
    pub async fn chain_info(&self) -> Result<ChainInfo, DispatchError> {
        self.call(NodeRequest::ChainInfo).await
    }

    /// A block locator for the current chain.
    pub async fn block_locator(&self) -> Result<Vec<block::Hash>, DispatchError> {
        self.call(NodeRequest::BlockLocator).await
    }

    /// The blocks following the best locator match.
    pub async fn blocks_after_locator(
        &self,
        locator: Vec<block::Hash>,
        stop: Option<block::Hash>,
        max: usize,
    ) -> Result<Vec<Arc<Block>>, DispatchError> {
        self.call(|reply| NodeRequest::BlocksAfterLocator {
            locator,
            stop,
            max,
            reply,
        })
        .await
    }

    /// The header of the named block.
    pub async fn header(
        &self,
        hash: block::Hash,
    ) -> Result<Option<CountedHeader>, DispatchError> {
        self.call(|reply| NodeRequest::Header(hash, reply)).await
    }

    /// Every transaction hash in the pool.
    pub async fn mempool_hashes(&self) -> Result<Vec<transaction::Hash>, DispatchError> {
        self.call(NodeRequest::MempoolHashes).await
    }

    /// Which of these transactions the node has never seen.
    pub async fn filter_unknown_transactions(
        &self,
        hashes: Vec<transaction::Hash>,
    ) -> Result<Vec<transaction::Hash>, DispatchError> {
        self.call(|reply| NodeRequest::FilterUnknownTransactions(hashes, reply))
            .await
    }

    /// Full transactions by hash.
    pub async fn fetch_transactions(
        &self,
        hashes: Vec<transaction::Hash>,
    ) -> Result<Vec<Arc<Transaction>>, DispatchError> {
        self.call(|reply| NodeRequest::FetchTransactions(hashes, reply))
            .await
    }
}
