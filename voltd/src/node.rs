//! The node supervisor.
//!
//! One worker owns the chain engine, the transaction pool, and (through the
//! engine) the persistence façade. Every mutation in the process — blocks
//! from peers, blocks from miners, transaction admissions, pool reactions to
//! UTXO deltas — is a message consumed by this worker, so all of them are
//! serialized into a single total order. Reads answered by the worker see
//! the state as of the last committed mutation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use volt_chain::block::{self, Block, CountedHeader, Height};
use volt_chain::transaction::Transaction;
use volt_consensus::{
    Admission, AddBlockOutcome, ChainDelta, ChainEngine, ChainError, Mempool, TransactionError,
};
use volt_network::{BlockVerdict, ChainInfo, DispatchError, NodeClient, NodeRequest, TxVerdict};
use volt_state::PersistenceService;

use crate::config::VoltdConfig;

/// Depth of the dispatch queue feeding the worker. Peers that fill it are
/// slowed by back-pressure on their sockets.
const DISPATCH_QUEUE_DEPTH: usize = 256;

/// Errors from the daemon layer.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Reading a config or data file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file did not parse.
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// The persistence layer failed to open.
    #[error("storage error: {0}")]
    State(#[from] volt_state::StateError),

    /// The chain engine failed.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// The serializing worker is gone; the node is shutting down.
    #[error("node worker is gone")]
    WorkerGone,
}

impl From<DispatchError> for NodeError {
    fn from(_: DispatchError) -> NodeError {
        NodeError::WorkerGone
    }
}

/// Requests from the control interface (RPC, miner, wallet layers), served
/// by the same worker as network requests.
enum ControlRequest {
    /// Assemble a mining candidate on the current head.
    BlockTemplate {
        pay_to: [u8; 20],
        coinbase_data: Vec<u8>,
        reply: oneshot::Sender<Result<Block, ChainError>>,
    },
    /// A stored block by hash.
    GetBlock(block::Hash, oneshot::Sender<Option<Arc<Block>>>),
    /// The number of pool entries.
    PoolCount(oneshot::Sender<usize>),
    /// Every pool transaction.
    PendingTransactions(oneshot::Sender<Vec<Arc<Transaction>>>),
    /// Flush state and stop the worker.
    Shutdown(oneshot::Sender<()>),
}

/// The serializing worker that owns all mutable node state.
pub struct Node {
    engine: ChainEngine,
    mempool: Mempool,
    requests: mpsc::Receiver<NodeRequest>,
    control: mpsc::Receiver<ControlRequest>,
}

/// The clonable handle every other component talks to the node through.
#[derive(Clone)]
pub struct NodeHandle {
    client: NodeClient,
    control: mpsc::Sender<ControlRequest>,
}

impl Node {
    /// Open the chain state and build the supervisor and its handle.
    pub fn new(config: &VoltdConfig) -> Result<(Node, NodeHandle), NodeError> {
        let store = PersistenceService::open(&config.state_config(), config.network)?;
        let engine = ChainEngine::new(config.network, store)?;
        let mempool = Mempool::new();

        let (client, requests) = NodeClient::new(DISPATCH_QUEUE_DEPTH);
        let (control_sender, control) = mpsc::channel(64);

        Ok((
            Node {
                engine,
                mempool,
                requests,
                control,
            },
            NodeHandle {
                client,
                control: control_sender,
            },
        ))
    }

    /// Direct access to the chain engine, for wiring listeners before the
    /// worker starts.
    pub fn engine_mut(&mut self) -> &mut ChainEngine {
        &mut self.engine
    }

    /// Run the worker until shutdown. A storage failure stops the loop: the
    /// node refuses further writes rather than risk silent divergence.
    pub async fn run(mut self) {
        let mut housekeeping = tokio::time::interval(Duration::from_secs(600));
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => {
                        if let Err(fatal) = self.handle_request(request) {
                            error!(%fatal, "storage failure, stopping the node worker");
                            break;
                        }
                    }
                    None => break,
                },
                request = self.control.recv() => match request {
                    Some(ControlRequest::Shutdown(reply)) => {
                        let _ = self.engine.store().flush();
                        let _ = reply.send(());
                        break;
                    }
                    Some(request) => {
                        if let Err(fatal) = self.handle_control(request) {
                            error!(%fatal, "storage failure, stopping the node worker");
                            break;
                        }
                    }
                    None => break,
                },
                _ = housekeeping.tick() => {
                    self.mempool.evict_expired(Utc::now());
                    if let Err(error) = self.engine.store().flush() {
                        error!(%error, "state flush failed, stopping the node worker");
                        break;
                    }
                }
            }
        }
        info!("node worker stopped");
    }

    fn handle_request(&mut self, request: NodeRequest) -> Result<(), ChainError> {
        match request {
            NodeRequest::SubmitBlock(block, reply) => {
                let verdict = match self.engine.add_block(block) {
                    Ok(outcome) => {
                        let verdict = match &outcome {
                            AddBlockOutcome::Applied(_) | AddBlockOutcome::Reorganized(_) => {
                                BlockVerdict::Connected
                            }
                            AddBlockOutcome::SideChained => BlockVerdict::SideChained,
                            AddBlockOutcome::Orphaned => BlockVerdict::Orphaned,
                            AddBlockOutcome::Duplicate => BlockVerdict::Duplicate,
                        };
                        match outcome {
                            AddBlockOutcome::Applied(delta)
                            | AddBlockOutcome::Reorganized(delta) => {
                                self.apply_chain_delta(&delta)
                            }
                            _ => {}
                        }
                        verdict
                    }
                    Err(ChainError::InvalidBlock(invalid)) => {
                        debug!(%invalid, "rejected invalid block");
                        BlockVerdict::Invalid
                    }
                    Err(ChainError::CannotRevertGenesis) => BlockVerdict::Invalid,
                    Err(fatal) => return Err(fatal),
                };
                let _ = reply.send(verdict);
            }

            NodeRequest::SubmitTransaction(transaction, reply) => {
                let verdict = match self.mempool.add_transaction(transaction, self.engine.store())
                {
                    Ok(Admission::Added) => TxVerdict::Added,
                    Ok(Admission::Orphaned) => TxVerdict::Orphaned,
                    Err(TransactionError::Duplicate) => TxVerdict::Duplicate,
                    Err(invalid) => {
                        debug!(%invalid, "rejected transaction");
                        TxVerdict::Invalid
                    }
                };
                let _ = reply.send(verdict);
            }

            NodeRequest::ChainInfo(reply) => {
                let head = self.engine.chain_head();
                let _ = reply.send(ChainInfo {
                    height: head.height,
                    hash: head.hash(),
                });
            }

            NodeRequest::BlockLocator(reply) => {
                let _ = reply.send(self.engine.store().block_locator());
            }

            NodeRequest::BlocksAfterLocator {
                locator,
                stop,
                max,
                reply,
            } => match self.engine.blocks_after_locator(&locator, stop, max) {
                Ok(blocks) => {
                    let _ = reply.send(blocks);
                }
                Err(fatal @ ChainError::Storage(_)) => return Err(fatal),
                Err(_) => {
                    let _ = reply.send(Vec::new());
                }
            },

            NodeRequest::Header(hash, reply) => {
                let counted = self.engine.store().get_block_metadata(&hash).map(|meta| {
                    CountedHeader {
                        header: meta.header,
                        transaction_count: meta.transaction_count,
                    }
                });
                let _ = reply.send(counted);
            }

            NodeRequest::MempoolHashes(reply) => {
                let _ = reply.send(self.mempool.known_hashes());
            }

            NodeRequest::FilterUnknownTransactions(hashes, reply) => {
                let unknown = hashes
                    .into_iter()
                    .filter(|hash| {
                        !self.mempool.contains(hash)
                            && !self.engine.store().contains_transaction(hash)
                    })
                    .collect();
                let _ = reply.send(unknown);
            }

            NodeRequest::FetchTransactions(hashes, reply) => {
                let mut found = Vec::new();
                for hash in hashes {
                    if let Some(transaction) = self.mempool.get(&hash) {
                        found.push(transaction);
                        continue;
                    }
                    if let Ok(Some(transaction)) = self.engine.store().get_transaction(&hash) {
                        found.push(transaction);
                    }
                }
                let _ = reply.send(found);
            }
        }
        Ok(())
    }

    fn handle_control(&mut self, request: ControlRequest) -> Result<(), ChainError> {
        match request {
            ControlRequest::BlockTemplate {
                pay_to,
                coinbase_data,
                reply,
            } => {
                let _ = reply.send(self.engine.block_template(
                    &self.mempool,
                    pay_to,
                    coinbase_data,
                ));
            }
            ControlRequest::GetBlock(hash, reply) => match self.engine.store().get_block(&hash) {
                Ok(block) => {
                    let _ = reply.send(block);
                }
                Err(fatal) => return Err(fatal.into()),
            },
            ControlRequest::PoolCount(reply) => {
                let _ = reply.send(self.mempool.len());
            }
            ControlRequest::PendingTransactions(reply) => {
                let _ = reply.send(self.mempool.pending_transactions());
            }
            ControlRequest::Shutdown(_) => unreachable!("handled by the run loop"),
        }
        Ok(())
    }

    /// Settle the transaction pool after a committed chain mutation:
    /// re-admit what reverted blocks released, drop what connected blocks
    /// confirmed, then let the pool react to the UTXO delta.
    fn apply_chain_delta(&mut self, delta: &ChainDelta) {
        for block in &delta.disconnected {
            for transaction in block.transactions.iter().skip(1) {
                if let Err(error) = self
                    .mempool
                    .add_transaction(transaction.clone(), self.engine.store())
                {
                    debug!(%error, "reverted transaction not re-admitted");
                }
            }
        }
        for (block, _) in &delta.connected {
            for transaction in block.transactions.iter() {
                self.mempool.remove_transaction(&transaction.hash());
            }
        }
        self.mempool.outputs_updated(self.engine.store());
    }
}

impl NodeHandle {
    /// The dispatch-queue client, for wiring the networking stack.
    pub fn client(&self) -> NodeClient {
        self.client.clone()
    }

    /// Validate and store a block (the `submitBlock` contract). Locally
    /// mined and network blocks take exactly this path.
    pub async fn submit_block(&self, block: Arc<Block>) -> Result<BlockVerdict, NodeError> {
        Ok(self.client.submit_block(block).await?)
    }

    /// Admit a transaction to the pool.
    pub async fn submit_transaction(
        &self,
        transaction: Arc<Transaction>,
    ) -> Result<TxVerdict, NodeError> {
        Ok(self.client.submit_transaction(transaction).await?)
    }

    /// The chain head height (the `getBlockchainHeight` contract).
    pub async fn chain_height(&self) -> Result<Height, NodeError> {
        Ok(self.client.chain_info().await?.height)
    }

    /// The chain head hash (the `getChainHeadHash` contract).
    pub async fn chain_head_hash(&self) -> Result<block::Hash, NodeError> {
        Ok(self.client.chain_info().await?.hash)
    }

    /// A mining candidate (the `getWork` contract).
    pub async fn block_template(
        &self,
        pay_to: [u8; 20],
        coinbase_data: Vec<u8>,
    ) -> Result<Block, NodeError> {
        self.control_call(|reply| ControlRequest::BlockTemplate {
            pay_to,
            coinbase_data,
            reply,
        })
        .await?
        .map_err(NodeError::Chain)
    }

    /// A stored block by hash.
    pub async fn get_block(&self, hash: block::Hash) -> Result<Option<Arc<Block>>, NodeError> {
        self.control_call(|reply| ControlRequest::GetBlock(hash, reply))
            .await
    }

    /// The number of pool entries (the `getTransactionPoolCount` contract).
    pub async fn transaction_pool_count(&self) -> Result<usize, NodeError> {
        self.control_call(ControlRequest::PoolCount).await
    }

    /// Every pool transaction (the `getPendingTransactions` contract).
    pub async fn pending_transactions(&self) -> Result<Vec<Arc<Transaction>>, NodeError> {
        self.control_call(ControlRequest::PendingTransactions).await
    }

    /// Flush state and stop the worker.
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        self.control_call(ControlRequest::Shutdown).await
    }

    async fn control_call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
    ) -> Result<T, NodeError> {
        let (reply, response) = oneshot::channel();
        self.control
            .send(build(reply))
            .await
            .map_err(|_| NodeError::WorkerGone)?;
        response.await.map_err(|_| NodeError::WorkerGone)
    }
}
