//! A single peer connection: framed socket, handshake state machine, and
//! message handlers.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use futures::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace};

use volt_chain::block::Block;
use volt_chain::compactint::CompactInt;
use volt_chain::transaction;
use volt_chain::SerializationError;

use crate::config::Config;
use crate::constants;
use crate::dispatch::{BlockVerdict, DispatchError, NodeClient, TxVerdict};
use crate::meta_addr::MetaAddr;
use crate::peer_set::{PeerSet, SyncEvent};
use crate::protocol::message::Version;
use crate::protocol::types::{Nonce, PeerServices};
use crate::protocol::{Codec, InventoryHash, Message};

use super::{PeerError, PeerState};

impl From<DispatchError> for PeerError {
    fn from(_: DispatchError) -> PeerError {
        PeerError::Shutdown
    }
}

/// Messages the peer set pushes into an individual connection.
#[derive(Debug)]
pub enum OutboundEvent {
    /// Send as-is once the handshake has completed.
    Message(Message),
    /// Relay these addresses, minus any the peer already knows.
    Addresses(Vec<MetaAddr>),
    /// Advertise these transactions, minus any the peer already knows.
    TransactionInv(Vec<transaction::Hash>),
}

/// One live peer connection.
pub struct Connection {
    addr: SocketAddr,
    outbound: bool,
    state: PeerState,
    our_nonce: Nonce,
    their_version: Option<Version>,
    got_verack: bool,
    pong_pending: Option<Nonce>,
    /// Addresses this peer has seen, to de-duplicate gossip relays.
    known_addresses: HashSet<SocketAddr>,
    /// Transactions this peer has seen, to de-duplicate inventory relays.
    known_transactions: HashSet<transaction::Hash>,
    node: NodeClient,
    peers: PeerSet,
    events: mpsc::Receiver<OutboundEvent>,
    config: Config,
}

impl Connection {
    pub(crate) fn new(
        addr: SocketAddr,
        outbound: bool,
        our_nonce: Nonce,
        node: NodeClient,
        peers: PeerSet,
        events: mpsc::Receiver<OutboundEvent>,
        config: Config,
    ) -> Connection {
        Connection {
            addr,
            outbound,
            state: PeerState::Connected,
            our_nonce,
            their_version: None,
            got_verack: false,
            pong_pending: None,
            known_addresses: HashSet::new(),
            known_transactions: HashSet::new(),
            node,
            peers,
            events,
            config,
        }
    }

    /// The peer's declared protocol version, once the handshake has seen it.
    pub fn peer_version(&self) -> Option<&Version> {
        self.their_version.as_ref()
    }

    /// Drive the connection until it ends. The returned error says why, and
    /// carries the ban score the failure earns.
    pub async fn run(mut self, stream: TcpStream) -> Result<(), PeerError> {
        let network = self.config.network;
        let (read_half, write_half) = stream.into_split();
        let mut source =
            FramedRead::new(read_half, Codec::builder().for_network(network).finish());
        let mut sink =
            FramedWrite::new(write_half, Codec::builder().for_network(network).finish());

        // Both sides open with Version.
        let version = self.build_version().await?;
        sink.send(Message::Version(version)).await?;
        self.state = PeerState::VersionSent;
        trace!(addr = %self.addr, outbound = self.outbound, "sent version");

        let heartbeat_period = Duration::from_millis(self.config.heartbeat);
        let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);
        let inactive = Duration::from_millis(self.config.inactive_time);

        loop {
            tokio::select! {
                received = timeout(inactive, source.next()) => {
                    match received {
                        Err(_) => return Err(PeerError::IdleTimeout),
                        Ok(None) => return Err(PeerError::ConnectionClosed),
                        Ok(Some(Err(error))) => return Err(error.into()),
                        Ok(Some(Ok(message))) => self.handle_message(message, &mut sink).await?,
                    }
                }
                _ = heartbeat.tick() => {
                    if self.state == PeerState::Ready {
                        if self.pong_pending.is_some() {
                            return Err(PeerError::HeartbeatTimeout);
                        }
                        let nonce = Nonce::new();
                        self.pong_pending = Some(nonce);
                        sink.send(Message::Ping(nonce)).await?;
                    }
                }
                event = self.events.recv() => {
                    match event {
                        None => return Err(PeerError::Shutdown),
                        Some(event) => self.handle_outbound(event, &mut sink).await?,
                    }
                }
            }
        }
    }

    async fn build_version(&self) -> Result<Version, PeerError> {
        let info = self.node.chain_info().await?;
        let local: SocketAddr = (std::net::Ipv4Addr::UNSPECIFIED, self.config.port).into();
        Ok(Version::new(
            constants::CURRENT_VERSION,
            self.addr,
            PeerServices::NODE_NETWORK,
            PeerServices::NODE_NETWORK,
            local,
            self.our_nonce,
            self.config.user_agent.clone(),
            info.height,
        ))
    }

    async fn handle_message<S>(&mut self, message: Message, sink: &mut S) -> Result<(), PeerError>
    where
        S: Sink<Message, Error = SerializationError> + Unpin,
    {
        trace!(addr = %self.addr, %message, state = ?self.state, "received message");
        match (self.state, message) {
            (PeerState::VersionSent, Message::Version(version)) => {
                // A matching nonce means we dialled our own listener.
                if self.peers.is_our_nonce(&version.nonce) {
                    return Err(PeerError::SelfConnection);
                }
                self.peers.record_height(self.addr, version.best_height);
                self.peers.learn_address(MetaAddr {
                    last_seen: Utc::now(),
                    addr: self.addr,
                });
                self.their_version = Some(version);
                sink.send(Message::Verack).await?;
                self.state = PeerState::VersionExchanged;
                if self.got_verack {
                    self.enter_ready(sink).await?;
                }
                Ok(())
            }
            // Their Verack can overtake their Version; remember it.
            (PeerState::VersionSent, Message::Verack) => {
                self.got_verack = true;
                Ok(())
            }
            (PeerState::VersionExchanged, Message::Verack) => {
                self.got_verack = true;
                self.enter_ready(sink).await
            }
            (PeerState::Ready, message) => self.handle_ready(message, sink).await,
            _ => Err(PeerError::UnexpectedMessage),
        }
    }

    /// The handshake just completed: announce our interest in the peer's
    /// addresses and pool contents.
    async fn enter_ready<S>(&mut self, sink: &mut S) -> Result<(), PeerError>
    where
        S: Sink<Message, Error = SerializationError> + Unpin,
    {
        self.state = PeerState::Ready;
        debug!(addr = %self.addr, outbound = self.outbound, "handshake complete");
        sink.send(Message::GetAddress).await?;
        sink.send(Message::GetUnconfirmedTransactions).await?;
        Ok(())
    }

    async fn handle_ready<S>(&mut self, message: Message, sink: &mut S) -> Result<(), PeerError>
    where
        S: Sink<Message, Error = SerializationError> + Unpin,
    {
        match message {
            Message::Version(_) | Message::Verack => Err(PeerError::UnexpectedMessage),

            Message::Ping(nonce) => {
                sink.send(Message::Pong(nonce)).await?;
                Ok(())
            }

            Message::Pong(nonce) => {
                if self.pong_pending == Some(nonce) {
                    self.pong_pending = None;
                    Ok(())
                } else {
                    self.penalize(10)
                }
            }

            Message::GetAddress => {
                let sample = self
                    .peers
                    .random_addresses(constants::MAX_ADDRS_PER_MESSAGE);
                sink.send(Message::Address(sample)).await?;
                Ok(())
            }

            Message::Address(addrs) => {
                let mut fresh = Vec::new();
                for meta in addrs {
                    self.known_addresses.insert(meta.addr);
                    if self.peers.learn_address(meta) {
                        fresh.push(meta);
                    }
                }
                if !fresh.is_empty() {
                    self.peers.relay_addresses(self.addr, fresh);
                }
                Ok(())
            }

            Message::GetBlocks(request) => {
                let blocks = self
                    .node
                    .blocks_after_locator(
                        request.block_header_hashes,
                        request.stop_hash,
                        constants::MAX_BLOCKS_PER_MESSAGE,
                    )
                    .await?;

                // Cap the batch's bytes as well as its count.
                let mut batch = Vec::new();
                let mut bytes = 0usize;
                for block in blocks {
                    let size = block_size(&block);
                    if bytes + size > constants::BLOCK_BATCH_BYTE_BUDGET && !batch.is_empty() {
                        break;
                    }
                    bytes += size;
                    batch.push(block);
                }
                sink.send(Message::Blocks(batch)).await?;
                Ok(())
            }

            Message::Blocks(blocks) => {
                let count = blocks.len();
                for block in blocks {
                    match self.node.submit_block(block.clone()).await? {
                        BlockVerdict::Invalid => self.penalize(20)?,
                        BlockVerdict::Connected => self.peers.relay_block(self.addr, block),
                        _ => {}
                    }
                }
                self.peers.sync_event(SyncEvent::BlocksReceived {
                    addr: self.addr,
                    count,
                });
                Ok(())
            }

            Message::GetHeader(hash) => {
                if let Some(header) = self.node.header(hash).await? {
                    sink.send(Message::Header(header)).await?;
                }
                Ok(())
            }

            // Unsolicited headers carry nothing we track.
            Message::Header(_) => Ok(()),

            Message::GetUnconfirmedTransactions => {
                let inv = self
                    .node
                    .mempool_hashes()
                    .await?
                    .into_iter()
                    .map(InventoryHash::Tx)
                    .collect();
                sink.send(Message::KnownTransactions(inv)).await?;
                Ok(())
            }

            Message::KnownTransactions(inventory) => {
                let hashes: Vec<_> = inventory
                    .iter()
                    .filter_map(InventoryHash::tx_hash)
                    .collect();
                for hash in &hashes {
                    self.known_transactions.insert(*hash);
                }
                let missing = self.node.filter_unknown_transactions(hashes).await?;
                if !missing.is_empty() {
                    sink.send(Message::GetTransactions(missing)).await?;
                }
                Ok(())
            }

            Message::GetTransactions(hashes) => {
                let transactions = self.node.fetch_transactions(hashes).await?;
                if !transactions.is_empty() {
                    sink.send(Message::Transactions(transactions)).await?;
                }
                Ok(())
            }

            Message::Transactions(transactions) => {
                for transaction in transactions {
                    let hash = transaction.hash();
                    self.known_transactions.insert(hash);
                    match self.node.submit_transaction(transaction).await? {
                        TxVerdict::Added => self.peers.relay_transaction(self.addr, hash),
                        TxVerdict::Invalid => self.penalize(20)?,
                        TxVerdict::Duplicate | TxVerdict::Orphaned => {}
                    }
                }
                Ok(())
            }
        }
    }

    async fn handle_outbound<S>(
        &mut self,
        event: OutboundEvent,
        sink: &mut S,
    ) -> Result<(), PeerError>
    where
        S: Sink<Message, Error = SerializationError> + Unpin,
    {
        if self.state != PeerState::Ready {
            return Ok(());
        }
        match event {
            OutboundEvent::Message(message) => sink.send(message).await?,
            OutboundEvent::Addresses(addrs) => {
                let fresh: Vec<MetaAddr> = addrs
                    .into_iter()
                    .filter(|meta| self.known_addresses.insert(meta.addr))
                    .collect();
                if !fresh.is_empty() {
                    sink.send(Message::Address(fresh)).await?;
                }
            }
            OutboundEvent::TransactionInv(hashes) => {
                let fresh: Vec<InventoryHash> = hashes
                    .into_iter()
                    .filter(|hash| self.known_transactions.insert(*hash))
                    .map(InventoryHash::Tx)
                    .collect();
                if !fresh.is_empty() {
                    sink.send(Message::KnownTransactions(fresh)).await?;
                }
            }
        }
        Ok(())
    }

    /// Add ban score for a recoverable violation; errors out only when the
    /// peer crosses the ban threshold.
    fn penalize(&self, score: u8) -> Result<(), PeerError> {
        if self.peers.bump_ban_score(self.addr, score) {
            Err(PeerError::Banned)
        } else {
            Ok(())
        }
    }
}

/// The serialized size of a block.
fn block_size(block: &Block) -> usize {
    80 + CompactInt::size(block.transactions.len())
        + block
            .transactions
            .iter()
            .map(|tx| tx.len())
            .sum::<usize>()
}
