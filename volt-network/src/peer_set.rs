//! The peer manager: connection limits, dial and accept loops, relays, and
//! ban bookkeeping.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use volt_chain::block::Height;
use volt_chain::transaction;

use crate::address_book::AddressBook;
use crate::config::Config;
use crate::dispatch::NodeClient;
use crate::meta_addr::MetaAddr;
use crate::peer::{Connection, OutboundEvent};
use crate::protocol::types::Nonce;
use crate::protocol::Message;
use crate::BoxError;

/// How long a dial attempt may take before it is abandoned.
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Chain synchronisation signals emitted by connections, consumed by the
/// [`Syncer`](crate::sync::Syncer).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncEvent {
    /// A handshake revealed a peer's best height.
    PeerHeight {
        /// The peer.
        addr: SocketAddr,
        /// The height it advertised.
        height: Height,
    },
    /// A batch of blocks arrived from a peer.
    BlocksReceived {
        /// The peer.
        addr: SocketAddr,
        /// How many blocks the batch held.
        count: usize,
    },
    /// A peer went away.
    PeerDisconnected {
        /// The peer.
        addr: SocketAddr,
    },
}

struct PeerHandle {
    events: mpsc::Sender<OutboundEvent>,
}

struct Inner {
    config: Config,
    node: NodeClient,
    book: Mutex<AddressBook>,
    peers: Mutex<HashMap<SocketAddr, PeerHandle>>,
    heights: Mutex<HashMap<SocketAddr, Height>>,
    /// Version nonces we have sent on live connections, for self-connection
    /// detection.
    our_nonces: Mutex<HashSet<Nonce>>,
    sync_events: mpsc::UnboundedSender<SyncEvent>,
}

/// A clonable handle to the peer manager.
#[derive(Clone)]
pub struct PeerSet {
    inner: Arc<Inner>,
}

impl PeerSet {
    /// Build the peer set over an already-opened address book. The returned
    /// receiver feeds the syncer.
    pub fn new(
        config: Config,
        node: NodeClient,
        book: AddressBook,
    ) -> (PeerSet, mpsc::UnboundedReceiver<SyncEvent>) {
        let (sync_events, sync_receiver) = mpsc::unbounded_channel();
        let peer_set = PeerSet {
            inner: Arc::new(Inner {
                config,
                node,
                book: Mutex::new(book),
                peers: Mutex::new(HashMap::new()),
                heights: Mutex::new(HashMap::new()),
                our_nonces: Mutex::new(HashSet::new()),
                sync_events,
            }),
        };
        (peer_set, sync_receiver)
    }

    /// Accept inbound connections forever.
    pub async fn listen(&self) -> Result<(), BoxError> {
        let listener =
            TcpListener::bind((std::net::Ipv4Addr::UNSPECIFIED, self.inner.config.port)).await?;
        info!(port = self.inner.config.port, "listening for peers");
        loop {
            let (stream, addr) = listener.accept().await?;
            if self.is_banned(&addr) {
                debug!(%addr, "rejected connection from banned address");
                continue;
            }
            if self.peer_count() >= self.inner.config.max_connections {
                debug!(%addr, "rejected connection, at the connection limit");
                continue;
            }
            self.accept(stream, addr);
        }
    }

    /// Adopt an already-accepted inbound connection.
    pub fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        self.spawn_connection(stream, addr, false);
    }

    /// Periodically dial out when below the connection floor, and keep the
    /// address pool tidy.
    pub async fn maintain(&self) {
        let mut dial_tick = tokio::time::interval(Duration::from_secs(30));
        let mut upkeep_tick = tokio::time::interval(Duration::from_secs(600));
        loop {
            tokio::select! {
                _ = dial_tick.tick() => {
                    if self.peer_count() < self.inner.config.min_connections {
                        for addr in self.dial_candidates() {
                            if self.peer_count() >= self.inner.config.min_connections {
                                break;
                            }
                            self.dial(addr).await;
                        }
                    }
                }
                _ = upkeep_tick.tick() => {
                    let now = Utc::now();
                    let mut book = self.lock_book();
                    book.cleanup(now);
                    book.check_release_ban(now);
                }
            }
        }
    }

    /// Try to open an outbound connection.
    pub async fn dial(&self, addr: SocketAddr) {
        if self.is_banned(&addr) || self.is_connected(&addr) {
            return;
        }
        match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => self.spawn_connection(stream, addr, true),
            Ok(Err(error)) => debug!(%addr, %error, "dial failed"),
            Err(_) => debug!(%addr, "dial timed out"),
        }
    }

    fn dial_candidates(&self) -> Vec<SocketAddr> {
        let mut candidates: Vec<SocketAddr> = self
            .inner
            .config
            .initial_peers
            .iter()
            .copied()
            .filter(|addr| !self.is_connected(addr) && !self.is_banned(addr))
            .collect();
        candidates.extend(
            self.lock_book()
                .get_random(8, Utc::now())
                .into_iter()
                .map(|meta| meta.addr)
                .filter(|addr| !self.is_connected(addr)),
        );
        candidates
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr, outbound: bool) {
        let nonce = Nonce::new();
        let (events, receiver) = mpsc::channel(64);
        {
            let mut peers = self.lock(&self.inner.peers);
            if peers.contains_key(&addr) {
                debug!(%addr, "dropping duplicate connection");
                return;
            }
            peers.insert(addr, PeerHandle { events });
        }
        self.lock(&self.inner.our_nonces).insert(nonce);

        let connection = Connection::new(
            addr,
            outbound,
            nonce,
            self.inner.node.clone(),
            self.clone(),
            receiver,
            self.inner.config.clone(),
        );
        let set = self.clone();
        tokio::spawn(async move {
            let result = connection.run(stream).await;
            set.connection_closed(addr, nonce, result);
        });
        debug!(%addr, outbound, "peer connection started");
    }

    fn connection_closed(
        &self,
        addr: SocketAddr,
        nonce: Nonce,
        result: Result<(), crate::peer::PeerError>,
    ) {
        self.lock(&self.inner.our_nonces).remove(&nonce);
        self.lock(&self.inner.peers).remove(&addr);
        self.lock(&self.inner.heights).remove(&addr);
        let _ = self
            .inner
            .sync_events
            .send(SyncEvent::PeerDisconnected { addr });

        match result {
            Ok(()) => debug!(%addr, "peer connection closed"),
            Err(error) => {
                let score = error.ban_score();
                if score > 0 {
                    self.bump_ban_score(addr, score);
                }
                warn!(%addr, %error, "peer connection failed");
            }
        }
    }

    /// Whether this nonce is one we sent in a live handshake.
    pub fn is_our_nonce(&self, nonce: &Nonce) -> bool {
        self.lock(&self.inner.our_nonces).contains(nonce)
    }

    /// Record a peer's advertised best height and tell the syncer.
    pub fn record_height(&self, addr: SocketAddr, height: Height) {
        self.lock(&self.inner.heights).insert(addr, height);
        let _ = self
            .inner
            .sync_events
            .send(SyncEvent::PeerHeight { addr, height });
    }

    /// Emit a synchronisation signal.
    pub fn sync_event(&self, event: SyncEvent) {
        let _ = self.inner.sync_events.send(event);
    }

    /// Merge a gossiped address into the pool. Returns true if it was new.
    pub fn learn_address(&self, meta: MetaAddr) -> bool {
        self.lock_book().update(meta.addr, meta.last_seen)
    }

    /// A random pool sample for a `GetAddress` reply.
    pub fn random_addresses(&self, amount: usize) -> Vec<MetaAddr> {
        self.lock_book().get_random(amount, Utc::now())
    }

    /// Relay freshly learnt addresses to every other peer.
    pub fn relay_addresses(&self, from: SocketAddr, addrs: Vec<MetaAddr>) {
        self.fan_out(from, || OutboundEvent::Addresses(addrs.clone()));
    }

    /// Advertise a freshly admitted transaction to every other peer.
    pub fn relay_transaction(&self, from: SocketAddr, hash: transaction::Hash) {
        self.fan_out(from, || OutboundEvent::TransactionInv(vec![hash]));
    }

    /// Advertise a locally admitted transaction to every peer.
    pub fn announce_transaction(&self, hash: transaction::Hash) {
        for handle in self.lock(&self.inner.peers).values() {
            let _ = handle
                .events
                .try_send(OutboundEvent::TransactionInv(vec![hash]));
        }
    }

    /// Forward a freshly connected block to every other peer.
    pub fn relay_block(&self, from: SocketAddr, block: std::sync::Arc<volt_chain::block::Block>) {
        self.fan_out(from, || {
            OutboundEvent::Message(Message::Blocks(vec![block.clone()]))
        });
    }

    /// Queue a message to one peer. Returns false if the peer is gone or its
    /// queue is full.
    pub fn send_to(&self, addr: SocketAddr, message: Message) -> bool {
        self.lock(&self.inner.peers)
            .get(&addr)
            .map(|handle| handle.events.try_send(OutboundEvent::Message(message)).is_ok())
            .unwrap_or(false)
    }

    /// Queue a message to every connected peer.
    pub fn broadcast(&self, message: Message) {
        for handle in self.lock(&self.inner.peers).values() {
            let _ = handle
                .events
                .try_send(OutboundEvent::Message(message.clone()));
        }
    }

    /// Add ban score to an address; a crossing of the threshold bans it.
    /// Returns true if the address is now banned.
    pub fn bump_ban_score(&self, addr: SocketAddr, score: u8) -> bool {
        self.lock_book().bump_ban_score(addr, score, Utc::now())
    }

    /// Whether the address is banned.
    pub fn is_banned(&self, addr: &SocketAddr) -> bool {
        self.lock_book().is_banned(addr)
    }

    /// Whether a connection to this address is live.
    pub fn is_connected(&self, addr: &SocketAddr) -> bool {
        self.lock(&self.inner.peers).contains_key(addr)
    }

    /// The number of live connections.
    pub fn peer_count(&self) -> usize {
        self.lock(&self.inner.peers).len()
    }

    /// The most advanced peer and its height.
    pub fn best_peer(&self) -> Option<(SocketAddr, Height)> {
        self.lock(&self.inner.heights)
            .iter()
            .max_by_key(|(_, height)| **height)
            .map(|(addr, height)| (*addr, *height))
    }

    fn fan_out(&self, from: SocketAddr, mut event: impl FnMut() -> OutboundEvent) {
        for (addr, handle) in self.lock(&self.inner.peers).iter() {
            if *addr == from {
                continue;
            }
            let _ = handle.events.try_send(event());
        }
    }

    fn lock_book(&self) -> std::sync::MutexGuard<'_, AddressBook> {
        self.lock(&self.inner.book)
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().expect("peer set lock poisoned")
    }
}
