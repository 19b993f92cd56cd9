//! Initial block download: catch the local chain up to the best height any
//! peer advertises.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use volt_chain::block::Height;

use crate::constants::SYNC_BATCH_TIMEOUT_SECS;
use crate::peer_set::{PeerSet, SyncEvent};
use crate::protocol::message::GetBlocks;
use crate::protocol::Message;
use crate::NodeClient;

/// Where the syncer is in its lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SyncState {
    /// No peer claims more blocks than we have.
    Synced,
    /// Downloading towards a peer's advertised height.
    Syncing,
}

/// Download progress, as a percentage of the best advertised height. Exposed
/// to the control interface.
pub type SyncProgress = watch::Receiver<f64>;

/// The initial-block-download orchestrator.
pub struct Syncer {
    node: NodeClient,
    peers: PeerSet,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    /// Advertised best heights, by peer. Entries are dropped when a peer
    /// disconnects or stalls, which is what rotates downloads elsewhere.
    heights: HashMap<SocketAddr, Height>,
    state: SyncState,
    progress: watch::Sender<f64>,
}

impl Syncer {
    /// Build the syncer over the peer set's event stream.
    pub fn new(
        node: NodeClient,
        peers: PeerSet,
        events: mpsc::UnboundedReceiver<SyncEvent>,
    ) -> (Syncer, SyncProgress) {
        let (progress, receiver) = watch::channel(100.0);
        (
            Syncer {
                node,
                peers,
                events,
                heights: HashMap::new(),
                state: SyncState::Synced,
                progress,
            },
            receiver,
        )
    }

    /// Drive synchronisation until the node shuts down.
    pub async fn run(mut self) {
        loop {
            let local = match self.node.chain_info().await {
                Ok(info) => info.height,
                Err(_) => return,
            };

            match self.best_peer_above(local) {
                Some((addr, target)) => {
                    if self.state != SyncState::Syncing {
                        info!(local = local.0, target = target.0, "entering block download");
                        self.state = SyncState::Syncing;
                    }
                    self.publish_progress(local, target);
                    self.request_batch_from(addr).await;
                }
                None => {
                    if self.state != SyncState::Synced {
                        info!(height = local.0, "chain is synchronised");
                        self.state = SyncState::Synced;
                    }
                    self.publish_progress(local, local);
                    // Idle until something changes.
                    match self.events.recv().await {
                        Some(event) => self.apply_event(event),
                        None => return,
                    }
                }
            }
        }
    }

    /// Ask `addr` for the blocks after our locator, then wait for its batch.
    /// A stall or disconnect drops the peer from the candidate set, so the
    /// next round selects someone else and restarts from the current head.
    async fn request_batch_from(&mut self, addr: SocketAddr) {
        let locator = match self.node.block_locator().await {
            Ok(locator) => locator,
            Err(_) => return,
        };
        debug!(%addr, locator_len = locator.len(), "requesting block batch");
        if !self.peers.send_to(
            addr,
            Message::GetBlocks(GetBlocks {
                block_header_hashes: locator,
                stop_hash: None,
            }),
        ) {
            self.heights.remove(&addr);
            return;
        }

        let deadline = tokio::time::sleep(Duration::from_secs(SYNC_BATCH_TIMEOUT_SECS));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        None => return,
                        Some(SyncEvent::BlocksReceived { addr: from, count }) if from == addr => {
                            if count == 0 {
                                // The peer has nothing beyond our locator;
                                // stop asking it for more.
                                debug!(%addr, "peer delivered an empty batch");
                                self.heights.remove(&addr);
                            }
                            return;
                        }
                        Some(event) => self.apply_event(event),
                    }
                }
                _ = &mut deadline => {
                    warn!(%addr, "block batch timed out, rotating to another peer");
                    self.heights.remove(&addr);
                    return;
                }
            }
        }
    }

    fn apply_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::PeerHeight { addr, height } => {
                self.heights.insert(addr, height);
            }
            SyncEvent::PeerDisconnected { addr } => {
                self.heights.remove(&addr);
            }
            SyncEvent::BlocksReceived { .. } => {}
        }
    }

    /// The most advanced peer claiming more blocks than `local`.
    fn best_peer_above(&self, local: Height) -> Option<(SocketAddr, Height)> {
        self.heights
            .iter()
            .filter(|(_, height)| **height > local)
            .max_by_key(|(_, height)| **height)
            .map(|(addr, height)| (*addr, *height))
    }

    fn publish_progress(&self, local: Height, target: Height) {
        let percent = f64::from(local.0) / f64::from(target.0.max(1)) * 100.0;
        let _ = self.progress.send(percent.min(100.0));
    }
}
