//! Live handshake tests over loopback sockets, with a stub node worker.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use volt_chain::block::{self, Height};
use volt_chain::parameters::Network;
use volt_network::{
    AddressBook, BlockVerdict, ChainInfo, Config, NodeClient, NodeRequest, PeerSet, SyncEvent,
    TxVerdict,
};

/// Answers dispatch requests with empty-chain responses.
async fn stub_worker(mut requests: mpsc::Receiver<NodeRequest>) {
    while let Some(request) = requests.recv().await {
        match request {
            NodeRequest::ChainInfo(reply) => {
                let _ = reply.send(ChainInfo {
                    height: Height(0),
                    hash: block::Hash([0u8; 32]),
                });
            }
            NodeRequest::BlockLocator(reply) => {
                let _ = reply.send(Vec::new());
            }
            NodeRequest::BlocksAfterLocator { reply, .. } => {
                let _ = reply.send(Vec::new());
            }
            NodeRequest::Header(_, reply) => {
                let _ = reply.send(None);
            }
            NodeRequest::MempoolHashes(reply) => {
                let _ = reply.send(Vec::new());
            }
            NodeRequest::FilterUnknownTransactions(_, reply) => {
                let _ = reply.send(Vec::new());
            }
            NodeRequest::FetchTransactions(_, reply) => {
                let _ = reply.send(Vec::new());
            }
            NodeRequest::SubmitBlock(_, reply) => {
                let _ = reply.send(BlockVerdict::Duplicate);
            }
            NodeRequest::SubmitTransaction(_, reply) => {
                let _ = reply.send(TxVerdict::Duplicate);
            }
        }
    }
}

fn test_peer_set(network: Network) -> (PeerSet, mpsc::UnboundedReceiver<SyncEvent>) {
    let (client, requests) = NodeClient::new(16);
    tokio::spawn(stub_worker(requests));
    let book = AddressBook::open_temporary().expect("temporary book");
    let config = Config {
        network,
        ..Config::default()
    };
    PeerSet::new(config, client, book)
}

#[tokio::test]
async fn two_nodes_complete_the_handshake() {
    let (alice, mut alice_events) = test_peer_set(Network::Testnet);
    let (bob, mut bob_events) = test_peer_set(Network::Testnet);

    // Bob listens on an ephemeral loopback port; Alice dials it.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let bob_addr = listener.local_addr().expect("local addr");
    let bob_acceptor = bob.clone();
    tokio::spawn(async move {
        if let Ok((stream, addr)) = listener.accept().await {
            bob_acceptor.accept(stream, addr);
        }
    });

    alice.dial(bob_addr).await;

    // Each side learns the other's best height from its Version, which only
    // happens once the handshake state machine accepted it.
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        let mut alice_saw_version = false;
        let mut bob_saw_version = false;
        while !(alice_saw_version && bob_saw_version) {
            tokio::select! {
                event = alice_events.recv() => {
                    if let Some(SyncEvent::PeerHeight { .. }) = event {
                        alice_saw_version = true;
                    }
                }
                event = bob_events.recv() => {
                    if let Some(SyncEvent::PeerHeight { .. }) = event {
                        bob_saw_version = true;
                    }
                }
            }
        }
    })
    .await;

    assert!(waited.is_ok(), "handshake did not complete within 5 seconds");
    assert_eq!(alice.peer_count(), 1);
    assert_eq!(bob.peer_count(), 1);
}

#[tokio::test]
async fn dialling_yourself_disconnects_without_completing() {
    let (alice, mut events) = test_peer_set(Network::Testnet);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let self_addr = listener.local_addr().expect("local addr");
    let acceptor = alice.clone();
    tokio::spawn(async move {
        if let Ok((stream, addr)) = listener.accept().await {
            acceptor.accept(stream, addr);
        }
    });

    alice.dial(self_addr).await;

    // Both half-connections notice the matching nonce and drop; no
    // handshake ever completes.
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        let mut disconnects = 0;
        while disconnects < 2 {
            match events.recv().await {
                Some(SyncEvent::PeerHeight { .. }) => {
                    panic!("a self-connection must never complete its handshake")
                }
                Some(SyncEvent::PeerDisconnected { .. }) => disconnects += 1,
                Some(_) => {}
                None => break,
            }
        }
    })
    .await;

    assert!(waited.is_ok(), "self-connection was not torn down in time");
    assert_eq!(alice.peer_count(), 0);
}

#[tokio::test]
async fn mismatched_networks_never_handshake() {
    let (mainnet, mut events) = test_peer_set(Network::Mainnet);
    let (testnet, _testnet_events) = test_peer_set(Network::Testnet);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let acceptor = testnet.clone();
    tokio::spawn(async move {
        if let Ok((stream, addr)) = listener.accept().await {
            acceptor.accept(stream, addr);
        }
    });

    mainnet.dial(addr).await;

    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(SyncEvent::PeerHeight { .. }) => {
                    panic!("peers on different networks must not handshake")
                }
                Some(SyncEvent::PeerDisconnected { .. }) | None => break,
                Some(_) => {}
            }
        }
    })
    .await;
    assert!(waited.is_ok(), "mismatched magic was not rejected in time");
}
