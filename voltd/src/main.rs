//! The volt node daemon.

use std::path::PathBuf;

use tracing::{error, info};

use voltd::{Node, NodeHandle, VoltdConfig};

use volt_network::{AddressBook, PeerSet, Syncer};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match VoltdConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("failed to load configuration: {}", error);
            std::process::exit(1);
        }
    };
    info!(network = %config.network, "starting voltd");

    let (node, handle) = match Node::new(&config) {
        Ok(started) => started,
        Err(error) => {
            error!(%error, "failed to open chain state");
            std::process::exit(1);
        }
    };
    let worker = tokio::spawn(node.run());

    let network_config = config.network_config();
    let book = match AddressBook::open(&network_config.peers_dir) {
        Ok(book) => book,
        Err(error) => {
            error!(%error, "failed to open the peer address pool");
            std::process::exit(1);
        }
    };

    let (peer_set, sync_events) = PeerSet::new(network_config, handle.client(), book);
    {
        let listener = peer_set.clone();
        tokio::spawn(async move {
            if let Err(error) = listener.listen().await {
                error!(%error, "peer listener failed");
            }
        });
    }
    {
        let maintainer = peer_set.clone();
        tokio::spawn(async move { maintainer.maintain().await });
    }

    let (syncer, sync_progress) = Syncer::new(handle.client(), peer_set, sync_events);
    tokio::spawn(syncer.run());
    // The RPC layer polls this for `getSyncProgress`-style queries.
    let _sync_progress = sync_progress;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, shutting down"),
        Err(error) => error!(%error, "failed to listen for shutdown signal"),
    }

    shutdown(&handle).await;
    let _ = worker.await;
    info!("voltd stopped");
}

/// Drain the dispatch queue, flush persistence, and stop the worker.
async fn shutdown(handle: &NodeHandle) {
    if handle.shutdown().await.is_err() {
        // The worker already stopped on its own (storage failure).
    }
}
