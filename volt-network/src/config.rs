use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use volt_chain::parameters::Network;

/// Configuration for the networking stack.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Which network to join.
    pub network: Network,

    /// The port to listen on for inbound peers.
    pub port: u16,

    /// Keep dialling until at least this many peers are connected.
    pub min_connections: usize,

    /// Never hold more than this many connections.
    pub max_connections: usize,

    /// Disconnect a peer that has sent nothing for this long, in
    /// milliseconds.
    pub inactive_time: u64,

    /// Ping interval, in milliseconds. A peer that misses two heartbeats is
    /// disconnected.
    pub heartbeat: u64,

    /// Where the persistent address pool lives.
    pub peers_dir: PathBuf,

    /// The user agent advertised in handshakes.
    pub user_agent: String,

    /// Addresses to dial at startup, before the address pool has content.
    pub initial_peers: Vec<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network: Network::Mainnet,
            port: 9567,
            min_connections: 1,
            max_connections: 10,
            inactive_time: 3_600_000,
            heartbeat: 1_200_000,
            peers_dir: PathBuf::from("volt-data").join("peers"),
            user_agent: "/volt:0.1.0/".to_string(),
            initial_peers: Vec::new(),
        }
    }
}
