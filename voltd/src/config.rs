//! Daemon configuration, loaded from a TOML file with every key optional.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use volt_chain::parameters::Network;

/// The daemon's configuration file contents.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default, rename_all = "kebab-case")]
pub struct VoltdConfig {
    /// Which network to join.
    pub network: Network,

    /// The root directory for chain data and the peer address pool.
    pub data_dir: PathBuf,

    /// The peer-to-peer listen port.
    pub port: u16,

    /// Keep dialling until at least this many peers are connected.
    pub min_connections: usize,

    /// Never hold more than this many connections.
    pub max_connections: usize,

    /// Peer inactivity limit, in milliseconds.
    pub inactive_time: u64,

    /// Peer heartbeat interval, in milliseconds.
    pub heartbeat: u64,

    /// Username the RPC layer requires, if set.
    pub rpc_user: Option<String>,

    /// Password the RPC layer requires, if set.
    pub rpc_password: Option<String>,

    /// The port the RPC layer listens on.
    pub rpc_port: u16,

    /// Path to the wallet file consumed by the wallet layer.
    pub wallet: Option<PathBuf>,

    /// The fee per kilobyte the wallet layer attaches to payments, in whole
    /// coins.
    pub pay_tx_fee: f64,

    /// Addresses to dial at startup.
    pub initial_peers: Vec<SocketAddr>,
}

impl Default for VoltdConfig {
    fn default() -> Self {
        VoltdConfig {
            network: Network::Mainnet,
            data_dir: PathBuf::from("volt-data"),
            port: 9567,
            min_connections: 1,
            max_connections: 10,
            inactive_time: 3_600_000,
            heartbeat: 1_200_000,
            rpc_user: None,
            rpc_password: None,
            rpc_port: 3685,
            wallet: None,
            pay_tx_fee: 0.0001,
            initial_peers: Vec::new(),
        }
    }
}

impl VoltdConfig {
    /// Load from `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<VoltdConfig, crate::node::NodeError> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                Ok(toml::from_str(&contents)?)
            }
            None => Ok(VoltdConfig::default()),
        }
    }

    /// The persistence layer's slice of this configuration.
    pub fn state_config(&self) -> volt_state::Config {
        volt_state::Config {
            data_dir: self.data_dir.clone(),
        }
    }

    /// The networking stack's slice of this configuration.
    pub fn network_config(&self) -> volt_network::Config {
        volt_network::Config {
            network: self.network,
            port: self.port,
            min_connections: self.min_connections,
            max_connections: self.max_connections,
            inactive_time: self.inactive_time,
            heartbeat: self.heartbeat,
            peers_dir: self.data_dir.join(self.network.to_string()).join("peers"),
            user_agent: "/volt:0.1.0/".to_string(),
            initial_peers: self.initial_peers.clone(),
        }
    }
}
