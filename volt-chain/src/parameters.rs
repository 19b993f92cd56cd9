//! Consensus parameters for each volt network, and the genesis block.

pub mod genesis;

use std::fmt;

use crate::amount::COIN;
use crate::block;
use crate::work::difficulty::CompactDifficulty;

pub use genesis::{genesis_block, genesis_hash};

/// The previous block hash for the genesis block.
///
/// The parent of the genesis block is the all-zero hash.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);

/// The networks a node can join.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// The production network.
    Mainnet,
    /// The test network.
    Testnet,
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

/// The first four bytes of every protocol message, identifying the network.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Magic(pub [u8; 4]);

impl fmt::Debug for Magic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Magic")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl From<Network> for Magic {
    fn from(network: Network) -> Magic {
        match network {
            Network::Mainnet => Magic(*b"VOLT"),
            Network::Testnet => Magic(*b"TVLT"),
        }
    }
}

/// The consensus parameters of a network.
#[derive(Clone, Debug)]
pub struct NetworkParameters {
    /// Blocks between difficulty retargets.
    pub retarget_interval: u32,
    /// Intended seconds between blocks.
    pub target_spacing: i64,
    /// Blocks between halvings of the block subsidy.
    pub halving_interval: u32,
    /// The block subsidy before the first halving, in base units.
    pub max_block_subsidy: u64,
    /// The easiest permitted target.
    pub pow_limit: CompactDifficulty,
    /// The default peer-to-peer listen port.
    pub default_port: u16,
}

const MAINNET_PARAMETERS: NetworkParameters = NetworkParameters {
    retarget_interval: 2016,
    target_spacing: 600,
    halving_interval: 210_000,
    max_block_subsidy: 50 * COIN,
    pow_limit: CompactDifficulty(0x1e00_ffff),
    default_port: 9567,
};

const TESTNET_PARAMETERS: NetworkParameters = NetworkParameters {
    retarget_interval: 2016,
    target_spacing: 600,
    halving_interval: 210_000,
    max_block_subsidy: 50 * COIN,
    pow_limit: CompactDifficulty(0x207f_ffff),
    default_port: 19567,
};

impl NetworkParameters {
    /// The parameters of the given network.
    pub fn for_network(network: Network) -> &'static NetworkParameters {
        match network {
            Network::Mainnet => &MAINNET_PARAMETERS,
            Network::Testnet => &TESTNET_PARAMETERS,
        }
    }

    /// The intended wall-clock span of a full retarget window, in seconds.
    pub fn retarget_timespan(&self) -> i64 {
        self.retarget_interval as i64 * self.target_spacing
    }
}
