use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use volt_chain::parameters::Network;

/// Configuration for the persistence layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The root directory for all stored chain data. Each network gets its
    /// own subdirectory, so mainnet and testnet state never mix.
    pub data_dir: PathBuf,
}

impl Config {
    /// The directory holding this network's data.
    pub fn network_dir(&self, network: Network) -> PathBuf {
        self.data_dir.join(network.to_string())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("volt-data"),
        }
    }
}
