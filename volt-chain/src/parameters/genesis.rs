//! Genesis blocks for each volt network.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use lazy_static::lazy_static;

use crate::amount::Amount;
use crate::block::{merkle, Block, Header, Height};
use crate::transaction::Transaction;
use crate::transfer::{CoinbaseData, Input, LockScript, Output};
use crate::block;

use super::{Network, NetworkParameters, GENESIS_PREVIOUS_BLOCK_HASH};

/// The fixed timestamp of both genesis blocks: 2024-01-01 00:00:00 UTC.
const GENESIS_TIMESTAMP: i64 = 1_704_067_200;

lazy_static! {
    static ref MAINNET_GENESIS: Arc<Block> =
        build_genesis(Network::Mainnet, b"volt mainnet genesis".to_vec());
    static ref TESTNET_GENESIS: Arc<Block> =
        build_genesis(Network::Testnet, b"volt testnet genesis".to_vec());
}

fn build_genesis(network: Network, tag: Vec<u8>) -> Arc<Block> {
    let coinbase = Transaction::new(
        1,
        vec![Input::Coinbase {
            height: Height(0),
            data: CoinbaseData::new(tag),
        }],
        vec![Output {
            value: Amount::from_units(NetworkParameters::for_network(network).max_block_subsidy),
            // The genesis subsidy pays to the unspendable all-zero key hash.
            lock: LockScript::SingleSignature {
                pub_key_hash: [0u8; 20],
            },
        }],
    );
    let merkle_root: merkle::Root = std::iter::once(coinbase.hash()).collect();
    let time = Utc
        .timestamp_opt(GENESIS_TIMESTAMP, 0)
        .single()
        .expect("hard-coded genesis timestamp is valid");
    let header = Header::new(
        1,
        GENESIS_PREVIOUS_BLOCK_HASH,
        merkle_root,
        time,
        NetworkParameters::for_network(network).pow_limit,
        0,
    );
    Arc::new(Block {
        header,
        transactions: vec![Arc::new(coinbase)],
    })
}

/// Returns the genesis block of `network`.
pub fn genesis_block(network: Network) -> Arc<Block> {
    match network {
        Network::Mainnet => MAINNET_GENESIS.clone(),
        Network::Testnet => TESTNET_GENESIS.clone(),
    }
}

/// Returns the hash of the genesis block of `network`.
pub fn genesis_hash(network: Network) -> block::Hash {
    genesis_block(network).hash()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_height_zero_coinbase_only() {
        for network in [Network::Mainnet, Network::Testnet] {
            let genesis = genesis_block(network);
            assert_eq!(genesis.coinbase_height(), Some(Height(0)));
            assert_eq!(genesis.transactions.len(), 1);
            assert!(genesis.transactions[0].is_coinbase());
            assert_eq!(
                genesis.header.previous_block_hash,
                GENESIS_PREVIOUS_BLOCK_HASH
            );
        }
    }

    #[test]
    fn networks_have_distinct_genesis_hashes() {
        assert_ne!(genesis_hash(Network::Mainnet), genesis_hash(Network::Testnet));
    }

    #[test]
    fn genesis_merkle_root_matches_coinbase() {
        let genesis = genesis_block(Network::Mainnet);
        let root: merkle::Root =
            std::iter::once(genesis.transactions[0].hash()).collect();
        assert_eq!(genesis.header.merkle_root, root);
    }
}
