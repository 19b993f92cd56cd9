//! Shared helpers for consensus tests: throwaway chain state, key material,
//! and a tiny CPU miner for the easy testnet target.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use tempdir::TempDir;

use volt_chain::amount::Amount;
use volt_chain::block::{self, merkle, Block, Header, Height};
use volt_chain::parameters::Network;
use volt_chain::transaction::Transaction;
use volt_chain::transfer::{
    pub_key_hash, CoinbaseData, Input, LockScript, OutPoint, Output, UnlockScript,
};
use volt_chain::work::difficulty::CompactDifficulty;
use volt_consensus::ChainEngine;
use volt_state::{Config, PersistenceService, Utxo};

pub struct Wallet {
    pub secret: SecretKey,
    pub public: PublicKey,
    pub pub_key_hash: [u8; 20],
}

/// A deterministic wallet from a one-byte seed.
pub fn wallet(seed: u8) -> Wallet {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[seed; 32]).expect("32 nonzero bytes form a valid key");
    let public = PublicKey::from_secret_key(&secp, &secret);
    let pub_key_hash = pub_key_hash(&public.serialize());
    Wallet {
        secret,
        public,
        pub_key_hash,
    }
}

/// A fresh testnet chain engine over a throwaway data directory.
pub fn engine() -> (TempDir, ChainEngine) {
    let dir = TempDir::new("volt-consensus").expect("temp dir");
    let config = Config {
        data_dir: dir.path().to_path_buf(),
    };
    let store = PersistenceService::open(&config, Network::Testnet).expect("store opens");
    let engine = ChainEngine::new(Network::Testnet, store).expect("engine initialises");
    (dir, engine)
}

/// Assemble and solve a block: coinbase paying `reward` to `pay_to`,
/// followed by `txs`, mined against `bits`.
pub fn mine_block(
    parent_hash: block::Hash,
    bits: CompactDifficulty,
    height: Height,
    reward: Amount,
    pay_to: [u8; 20],
    txs: Vec<Arc<Transaction>>,
    time: DateTime<Utc>,
    tag: &[u8],
) -> Arc<Block> {
    let coinbase = Transaction::new(
        1,
        vec![Input::Coinbase {
            height,
            data: CoinbaseData::new(tag.to_vec()),
        }],
        vec![Output {
            value: reward,
            lock: LockScript::SingleSignature {
                pub_key_hash: pay_to,
            },
        }],
    );

    let mut transactions = vec![Arc::new(coinbase)];
    transactions.extend(txs);

    let merkle_root: merkle::Root = transactions.iter().map(|tx| tx.hash()).collect();
    let mut header = Header::new(1, parent_hash, merkle_root, time, bits, 0);
    let target = bits.to_expanded().expect("test difficulty is valid");
    while header.hash() > target {
        header.nonce += 1;
    }

    Arc::new(Block {
        header,
        transactions,
    })
}

/// Mine an empty (coinbase-only) child of the current head.
pub fn mine_child(engine: &ChainEngine, pay_to: [u8; 20], tag: &[u8]) -> Arc<Block> {
    let head = engine.chain_head();
    let height = Height(head.height.0 + 1);
    mine_block(
        head.hash(),
        head.header.difficulty_threshold,
        height,
        volt_consensus::subsidy::block_subsidy(height, engine.network()),
        pay_to,
        Vec::new(),
        Utc::now(),
        tag,
    )
}

/// Build a signed single-signature transaction spending `inputs` (all locked
/// to `from`) into `outputs`.
pub fn signed_spend(from: &Wallet, inputs: &[&Utxo], outputs: Vec<Output>) -> Arc<Transaction> {
    let unsigned = Transaction::new(
        1,
        inputs
            .iter()
            .map(|utxo| Input::PrevOut {
                outpoint: utxo.outpoint,
                unlock: UnlockScript::default(),
            })
            .collect(),
        outputs.clone(),
    );
    let sighash = unsigned.sighash();

    let secp = Secp256k1::new();
    let message = Message::from_slice(&sighash).expect("sighash is 32 bytes");
    let signature = secp.sign_ecdsa(&message, &from.secret);
    let unlock = UnlockScript::single_signature(
        &from.public.serialize(),
        signature.serialize_der().as_ref(),
    );

    Arc::new(Transaction::new(
        1,
        inputs
            .iter()
            .map(|utxo| Input::PrevOut {
                outpoint: utxo.outpoint,
                unlock: unlock.clone(),
            })
            .collect(),
        outputs,
    ))
}

/// A payment output locked to `pay_to`.
pub fn pay(value: u64, pay_to: [u8; 20]) -> Output {
    Output {
        value: Amount::from_units(value),
        lock: LockScript::SingleSignature {
            pub_key_hash: pay_to,
        },
    }
}

/// The coinbase UTXO of `block`, as the chain engine would record it.
pub fn coinbase_utxo(block: &Block, height: Height) -> Utxo {
    let coinbase = &block.transactions[0];
    Utxo {
        outpoint: OutPoint {
            hash: coinbase.hash(),
            index: 0,
        },
        version: coinbase.version,
        height,
        from_coinbase: true,
        output: coinbase.outputs[0].clone(),
    }
}
