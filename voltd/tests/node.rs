//! Supervisor wiring: blocks and transactions flow through the dispatch
//! worker, and the pool tracks chain mutations.

use std::sync::Arc;

use chrono::Utc;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use tempdir::TempDir;

use volt_chain::amount::{Amount, COIN};
use volt_chain::block::{self, merkle, Block, Header, Height};
use volt_chain::parameters::Network;
use volt_chain::transaction::Transaction;
use volt_chain::transfer::{
    pub_key_hash, CoinbaseData, Input, LockScript, OutPoint, Output, UnlockScript,
};
use volt_chain::work::difficulty::CompactDifficulty;
use volt_network::{BlockVerdict, TxVerdict};
use voltd::{Node, NodeHandle, VoltdConfig};

struct Wallet {
    secret: SecretKey,
    public: PublicKey,
    hash: [u8; 20],
}

fn wallet(seed: u8) -> Wallet {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[seed; 32]).expect("valid key");
    let public = PublicKey::from_secret_key(&secp, &secret);
    let hash = pub_key_hash(&public.serialize());
    Wallet {
        secret,
        public,
        hash,
    }
}

fn start_node(dir: &TempDir) -> NodeHandle {
    let config = VoltdConfig {
        network: Network::Testnet,
        data_dir: dir.path().to_path_buf(),
        ..VoltdConfig::default()
    };
    let (node, handle) = Node::new(&config).expect("node opens");
    tokio::spawn(node.run());
    handle
}

fn mine_block(
    parent: block::Hash,
    bits: CompactDifficulty,
    height: Height,
    pay_to: [u8; 20],
    txs: Vec<Arc<Transaction>>,
    tag: &[u8],
) -> Arc<Block> {
    let coinbase = Transaction::new(
        1,
        vec![Input::Coinbase {
            height,
            data: CoinbaseData::new(tag.to_vec()),
        }],
        vec![Output {
            value: Amount::from_units(50 * COIN),
            lock: LockScript::SingleSignature {
                pub_key_hash: pay_to,
            },
        }],
    );
    let mut transactions = vec![Arc::new(coinbase)];
    transactions.extend(txs);

    let merkle_root: merkle::Root = transactions.iter().map(|tx| tx.hash()).collect();
    let mut header = Header::new(1, parent, merkle_root, Utc::now(), bits, 0);
    let target = bits.to_expanded().expect("valid bits");
    while header.hash() > target {
        header.nonce += 1;
    }
    Arc::new(Block {
        header,
        transactions,
    })
}

fn signed_spend(from: &Wallet, outpoint: OutPoint, outputs: Vec<Output>) -> Arc<Transaction> {
    let unsigned = Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint,
            unlock: UnlockScript::default(),
        }],
        outputs.clone(),
    );
    let secp = Secp256k1::new();
    let message = Message::from_slice(&unsigned.sighash()).expect("32-byte sighash");
    let signature = secp.sign_ecdsa(&message, &from.secret);
    let unlock = UnlockScript::single_signature(
        &from.public.serialize(),
        signature.serialize_der().as_ref(),
    );
    Arc::new(Transaction::new(
        1,
        vec![Input::PrevOut { outpoint, unlock }],
        outputs,
    ))
}

fn pay(value: u64, to: [u8; 20]) -> Output {
    Output {
        value: Amount::from_units(value),
        lock: LockScript::SingleSignature { pub_key_hash: to },
    }
}

#[tokio::test]
async fn blocks_flow_through_the_dispatch_worker() {
    let dir = TempDir::new("voltd").unwrap();
    let handle = start_node(&dir);

    let a = wallet(1);
    let genesis_hash = handle.chain_head_hash().await.unwrap();
    let bits = volt_chain::parameters::genesis_block(Network::Testnet)
        .header
        .difficulty_threshold;

    let block1 = mine_block(genesis_hash, bits, Height(1), a.hash, vec![], b"one");
    assert_eq!(
        handle.submit_block(block1.clone()).await.unwrap(),
        BlockVerdict::Connected
    );
    assert_eq!(handle.chain_height().await.unwrap(), Height(1));
    assert_eq!(handle.chain_head_hash().await.unwrap(), block1.hash());

    // Resubmission is a silent duplicate.
    assert_eq!(
        handle.submit_block(block1.clone()).await.unwrap(),
        BlockVerdict::Duplicate
    );

    // The stored block is served back.
    let stored = handle.get_block(block1.hash()).await.unwrap().unwrap();
    assert_eq!(stored.hash(), block1.hash());
}

#[tokio::test]
async fn reorg_returns_disconnected_transactions_to_the_pool() {
    let dir = TempDir::new("voltd").unwrap();
    let handle = start_node(&dir);

    let a = wallet(1);
    let b = wallet(2);
    let miner = wallet(3);

    let genesis_hash = handle.chain_head_hash().await.unwrap();
    let bits = volt_chain::parameters::genesis_block(Network::Testnet)
        .header
        .difficulty_threshold;

    // Fund A, then let A pay B through the pool.
    let block1 = mine_block(genesis_hash, bits, Height(1), a.hash, vec![], b"fund");
    handle.submit_block(block1.clone()).await.unwrap();

    let funding = OutPoint {
        hash: block1.transactions[0].hash(),
        index: 0,
    };
    let payment = signed_spend(
        &a,
        funding,
        vec![pay(20 * COIN, b.hash), pay(30 * COIN, a.hash)],
    );
    assert_eq!(
        handle.submit_transaction(payment.clone()).await.unwrap(),
        TxVerdict::Added
    );
    assert_eq!(handle.transaction_pool_count().await.unwrap(), 1);

    // Mining the payment empties the pool.
    let block2 = mine_block(
        block1.hash(),
        bits,
        Height(2),
        miner.hash,
        vec![payment.clone()],
        b"mined",
    );
    assert_eq!(
        handle.submit_block(block2).await.unwrap(),
        BlockVerdict::Connected
    );
    assert_eq!(handle.transaction_pool_count().await.unwrap(), 0);

    // A longer competing branch from block1 reorganises block2 away; the
    // payment is still spendable on the new chain, so it returns to the pool.
    let r2 = mine_block(block1.hash(), bits, Height(2), miner.hash, vec![], b"r2");
    let r3 = mine_block(r2.hash(), bits, Height(3), miner.hash, vec![], b"r3");
    assert_eq!(
        handle.submit_block(r2.clone()).await.unwrap(),
        BlockVerdict::SideChained
    );
    assert_eq!(
        handle.submit_block(r3.clone()).await.unwrap(),
        BlockVerdict::Connected
    );

    assert_eq!(handle.chain_head_hash().await.unwrap(), r3.hash());
    assert_eq!(handle.transaction_pool_count().await.unwrap(), 1);
    let pending = handle.pending_transactions().await.unwrap();
    assert_eq!(pending[0].hash(), payment.hash());
}

#[tokio::test]
async fn template_and_submission_close_the_mining_loop() {
    let dir = TempDir::new("voltd").unwrap();
    let handle = start_node(&dir);
    let miner = wallet(7);

    let template = handle
        .block_template(miner.hash, b"voltd test".to_vec())
        .await
        .unwrap();
    assert_eq!(template.coinbase_height(), Some(Height(1)));

    let mut block = template;
    let target = block
        .header
        .difficulty_threshold
        .to_expanded()
        .expect("valid target");
    while block.header.hash() > target {
        block.header.nonce += 1;
    }

    assert_eq!(
        handle.submit_block(Arc::new(block)).await.unwrap(),
        BlockVerdict::Connected
    );
    assert_eq!(handle.chain_height().await.unwrap(), Height(1));
}
