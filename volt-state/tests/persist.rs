//! End-to-end checks of the persistence façade.

use tempdir::TempDir;

use volt_chain::amount::Amount;
use volt_chain::block::Height;
use volt_chain::parameters::{genesis_block, Network};
use volt_chain::transfer::{LockScript, OutPoint, Output};
use volt_state::{BlockStatus, Config, PersistenceService, Utxo};

fn service_in(dir: &TempDir) -> PersistenceService {
    let config = Config {
        data_dir: dir.path().to_path_buf(),
    };
    PersistenceService::open(&config, Network::Testnet).expect("store opens")
}

fn genesis_utxo() -> Utxo {
    let genesis = genesis_block(Network::Testnet);
    let coinbase = &genesis.transactions[0];
    Utxo {
        outpoint: OutPoint {
            hash: coinbase.hash(),
            index: 0,
        },
        version: coinbase.version,
        height: Height(0),
        from_coinbase: true,
        output: coinbase.outputs[0].clone(),
    }
}

#[test]
fn persist_block_and_read_it_back() {
    let dir = TempDir::new("volt-state").unwrap();
    let mut service = service_in(&dir);

    let genesis = genesis_block(Network::Testnet);
    let work = genesis
        .header
        .difficulty_threshold
        .to_work()
        .unwrap()
        .value();
    let meta = service
        .persist_block(&genesis, Height(0), work, BlockStatus::MainChain, Vec::new())
        .unwrap();
    service.set_chain_head(genesis.hash()).unwrap();

    assert_eq!(meta.height, Height(0));
    assert_eq!(meta.transaction_count, 1);

    let read_back = service.get_block(&genesis.hash()).unwrap().unwrap();
    assert_eq!(read_back.as_ref(), genesis.as_ref());

    let head = service.get_chain_head().unwrap();
    assert_eq!(head.hash(), genesis.hash());
    assert_eq!(service.hash_at_height(Height(0)), Some(genesis.hash()));

    // Transactions are indexed individually.
    let coinbase = &genesis.transactions[0];
    let stored = service.get_transaction(&coinbase.hash()).unwrap().unwrap();
    assert_eq!(stored.as_ref(), coinbase.as_ref());
    let tx_meta = service.get_transaction_metadata(&coinbase.hash()).unwrap();
    assert_eq!(tx_meta.block_hash, genesis.hash());
    assert_eq!(tx_meta.position, 0);
}

#[test]
fn utxo_set_is_write_through_and_reloads() {
    let dir = TempDir::new("volt-state").unwrap();
    let utxo = genesis_utxo();

    {
        let mut service = service_in(&dir);
        service.add_unspent_output(utxo.clone()).unwrap();
        assert!(service.get_unspent_output(&utxo.outpoint).is_some());
        service.flush().unwrap();
    }

    // A new service instance sees the same set after a cold start.
    let mut service = service_in(&dir);
    assert_eq!(service.unspent_output_count(), 1);
    assert_eq!(service.get_unspent_output(&utxo.outpoint), Some(&utxo));

    let removed = service.remove_unspent_output(&utxo.outpoint).unwrap();
    assert_eq!(removed, Some(utxo));
    assert_eq!(service.unspent_output_count(), 0);
}

#[test]
fn address_scan_finds_only_matching_locks() {
    let dir = TempDir::new("volt-state").unwrap();
    let mut service = service_in(&dir);

    let mut mine = genesis_utxo();
    mine.output = Output {
        value: Amount::from_units(10),
        lock: LockScript::SingleSignature {
            pub_key_hash: [0xaa; 20],
        },
    };
    let mut theirs = genesis_utxo();
    theirs.outpoint.index = 1;
    theirs.output = Output {
        value: Amount::from_units(20),
        lock: LockScript::SingleSignature {
            pub_key_hash: [0xbb; 20],
        },
    };

    service.add_unspent_output(mine.clone()).unwrap();
    service.add_unspent_output(theirs).unwrap();

    let found = service.get_unspent_outputs_for_address(&[0xaa; 20]);
    assert_eq!(found, vec![mine]);
}

#[test]
fn revert_data_round_trips_through_the_revert_store() {
    let dir = TempDir::new("volt-state").unwrap();
    let mut service = service_in(&dir);

    let genesis = genesis_block(Network::Testnet);
    let spent = vec![genesis_utxo()];
    service
        .persist_block(&genesis, Height(0), 1, BlockStatus::MainChain, spent.clone())
        .unwrap();

    let meta = service.get_block_metadata(&genesis.hash()).unwrap().clone();
    let revert = service.get_revert_data(&meta).unwrap();
    assert_eq!(revert.spent, spent);
}
