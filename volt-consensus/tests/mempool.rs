//! Transaction pool behaviour against a live chain state.

mod common;

use std::sync::Arc;

use chrono::Utc;

use common::*;
use volt_chain::amount::COIN;
use volt_chain::block::Height;
use volt_consensus::{Admission, Mempool, TransactionError};

#[test]
fn double_spend_is_rejected_and_first_spender_stays() {
    let (_dir, mut engine) = engine();
    let a = wallet(1);
    let b = wallet(2);
    let c = wallet(3);

    let block1 = mine_child(&engine, a.pub_key_hash, b"fund");
    engine.add_block(block1.clone()).expect("funding block");
    let funding = coinbase_utxo(&block1, Height(1));

    let mut pool = Mempool::new();
    let t1 = signed_spend(&a, &[&funding], vec![pay(50 * COIN, b.pub_key_hash)]);
    let t2 = signed_spend(&a, &[&funding], vec![pay(50 * COIN, c.pub_key_hash)]);

    assert_eq!(
        pool.add_transaction(t1.clone(), engine.store()).unwrap(),
        Admission::Added
    );
    assert!(matches!(
        pool.add_transaction(t2, engine.store()),
        Err(TransactionError::DoubleSpend(_))
    ));

    // The pool holds exactly T1.
    assert_eq!(pool.len(), 1);
    assert!(pool.contains(&t1.hash()));
}

#[test]
fn zero_fee_is_admitted_negative_fee_is_not() {
    let (_dir, mut engine) = engine();
    let a = wallet(1);

    let block1 = mine_child(&engine, a.pub_key_hash, b"fund");
    engine.add_block(block1.clone()).expect("funding block");
    let funding = coinbase_utxo(&block1, Height(1));

    let mut pool = Mempool::new();

    let negative = signed_spend(&a, &[&funding], vec![pay(50 * COIN + 1, a.pub_key_hash)]);
    assert!(matches!(
        pool.add_transaction(negative, engine.store()),
        Err(TransactionError::NegativeFee)
    ));

    let zero = signed_spend(&a, &[&funding], vec![pay(50 * COIN, a.pub_key_hash)]);
    assert_eq!(
        pool.add_transaction(zero, engine.store()).unwrap(),
        Admission::Added
    );
}

#[test]
fn wrong_key_cannot_spend() {
    let (_dir, mut engine) = engine();
    let a = wallet(1);
    let mallory = wallet(9);

    let block1 = mine_child(&engine, a.pub_key_hash, b"fund");
    engine.add_block(block1.clone()).expect("funding block");
    let funding = coinbase_utxo(&block1, Height(1));

    let mut pool = Mempool::new();
    let theft = signed_spend(&mallory, &[&funding], vec![pay(50 * COIN, mallory.pub_key_hash)]);
    assert!(matches!(
        pool.add_transaction(theft, engine.store()),
        Err(TransactionError::WrongPubKey)
    ));
}

#[test]
fn orphan_is_parked_then_promoted_when_its_parent_confirms() {
    let (_dir, mut engine) = engine();
    let a = wallet(1);

    let block1 = mine_child(&engine, a.pub_key_hash, b"fund");

    // A spend of block1's coinbase, submitted before block1 itself.
    let funding = coinbase_utxo(&block1, Height(1));
    let early = signed_spend(&a, &[&funding], vec![pay(50 * COIN, a.pub_key_hash)]);

    let mut pool = Mempool::new();
    assert_eq!(
        pool.add_transaction(early.clone(), engine.store()).unwrap(),
        Admission::Orphaned
    );
    assert_eq!(pool.len(), 0);
    assert_eq!(pool.orphan_count(), 1);

    // The funding block confirms; the orphan promotes on the UTXO update.
    engine.add_block(block1).expect("funding block");
    pool.outputs_updated(engine.store());

    assert_eq!(pool.orphan_count(), 0);
    assert_eq!(pool.len(), 1);
    assert!(pool.contains(&early.hash()));
}

#[test]
fn entry_double_spent_by_a_block_is_dropped() {
    let (_dir, mut engine) = engine();
    let a = wallet(1);
    let b = wallet(2);

    let block1 = mine_child(&engine, a.pub_key_hash, b"fund");
    engine.add_block(block1.clone()).expect("funding block");
    let funding = coinbase_utxo(&block1, Height(1));

    let mut pool = Mempool::new();
    let pooled = signed_spend(&a, &[&funding], vec![pay(50 * COIN, a.pub_key_hash)]);
    pool.add_transaction(pooled.clone(), engine.store())
        .expect("admitted");

    // A block confirms a competing spend of the same output.
    let competing = signed_spend(&a, &[&funding], vec![pay(50 * COIN, b.pub_key_hash)]);
    let head = engine.chain_head();
    let block2 = mine_block(
        head.hash(),
        head.header.difficulty_threshold,
        Height(2),
        volt_chain::amount::Amount::from_units(50 * COIN),
        b.pub_key_hash,
        vec![competing],
        Utc::now(),
        b"competing",
    );
    engine.add_block(block2).expect("competing block");

    pool.outputs_updated(engine.store());
    assert!(!pool.contains(&pooled.hash()));
    assert_eq!(pool.len(), 0);
}

#[test]
fn selection_is_by_descending_fee_rate_within_budget() {
    let (_dir, mut engine) = engine();
    let a = wallet(1);

    // Three funding outputs for A.
    let mut utxos = Vec::new();
    for tag in [b"f1".as_ref(), b"f2".as_ref(), b"f3".as_ref()] {
        let block = mine_child(&engine, a.pub_key_hash, tag);
        engine.add_block(block.clone()).expect("funding block");
        utxos.push(coinbase_utxo(
            &block,
            engine.chain_head().height,
        ));
    }

    let mut pool = Mempool::new();
    // Fees: 300, 100, 200 units; sizes are equal.
    let fees = [300u64, 100, 200];
    let mut txs = Vec::new();
    for (utxo, fee) in utxos.iter().zip(fees) {
        let tx = signed_spend(&a, &[utxo], vec![pay(50 * COIN - fee, a.pub_key_hash)]);
        pool.add_transaction(tx.clone(), engine.store()).expect("admitted");
        txs.push(tx);
    }

    // The single best pick is the 300-fee transaction.
    assert_eq!(pool.pick_transaction().unwrap().hash(), txs[0].hash());

    // A budget for two transactions picks the top two by fee.
    let size = txs[0].len();
    let picked = pool.pick_transactions(size * 2 + 1);
    let hashes: Vec<_> = picked.iter().map(|tx| tx.hash()).collect();
    assert_eq!(hashes, vec![txs[0].hash(), txs[2].hash()]);
}

#[test]
fn overflow_drops_the_lowest_fee_rate_entries() {
    let (_dir, mut engine) = engine();
    let a = wallet(1);

    // Five funding outputs, five pooled spends with distinct fees.
    let mut utxos = Vec::new();
    for index in 0u8..5 {
        let block = mine_child(&engine, a.pub_key_hash, &[b'f', index]);
        engine.add_block(block.clone()).expect("funding block");
        utxos.push(coinbase_utxo(&block, engine.chain_head().height));
    }

    // Cap of four entries; overflow sheds the two cheapest.
    let mut pool = Mempool::with_limits(4, 4, 2);
    let mut txs = Vec::new();
    for (index, utxo) in utxos.iter().enumerate() {
        let fee = 100 * (index as u64 + 1);
        let tx = signed_spend(&a, &[utxo], vec![pay(50 * COIN - fee, a.pub_key_hash)]);
        pool.add_transaction(tx.clone(), engine.store()).expect("admitted");
        txs.push(tx);
    }

    assert_eq!(pool.len(), 3);
    assert!(!pool.contains(&txs[0].hash()));
    assert!(!pool.contains(&txs[1].hash()));
    for tx in &txs[2..] {
        assert!(pool.contains(&tx.hash()));
    }
}

#[test]
fn expired_entries_are_evicted() {
    let (_dir, mut engine) = engine();
    let a = wallet(1);

    let block1 = mine_child(&engine, a.pub_key_hash, b"fund");
    engine.add_block(block1.clone()).expect("funding block");
    let funding = coinbase_utxo(&block1, Height(1));

    let mut pool = Mempool::new();
    let tx = signed_spend(&a, &[&funding], vec![pay(50 * COIN, a.pub_key_hash)]);
    pool.add_transaction(tx.clone(), engine.store()).expect("admitted");

    // Just before the TTL: still pooled. Just after: gone.
    let almost = Utc::now() + chrono::Duration::seconds(volt_consensus::mempool::ENTRY_TTL_SECONDS - 60);
    pool.evict_expired(almost);
    assert!(pool.contains(&tx.hash()));

    let after = Utc::now() + chrono::Duration::seconds(volt_consensus::mempool::ENTRY_TTL_SECONDS + 60);
    pool.evict_expired(after);
    assert!(!pool.contains(&tx.hash()));
}
