//! The pool of unconfirmed transactions.
//!
//! Admission enforces double-spend safety against both the persisted UTXO
//! set and the other pool entries; transactions referencing unknown outputs
//! wait in a secondary orphan pool. Selection is by fee per byte.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use volt_chain::amount::Amount;
use volt_chain::transaction::{self, Transaction};
use volt_chain::transfer::OutPoint;
use volt_state::PersistenceService;

use crate::error::TransactionError;
use crate::transaction::check as tx_check;

/// The main pool holds at most this many entries.
pub const MAX_POOL_ENTRIES: usize = 20_000;

/// The orphan pool holds at most this many entries.
pub const MAX_ORPHAN_ENTRIES: usize = 10_000;

/// How many entries an overflowing pool sheds at once.
const OVERFLOW_EVICTION: usize = 1_000;

/// Entries older than this many seconds are evicted unconfirmed.
pub const ENTRY_TTL_SECONDS: i64 = 24 * 60 * 60;

/// A pooled transaction with its admission bookkeeping.
#[derive(Clone, Debug)]
pub struct PoolEntry {
    /// The transaction itself.
    pub transaction: Arc<Transaction>,
    /// Its fee: inputs minus outputs. Zero for orphans, whose inputs cannot
    /// be valued yet.
    pub fee: Amount,
    /// Its serialized size in bytes.
    pub size: usize,
    /// When it entered the pool.
    pub admitted_at: DateTime<Utc>,
}

impl PoolEntry {
    /// Fee per byte, scaled by 1000 so integer ordering keeps sub-unit
    /// precision.
    pub fn fee_rate(&self) -> u128 {
        u128::from(self.fee.value()) * 1000 / self.size.max(1) as u128
    }
}

/// How an admission ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// The transaction entered the main pool.
    Added,
    /// An input references an output we have never seen; the transaction
    /// waits in the orphan pool.
    Orphaned,
}

/// Observer of successful pool admissions (the network layer relays these).
pub trait TransactionListener: Send {
    /// `transaction` just entered the main pool.
    fn transaction_added(&mut self, transaction: &Arc<Transaction>);
}

/// The transaction pool.
pub struct Mempool {
    entries: HashMap<transaction::Hash, PoolEntry>,
    /// Which pool entry spends each outpoint, for double-spend detection.
    spent_outpoints: HashMap<OutPoint, transaction::Hash>,
    orphans: HashMap<transaction::Hash, PoolEntry>,
    listeners: Vec<Box<dyn TransactionListener>>,
    max_entries: usize,
    max_orphans: usize,
    overflow_eviction: usize,
}

impl Mempool {
    /// An empty pool with the standard limits.
    pub fn new() -> Mempool {
        Mempool::with_limits(MAX_POOL_ENTRIES, MAX_ORPHAN_ENTRIES, OVERFLOW_EVICTION)
    }

    /// An empty pool with custom limits.
    pub fn with_limits(max_entries: usize, max_orphans: usize, overflow_eviction: usize) -> Mempool {
        Mempool {
            entries: HashMap::new(),
            spent_outpoints: HashMap::new(),
            orphans: HashMap::new(),
            listeners: Vec::new(),
            max_entries,
            max_orphans,
            overflow_eviction,
        }
    }

    /// Register an observer of admissions.
    pub fn register_listener(&mut self, listener: Box<dyn TransactionListener>) {
        self.listeners.push(listener);
    }

    /// Admit a transaction.
    ///
    /// Rejects duplicates, coinbases, double spends (against the UTXO set
    /// and against other pool entries), bad signatures, and negative fees.
    /// A transaction whose inputs reference outputs we have never seen is
    /// parked in the orphan pool instead.
    pub fn add_transaction(
        &mut self,
        transaction: Arc<Transaction>,
        store: &PersistenceService,
    ) -> Result<Admission, TransactionError> {
        let hash = transaction.hash();

        if self.entries.contains_key(&hash)
            || self.orphans.contains_key(&hash)
            || store.contains_transaction(&hash)
        {
            return Err(TransactionError::Duplicate);
        }
        if transaction.is_coinbase() {
            return Err(TransactionError::CoinbaseInPool);
        }
        tx_check::has_inputs_and_outputs(&transaction)?;

        let mut input_sum = Amount::zero();
        let mut missing_parent = false;
        for input in &transaction.inputs {
            let outpoint = tx_check::spent_outpoint(input)?;
            if self.spent_outpoints.contains_key(&outpoint) {
                return Err(TransactionError::DoubleSpend(outpoint));
            }
            match store.get_unspent_output(&outpoint) {
                Some(utxo) => {
                    tx_check::spend_is_authorized(&transaction, input, utxo)?;
                    input_sum = input_sum.checked_add(utxo.output.value)?;
                }
                None if store.contains_transaction(&outpoint.hash) => {
                    // The referenced transaction is confirmed but its output
                    // is gone: something already spent it.
                    return Err(TransactionError::DoubleSpend(outpoint));
                }
                None => missing_parent = true,
            }
        }

        let size = transaction.len();
        if missing_parent {
            debug!(%hash, "transaction references unknown outputs, parked as orphan");
            self.orphans.insert(
                hash,
                PoolEntry {
                    transaction,
                    fee: Amount::zero(),
                    size,
                    admitted_at: Utc::now(),
                },
            );
            self.enforce_orphan_cap();
            return Ok(Admission::Orphaned);
        }

        let fee = tx_check::transaction_fee(input_sum, &transaction)?;
        for input in &transaction.inputs {
            if let Some(outpoint) = input.outpoint() {
                self.spent_outpoints.insert(outpoint, hash);
            }
        }
        self.entries.insert(
            hash,
            PoolEntry {
                transaction: transaction.clone(),
                fee,
                size,
                admitted_at: Utc::now(),
            },
        );
        self.enforce_entry_cap();

        for listener in &mut self.listeners {
            listener.transaction_added(&transaction);
        }
        debug!(%hash, fee = fee.value(), "admitted transaction");
        Ok(Admission::Added)
    }

    /// The single entry with the highest fee per byte.
    pub fn pick_transaction(&self) -> Option<Arc<Transaction>> {
        self.entries
            .values()
            .max_by_key(|entry| entry.fee_rate())
            .map(|entry| entry.transaction.clone())
    }

    /// Entries in descending fee-per-byte order that fit `byte_budget`,
    /// walked with an explicit cursor so a skipped entry is never
    /// reconsidered.
    pub fn pick_entries(&self, byte_budget: usize) -> Vec<PoolEntry> {
        let mut candidates: Vec<&PoolEntry> = self.entries.values().collect();
        candidates.sort_by(|a, b| b.fee_rate().cmp(&a.fee_rate()));

        let mut remaining = byte_budget;
        let mut picked = Vec::new();
        for entry in candidates {
            if entry.size <= remaining {
                remaining -= entry.size;
                picked.push(entry.clone());
            }
        }
        picked
    }

    /// Like [`Mempool::pick_entries`], returning just the transactions.
    pub fn pick_transactions(&self, byte_budget: usize) -> Vec<Arc<Transaction>> {
        self.pick_entries(byte_budget)
            .into_iter()
            .map(|entry| entry.transaction)
            .collect()
    }

    /// Drop a transaction (typically because a block confirmed it).
    pub fn remove_transaction(&mut self, hash: &transaction::Hash) -> Option<PoolEntry> {
        self.orphans.remove(hash);
        self.remove_entry(hash)
    }

    /// React to a committed UTXO delta: promote orphans whose inputs are
    /// now resolvable, then drop entries the new state double-spends and
    /// demote entries the new state orphaned.
    pub fn outputs_updated(&mut self, store: &PersistenceService) {
        // Orphans first, so a freshly resolvable chain of spends settles in
        // one pass.
        let orphan_hashes: Vec<_> = self.orphans.keys().copied().collect();
        for hash in orphan_hashes {
            let resolvable = self
                .orphans
                .get(&hash)
                .map(|entry| {
                    entry.transaction.inputs.iter().all(|input| {
                        input
                            .outpoint()
                            .map(|outpoint| store.get_unspent_output(&outpoint).is_some())
                            .unwrap_or(false)
                    })
                })
                .unwrap_or(false);
            if resolvable {
                if let Some(entry) = self.orphans.remove(&hash) {
                    match self.add_transaction(entry.transaction, store) {
                        Ok(_) => debug!(%hash, "promoted orphan transaction"),
                        Err(error) => debug!(%hash, %error, "dropped unpromotable orphan"),
                    }
                }
            }
        }

        enum Verdict {
            Keep,
            DoubleSpent,
            Orphaned,
        }

        let entry_hashes: Vec<_> = self.entries.keys().copied().collect();
        for hash in entry_hashes {
            let verdict = {
                let entry = match self.entries.get(&hash) {
                    Some(entry) => entry,
                    None => continue,
                };
                let mut verdict = Verdict::Keep;
                for input in &entry.transaction.inputs {
                    let outpoint = match input.outpoint() {
                        Some(outpoint) => outpoint,
                        None => continue,
                    };
                    if store.get_unspent_output(&outpoint).is_some() {
                        continue;
                    }
                    if store.contains_transaction(&outpoint.hash) {
                        verdict = Verdict::DoubleSpent;
                        break;
                    }
                    verdict = Verdict::Orphaned;
                }
                verdict
            };

            match verdict {
                Verdict::Keep => {}
                Verdict::DoubleSpent => {
                    self.remove_entry(&hash);
                    debug!(%hash, "dropped transaction double-spent by the chain");
                }
                Verdict::Orphaned => {
                    if let Some(entry) = self.remove_entry(&hash) {
                        debug!(%hash, "demoted transaction to orphan pool");
                        self.orphans.insert(hash, entry);
                        self.enforce_orphan_cap();
                    }
                }
            }
        }
    }

    /// Evict entries older than [`ENTRY_TTL_SECONDS`] as of `now`.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(ENTRY_TTL_SECONDS);
        let expired: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.admitted_at < cutoff)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &expired {
            self.remove_entry(hash);
        }
        self.orphans.retain(|_, entry| entry.admitted_at >= cutoff);
        if !expired.is_empty() {
            debug!(count = expired.len(), "evicted expired pool entries");
        }
    }

    /// Whether the pool (main or orphan) holds this transaction.
    pub fn contains(&self, hash: &transaction::Hash) -> bool {
        self.entries.contains_key(hash) || self.orphans.contains_key(hash)
    }

    /// A pooled transaction by hash.
    pub fn get(&self, hash: &transaction::Hash) -> Option<Arc<Transaction>> {
        self.entries
            .get(hash)
            .or_else(|| self.orphans.get(hash))
            .map(|entry| entry.transaction.clone())
    }

    /// The hashes of every main-pool entry.
    pub fn known_hashes(&self) -> Vec<transaction::Hash> {
        self.entries.keys().copied().collect()
    }

    /// Every main-pool transaction.
    pub fn pending_transactions(&self) -> Vec<Arc<Transaction>> {
        self.entries
            .values()
            .map(|entry| entry.transaction.clone())
            .collect()
    }

    /// The number of main-pool entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the main pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of orphans.
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    fn remove_entry(&mut self, hash: &transaction::Hash) -> Option<PoolEntry> {
        let entry = self.entries.remove(hash)?;
        for input in &entry.transaction.inputs {
            if let Some(outpoint) = input.outpoint() {
                if self.spent_outpoints.get(&outpoint) == Some(hash) {
                    self.spent_outpoints.remove(&outpoint);
                }
            }
        }
        Some(entry)
    }

    fn enforce_entry_cap(&mut self) {
        if self.entries.len() <= self.max_entries {
            return;
        }
        let mut ranked: Vec<(u128, transaction::Hash)> = self
            .entries
            .iter()
            .map(|(hash, entry)| (entry.fee_rate(), *hash))
            .collect();
        ranked.sort();
        let victims: Vec<_> = ranked
            .into_iter()
            .take(self.overflow_eviction)
            .map(|(_, hash)| hash)
            .collect();
        for hash in &victims {
            self.remove_entry(hash);
        }
        warn!(evicted = victims.len(), "transaction pool overflowed");
    }

    fn enforce_orphan_cap(&mut self) {
        if self.orphans.len() <= self.max_orphans {
            return;
        }
        let mut ranked: Vec<(DateTime<Utc>, transaction::Hash)> = self
            .orphans
            .iter()
            .map(|(hash, entry)| (entry.admitted_at, *hash))
            .collect();
        ranked.sort();
        for (_, hash) in ranked.into_iter().take(self.overflow_eviction) {
            self.orphans.remove(&hash);
        }
        warn!("orphan pool overflowed, dropped oldest entries");
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Mempool::new()
    }
}
