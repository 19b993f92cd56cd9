//! The unspent transaction output set.

use std::collections::HashMap;

use tracing::debug;

use volt_chain::block::Height;
use volt_chain::transfer::{OutPoint, Output};
use volt_chain::{SerializationError, WireDeserialize, WireDeserializeInto, WireSerialize};
use volt_serde_derive::{WireDeserialize, WireSerialize};

use crate::StateError;

/// An unspent transaction output, with the context needed to validate and
/// revert spends of it.
#[derive(Clone, Debug, Eq, PartialEq, WireSerialize, WireDeserialize)]
pub struct Utxo {
    /// The output reference `(transaction hash, output index)`.
    pub outpoint: OutPoint,
    /// The version of the transaction that created this output.
    pub version: u32,
    /// The height of the block that created this output.
    pub height: Height,
    /// Whether the creating transaction was a coinbase.
    pub from_coinbase: bool,
    /// The output itself.
    pub output: Output,
}

/// The full UTXO set, held in memory for O(1) lookups and written through to
/// its own sled tree on every change.
///
/// The write-through design is a deliberate trade-off: the set must fit in
/// memory.
pub struct UtxoSet {
    entries: HashMap<OutPoint, Utxo>,
    tree: sled::Tree,
}

impl UtxoSet {
    /// Load the persisted set into memory.
    pub fn open(tree: sled::Tree) -> Result<UtxoSet, StateError> {
        let mut entries = HashMap::new();
        for item in tree.iter() {
            let (_, value) = item?;
            let utxo: Utxo = value.as_ref().wire_deserialize_into()?;
            entries.insert(utxo.outpoint, utxo);
        }
        debug!(count = entries.len(), "loaded utxo set");
        Ok(UtxoSet { entries, tree })
    }

    /// Look up an unspent output.
    pub fn get(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.entries.get(outpoint)
    }

    /// Whether the referenced output is currently unspent.
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    /// Add an unspent output.
    pub fn insert(&mut self, utxo: Utxo) -> Result<(), StateError> {
        let key = outpoint_key(&utxo.outpoint);
        let value = utxo.wire_serialize_to_vec()?;
        self.tree.insert(key, value)?;
        self.entries.insert(utxo.outpoint, utxo);
        Ok(())
    }

    /// Remove (spend) an output, returning it so revert data can restore it.
    pub fn remove(&mut self, outpoint: &OutPoint) -> Result<Option<Utxo>, StateError> {
        self.tree.remove(outpoint_key(outpoint))?;
        Ok(self.entries.remove(outpoint))
    }

    /// The number of unspent outputs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flush the backing tree to disk.
    pub fn flush(&self) -> Result<(), StateError> {
        self.tree.flush()?;
        Ok(())
    }

    /// All outputs locked to the given public key hash. A linear scan; this
    /// serves wallet balance queries, not consensus.
    pub fn by_pub_key_hash(&self, pub_key_hash: &[u8; 20]) -> Vec<Utxo> {
        self.entries
            .values()
            .filter(|utxo| utxo.output.lock.pub_key_hash() == pub_key_hash)
            .cloned()
            .collect()
    }
}

/// `transaction hash | output index`, the persisted key of a UTXO.
fn outpoint_key(outpoint: &OutPoint) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[0..32].copy_from_slice(&outpoint.hash.0);
    key[32..36].copy_from_slice(&outpoint.index.to_le_bytes());
    key
}
