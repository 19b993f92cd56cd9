//! Revert data: what a block consumed, so applying it can be undone.

use volt_chain::{SerializationError, WireDeserialize, WireSerialize};
use volt_serde_derive::{WireDeserialize, WireSerialize};

use crate::utxo::Utxo;

/// The ordered list of outputs a block spends.
///
/// Each entry is a whole [`Utxo`], so a revert restores the original
/// `(version, height, from_coinbase)` context, not just the amount and lock.
#[derive(Clone, Debug, Default, Eq, PartialEq, WireSerialize, WireDeserialize)]
pub struct RevertData {
    /// The spent outputs, in the order the block's transactions consumed them.
    pub spent: Vec<Utxo>,
}
