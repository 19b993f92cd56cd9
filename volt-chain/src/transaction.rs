//! Transactions and transaction-related structures.

use crate::compactint::CompactInt;
use crate::serialization::sha256d;
use crate::{cached::Cached, SerializationError, WireDeserialize, WireSerialize};
use volt_serde_derive::WireSerialize;

mod hash;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;
#[cfg(test)]
mod tests;

pub use hash::Hash;

use crate::transfer;

/// A volt transaction.
///
/// A transaction is an encoded data structure that facilitates the transfer of
/// value between two public key addresses. Everything is designed to ensure
/// that transactions can be created, propagated on the network, validated, and
/// finally added to the global ledger of transactions (the blockchain).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, WireSerialize)]
pub struct Transaction {
    /// The transaction version.
    pub version: u32,
    /// The transaction inputs.
    pub inputs: Vec<transfer::Input>,
    /// The transaction outputs.
    pub outputs: Vec<transfer::Output>,
    hash: Cached<Hash>,
}

impl Transaction {
    /// Assemble a transaction. The hash cache starts empty.
    pub fn new(
        version: u32,
        inputs: Vec<transfer::Input>,
        outputs: Vec<transfer::Output>,
    ) -> Transaction {
        Transaction {
            version,
            inputs,
            outputs,
            hash: Cached::new(),
        }
    }

    /// Get the hash of this transaction.
    pub fn hash(&self) -> Hash {
        // If we have a cached version, just return that
        if let Some(hash) = self.hash.get() {
            return hash;
        }
        // Otherwise, serialize the tx to calculate and return the hash
        Hash::from(self)
    }

    /// Whether any input of this transaction is a coinbase input.
    pub fn contains_coinbase_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|input| matches!(input, transfer::Input::Coinbase { .. }))
    }

    /// Returns `true` if this transaction is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && matches!(self.inputs.get(0), Some(transfer::Input::Coinbase { .. }))
    }

    /// Returns the serialized length (in bytes) of this transaction.
    pub fn len(&self) -> usize {
        let mut size = 4 + CompactInt::size(self.inputs.len());
        for input in self.inputs.iter() {
            size += input.len();
        }
        size += CompactInt::size(self.outputs.len());
        for output in self.outputs.iter() {
            size += output.len();
        }
        size
    }

    /// Whether the transaction has neither inputs nor outputs.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    /// The digest that spend signatures commit to: the SHA256d hash of this
    /// transaction serialized with every input's unlock script emptied.
    ///
    /// One signature therefore covers all inputs and all outputs.
    pub fn sighash(&self) -> [u8; 32] {
        let stripped = Transaction {
            version: self.version,
            inputs: self.inputs.iter().map(transfer::Input::without_unlock).collect(),
            outputs: self.outputs.clone(),
            hash: Cached::new(),
        };
        let bytes = stripped
            .wire_serialize_to_vec()
            .expect("serializing to a Vec is infallible");
        sha256d::digest(&bytes)
    }
}

impl WireDeserialize for Transaction {
    fn wire_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Transaction {
            version: u32::wire_deserialize(&mut reader)?,
            inputs: Vec::wire_deserialize(&mut reader)?,
            outputs: Vec::wire_deserialize(&mut reader)?,
            hash: Cached::new(),
        })
    }
}
