//! Transaction inputs, outputs, and the locks that guard them.
#![allow(clippy::unit_arg)]

mod address;
mod serialize;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;

pub use address::{pub_key_hash, Address};

use crate::compactint::CompactInt;
use crate::{amount::Amount, block, transaction};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// Arbitrary data a miner may embed in a coinbase input, after the encoded
/// block height.
#[derive(Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CoinbaseData(
    /// Invariant: at most [`CoinbaseData::MAX_LEN`] bytes. Deserialization
    /// rejects longer fields; constructors truncate.
    pub(super) Vec<u8>,
);

impl CoinbaseData {
    /// The largest free-data field a coinbase input may carry.
    pub const MAX_LEN: usize = 96;

    /// Wrap miner data, truncating to [`CoinbaseData::MAX_LEN`] bytes.
    pub fn new(mut data: Vec<u8>) -> CoinbaseData {
        data.truncate(Self::MAX_LEN);
        CoinbaseData(data)
    }
}

impl AsRef<[u8]> for CoinbaseData {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for CoinbaseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let escaped = String::from_utf8(
            self.0
                .iter()
                .cloned()
                .flat_map(std::ascii::escape_default)
                .collect(),
        )
        .expect("ascii::escape_default produces utf8");
        f.debug_tuple("CoinbaseData").field(&escaped).finish()
    }
}

/// OutPoint
///
/// A particular transaction output reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct OutPoint {
    /// References the transaction that contains the UTXO being spent.
    pub hash: transaction::Hash,

    /// Identifies which UTXO from that transaction is referenced; the
    /// first output is 0, etc.
    pub index: u32,
}

impl OutPoint {
    /// The serialized length of an outpoint.
    #[inline]
    pub const fn len() -> usize {
        36
    }
}

/// The parameters that satisfy an output's lock.
///
/// For a [`LockScript::SingleSignature`] lock this is the 33-byte compressed
/// public key followed by a DER-encoded ECDSA signature.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct UnlockScript(pub Vec<u8>);

impl UnlockScript {
    /// Build the unlock script for a single-signature lock.
    pub fn single_signature(pub_key: &[u8; 33], der_signature: &[u8]) -> UnlockScript {
        let mut bytes = Vec::with_capacity(33 + der_signature.len());
        bytes.extend_from_slice(pub_key);
        bytes.extend_from_slice(der_signature);
        UnlockScript(bytes)
    }

    /// Split into `(compressed public key, DER signature)` if this script is
    /// shaped like a single-signature unlock.
    pub fn as_single_signature(&self) -> Option<(&[u8], &[u8])> {
        if self.0.len() <= 33 {
            return None;
        }
        Some(self.0.split_at(33))
    }

    /// The serialized length of this script, including the length prefix.
    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }
}

/// An input to a transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Input {
    /// A reference to an output of a previous transaction.
    PrevOut {
        /// The previous output transaction reference.
        outpoint: OutPoint,
        /// The script that authorizes spending `outpoint`.
        unlock: UnlockScript,
    },
    /// New coins created by the block reward.
    ///
    /// On the wire this is the all-zero outpoint hash, index `u32::MAX`, and
    /// an unlock payload whose first four bytes are the little-endian block
    /// height.
    Coinbase {
        /// The height of the block this coinbase belongs to.
        height: block::Height,
        /// Free data inserted by miners.
        data: CoinbaseData,
    },
}

impl Input {
    /// The serialized length of this input.
    pub fn len(&self) -> usize {
        match self {
            Input::PrevOut { ref unlock, .. } => OutPoint::len() + unlock.serialized_size(),
            Input::Coinbase { ref data, .. } => {
                let payload = 4 + data.0.len();
                OutPoint::len() + CompactInt::size(payload) + payload
            }
        }
    }

    /// The outpoint this input spends, unless it is a coinbase input.
    pub fn outpoint(&self) -> Option<OutPoint> {
        match self {
            Input::PrevOut { outpoint, .. } => Some(*outpoint),
            Input::Coinbase { .. } => None,
        }
    }

    /// A copy of this input with the unlock script emptied, used to compute
    /// the digest that spend signatures commit to.
    pub fn without_unlock(&self) -> Input {
        match self {
            Input::PrevOut { outpoint, .. } => Input::PrevOut {
                outpoint: *outpoint,
                unlock: UnlockScript::default(),
            },
            coinbase => coinbase.clone(),
        }
    }
}

/// The kind of lock on an output, with its locking parameters.
///
/// The tag byte on the wire selects the variant; the only kind currently
/// defined locks an output to a single public key hash.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub enum LockScript {
    /// Spendable by an ECDSA signature from the key hashing to
    /// `pub_key_hash`.
    SingleSignature {
        /// RIPEMD160(SHA256(compressed public key)).
        pub_key_hash: [u8; 20],
    },
}

impl LockScript {
    /// The wire tag for [`LockScript::SingleSignature`].
    pub const SINGLE_SIGNATURE_TAG: u8 = 0;

    /// The public key hash this lock pays to.
    pub fn pub_key_hash(&self) -> &[u8; 20] {
        match self {
            LockScript::SingleSignature { pub_key_hash } => pub_key_hash,
        }
    }

    /// The serialized length of this lock: tag byte plus parameters.
    pub fn serialized_size(&self) -> usize {
        match self {
            LockScript::SingleSignature { .. } => 1 + 20,
        }
    }
}

/// An output of a transaction.
///
/// The most fundamental building block of a transaction is a transaction
/// output -- the coins you own in your "wallet" are in fact a subset of
/// unspent transaction outputs (or "UTXO"s) of the global UTXO set.
///
/// UTXOs are indivisible, discrete units of value which can only be consumed
/// in their entirety.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Output {
    /// Transaction value, serialized big-endian.
    pub value: Amount,

    /// The lock defines the conditions under which this output can be spent.
    pub lock: LockScript,
}

impl Output {
    /// Returns the serialized length (in bytes) of this output.
    pub fn len(&self) -> usize {
        8 + self.lock.serialized_size()
    }
}
