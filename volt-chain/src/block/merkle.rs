//! The Merkle tree over a block's transactions.

use std::{fmt, io, iter::FromIterator};

use crate::serialization::{sha256d, SerializationError, WireDeserialize, WireSerialize};
use crate::transaction;

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// The root of the binary SHA256d hash tree over a block's transactions.
///
/// At each level, an odd node count is padded by duplicating the last node.
/// A single transaction is its own root.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Root(pub [u8; 32]);

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl FromIterator<transaction::Hash> for Root {
    fn from_iter<I>(hashes: I) -> Self
    where
        I: IntoIterator<Item = transaction::Hash>,
    {
        let mut level: Vec<[u8; 32]> = hashes.into_iter().map(|hash| hash.0).collect();
        if level.is_empty() {
            return Root([0u8; 32]);
        }

        while level.len() > 1 {
            if level.len() % 2 != 0 {
                // last() is Some: the level is non-empty
                level.push(*level.last().unwrap());
            }
            level = level
                .chunks(2)
                .map(|pair| {
                    let mut concat = [0u8; 64];
                    concat[0..32].copy_from_slice(&pair[0]);
                    concat[32..64].copy_from_slice(&pair[1]);
                    sha256d::digest(&concat)
                })
                .collect();
        }

        Root(level[0])
    }
}

impl WireSerialize for Root {
    fn wire_serialize<W: io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.wire_serialize(target)
    }
}

impl WireDeserialize for Root {
    fn wire_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::wire_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_hash(byte: u8) -> transaction::Hash {
        transaction::Hash([byte; 32])
    }

    #[test]
    fn single_transaction_is_its_own_root() {
        let root: Root = std::iter::once(tx_hash(7)).collect();
        assert_eq!(root.0, [7u8; 32]);
    }

    #[test]
    fn odd_level_duplicates_last_node() {
        // With three leaves, the pair (c, c) is hashed at the first level.
        let three: Root = [tx_hash(1), tx_hash(2), tx_hash(3)].iter().cloned().collect();
        let four: Root = [tx_hash(1), tx_hash(2), tx_hash(3), tx_hash(3)]
            .iter()
            .cloned()
            .collect();
        assert_eq!(three, four);
    }

    #[test]
    fn order_matters() {
        let forward: Root = [tx_hash(1), tx_hash(2)].iter().cloned().collect();
        let reverse: Root = [tx_hash(2), tx_hash(1)].iter().cloned().collect();
        assert_ne!(forward, reverse);
    }
}
