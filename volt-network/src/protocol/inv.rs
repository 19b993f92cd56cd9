//! Inventory items for the volt protocol.

use std::io::{Read, Write};

use volt_chain::{
    block,
    serialization::{SerializationError, WireDeserialize, WireSerialize},
    transaction,
};

/// An inventory hash which refers to some advertised or requested data.
///
/// On the wire this is a one-byte type code followed by a 32-byte hash.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InventoryHash {
    /// An error; data with this code may be ignored.
    Error,
    /// A hash of a transaction.
    Tx(transaction::Hash),
    /// A hash of a block.
    Block(block::Hash),
}

impl From<transaction::Hash> for InventoryHash {
    fn from(tx: transaction::Hash) -> InventoryHash {
        InventoryHash::Tx(tx)
    }
}

impl From<block::Hash> for InventoryHash {
    fn from(hash: block::Hash) -> InventoryHash {
        InventoryHash::Block(hash)
    }
}

impl InventoryHash {
    /// The transaction hash, if this entry names a transaction.
    pub fn tx_hash(&self) -> Option<transaction::Hash> {
        match self {
            InventoryHash::Tx(hash) => Some(*hash),
            _ => None,
        }
    }
}

impl WireSerialize for InventoryHash {
    fn wire_serialize<W: Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        let (code, bytes): (u8, [u8; 32]) = match *self {
            InventoryHash::Error => (0, [0; 32]),
            InventoryHash::Tx(hash) => (1, hash.0),
            InventoryHash::Block(hash) => (2, hash.0),
        };
        writer.write_all(&[code])?;
        bytes.wire_serialize(&mut writer)?;
        Ok(())
    }
}

impl WireDeserialize for InventoryHash {
    fn wire_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let code = u8::wire_deserialize(&mut reader)?;
        let bytes = <[u8; 32]>::wire_deserialize(&mut reader)?;
        match code {
            0 => Ok(InventoryHash::Error),
            1 => Ok(InventoryHash::Tx(transaction::Hash(bytes))),
            2 => Ok(InventoryHash::Block(block::Hash(bytes))),
            _ => Err(SerializationError::Parse("invalid inventory code")),
        }
    }
}
