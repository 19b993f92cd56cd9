use std::convert::TryInto;
use std::io::Read;
use std::sync::Arc;

use crate::compactint::CompactInt;
use crate::serialization::{SerializationError, WireDeserialize};
use crate::transaction::Transaction;

use super::{Block, Header};

/// The maximum size of a serialized block, in bytes.
pub const MAX_BLOCK_BYTES: u64 = 1_000_000;

impl WireDeserialize for Block {
    fn wire_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let header = Header::wire_deserialize(&mut reader)?;

        let mut reader = reader.take(MAX_BLOCK_BYTES - Header::len() as u64);
        let tx_count = CompactInt::wire_deserialize(&mut reader)?.value();

        // Sanity check the count against the smallest possible transaction,
        // so a hostile length prefix can't drive a huge preallocation.
        if tx_count > MAX_BLOCK_BYTES / 64 {
            return Err(SerializationError::Parse(
                "block claims more transactions than could fit in a block",
            ));
        }
        let mut transactions = Vec::with_capacity(
            tx_count
                .try_into()
                .expect("transaction count was bounded above"),
        );

        for _ in 0..tx_count {
            transactions.push(<Arc<Transaction>>::wire_deserialize(&mut reader)?);
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}
