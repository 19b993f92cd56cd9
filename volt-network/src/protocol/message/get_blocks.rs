use volt_chain::{block, SerializationError, WireDeserialize, WireSerialize};

/// The body of a `GetBlocks` message.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GetBlocks {
    /// The sender's best known block hashes, ordered from newest to oldest
    /// with exponentially widening gaps.
    pub block_header_hashes: Vec<block::Hash>,
    /// The stop hash. `None` on the wire is the all-zero hash, which asks
    /// for as many blocks as the receiver will send (up to 500).
    pub stop_hash: Option<block::Hash>,
}

impl WireDeserialize for GetBlocks {
    fn wire_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        let block_header_hashes = Vec::wire_deserialize(&mut reader)?;
        let raw_stop_hash = block::Hash::wire_deserialize(&mut reader)?;
        let stop_hash = if raw_stop_hash.0 == [0u8; 32] {
            None
        } else {
            Some(raw_stop_hash)
        };
        Ok(GetBlocks {
            block_header_hashes,
            stop_hash,
        })
    }
}

impl WireSerialize for GetBlocks {
    fn wire_serialize<W: std::io::Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.block_header_hashes.wire_serialize(&mut target)?;
        match self.stop_hash {
            Some(hash) => hash.wire_serialize(&mut target),
            None => [0u8; 32].wire_serialize(&mut target),
        }
    }
}
