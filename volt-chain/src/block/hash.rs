use std::{fmt, io};

use crate::serialization::{sha256d, SerializationError, WireDeserialize, WireSerialize};
use volt_serde_derive::WireSerialize;

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use super::Header;

/// A hash of a block, used to identify blocks and link blocks into a chain. ⛓️
///
/// Technically, this is the (SHA256d) hash of a block *header*, but since the
/// block header includes the Merkle root of the transaction Merkle tree, it
/// binds the entire contents of the block and is used to identify entire blocks.
///
/// When a hash is compared against a proof-of-work target, its bytes are
/// interpreted as an unsigned big-endian 256-bit integer; hashes display in
/// the same byte order.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, WireSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Wrap raw digest bytes as a block hash.
    pub fn from_bytes_exact(bytes: [u8; 32]) -> Hash {
        Hash(bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("block::Hash")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl WireDeserialize for Hash {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        Ok(Hash(<[u8; 32]>::wire_deserialize(&mut reader)?))
    }
}

impl<'a> From<&'a Header> for Hash {
    fn from(header: &'a Header) -> Self {
        let mut hash_writer = sha256d::Writer::default();
        header
            .wire_serialize(&mut hash_writer)
            .expect("Sha256d writer is infallible");
        Self(hash_writer.finish())
    }
}

impl std::str::FromStr for Hash {
    type Err = SerializationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
            Err(SerializationError::Parse("hex decoding error"))
        } else {
            Ok(Hash(bytes))
        }
    }
}
