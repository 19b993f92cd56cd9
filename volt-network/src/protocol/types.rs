//! Newtype wrappers for protocol fields.

use bitflags::bitflags;
use rand::Rng;

use volt_chain::{SerializationError, WireDeserialize, WireSerialize};

/// A nonce identifying a particular connection or ping.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Nonce(pub u64);

impl Nonce {
    /// A fresh random nonce.
    pub fn new() -> Nonce {
        Nonce(rand::thread_rng().gen())
    }
}

impl Default for Nonce {
    fn default() -> Self {
        Nonce::new()
    }
}

impl WireSerialize for Nonce {
    fn wire_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.wire_serialize(target)
    }
}

impl WireDeserialize for Nonce {
    fn wire_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Nonce(u64::wire_deserialize(reader)?))
    }
}

/// A protocol version number.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct ProtocolVersion(pub u32);

impl WireSerialize for ProtocolVersion {
    fn wire_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.wire_serialize(target)
    }
}

impl WireDeserialize for ProtocolVersion {
    fn wire_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(ProtocolVersion(u32::wire_deserialize(reader)?))
    }
}

bitflags! {
    /// The services a peer advertises.
    #[derive(Default)]
    pub struct PeerServices: u64 {
        /// The peer serves full blocks.
        const NODE_NETWORK = 1;
    }
}

impl WireSerialize for PeerServices {
    fn wire_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.bits().wire_serialize(target)
    }
}

impl WireDeserialize for PeerServices {
    fn wire_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        // Unknown service bits are tolerated, not round-tripped.
        Ok(PeerServices::from_bits_truncate(u64::wire_deserialize(
            reader,
        )?))
    }
}
