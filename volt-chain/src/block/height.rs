use crate::{SerializationError, WireDeserialize, WireSerialize};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// The height of a block is the length of the chain back to the genesis block.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Height(pub u32);

impl Height {
    /// The height of the genesis block.
    pub const MIN: Height = Height(0);

    /// The largest representable height.
    pub const MAX: Height = Height(u32::MAX);

    /// The height of this block's parent, if this is not the genesis block.
    pub fn previous(self) -> Option<Height> {
        self.0.checked_sub(1).map(Height)
    }

    /// The height of a child of this block.
    pub fn next(self) -> Option<Height> {
        self.0.checked_add(1).map(Height)
    }
}

impl WireSerialize for Height {
    fn wire_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.wire_serialize(target)
    }
}

impl WireDeserialize for Height {
    fn wire_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Height(u32::wire_deserialize(reader)?))
    }
}
