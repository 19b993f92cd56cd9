//! Bitcoin-style variable-length integers, used as length prefixes.

use crate::{SerializationError, WireDeserialize, WireSerialize};
use byteorder::{LittleEndian, WriteBytesExt};

/// A variable-length integer: 1, 3, 5, or 9 bytes on the wire depending on
/// magnitude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactInt(u64);

impl CompactInt {
    /// A zero-valued CompactInt.
    pub fn new() -> CompactInt {
        CompactInt(0)
    }

    /// Wrap a length as a CompactInt.
    pub fn from(value: usize) -> CompactInt {
        CompactInt(value as u64)
    }

    /// The wrapped value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The number of bytes the encoding of `value` occupies.
    pub fn size(value: usize) -> usize {
        if value < 253 {
            1
        } else if value <= u16::MAX as usize {
            3
        } else if value <= u32::MAX as usize {
            5
        } else {
            9
        }
    }
}

impl Default for CompactInt {
    fn default() -> Self {
        CompactInt::new()
    }
}

impl WireSerialize for CompactInt {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        if self.value() < 253 {
            target.write_all(&[self.value() as u8])
        } else if self.value() <= u16::MAX as u64 {
            target.write_all(&[253])?;
            target.write_u16::<LittleEndian>(self.value() as u16)
        } else if self.value() <= u32::MAX as u64 {
            target.write_all(&[254])?;
            target.write_u32::<LittleEndian>(self.value() as u32)
        } else {
            target.write_all(&[255])?;
            target.write_u64::<LittleEndian>(self.value())
        }
    }
}

impl WireDeserialize for CompactInt {
    fn wire_deserialize<R: std::io::Read>(
        mut target: R,
    ) -> Result<CompactInt, SerializationError> {
        let first = u8::wire_deserialize(&mut target)?;
        if first < 253 {
            Ok(CompactInt::from(first as usize))
        } else if first == 253 {
            Ok(CompactInt::from(
                u16::wire_deserialize(&mut target)? as usize
            ))
        } else if first == 254 {
            Ok(CompactInt::from(
                u32::wire_deserialize(&mut target)? as usize
            ))
        } else {
            Ok(CompactInt(u64::wire_deserialize(&mut target)?))
        }
    }
}
