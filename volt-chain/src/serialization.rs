//! Consensus-critical serialization.
//!
//! This module contains the `WireSerialize` and `WireDeserialize` traits,
//! analogs of the Serde `Serialize` and `Deserialize` traits but intended for
//! the consensus-critical volt wire formats, along with implementations for
//! the primitive types those formats are built from.

mod deserialize;
mod error;

pub mod sha256d;

use chrono::{DateTime, Utc};
pub use deserialize::{WireDeserialize, WireDeserializeInto};
pub use error::SerializationError;

use crate::compactint::CompactInt;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use std::net::IpAddr;

/// Serialization into the volt wire encoding.
///
/// Integers are little-endian unless a field explicitly says otherwise;
/// collections carry a [`CompactInt`] length prefix.
pub trait WireSerialize {
    /// Write `self` into the given writer.
    fn wire_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    /// Helper: serialize into a fresh byte vector.
    fn wire_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.wire_serialize(&mut data)?;
        Ok(data)
    }
}

impl WireSerialize for bool {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self as u8])
    }
}

// An impl for bare u8 would overlap with the specialized Vec<u8> impl below,
// so byte fields are written through `&u8` instead.
impl WireSerialize for &u8 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[**self])
    }
}

impl WireSerialize for u16 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl WireSerialize for u32 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl WireSerialize for u64 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl WireSerialize for u128 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u128::<BigEndian>(*self)
    }
}

impl WireSerialize for i32 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i32::<LittleEndian>(*self)
    }
}

impl WireSerialize for i64 {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(*self)
    }
}

impl WireSerialize for DateTime<Utc> {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(self.timestamp())
    }
}

impl WireSerialize for std::net::Ipv6Addr {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&self.octets())
    }
}

impl WireSerialize for std::net::IpAddr {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        match self {
            IpAddr::V4(addr) => addr.to_ipv6_mapped().wire_serialize(&mut target),
            IpAddr::V6(addr) => addr.wire_serialize(&mut target),
        }
    }
}

impl WireSerialize for std::net::SocketAddr {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.ip().wire_serialize(&mut target)?;
        // Port is big-endian on the wire.
        target.write_u16::<BigEndian>(self.port())
    }
}

impl WireSerialize for [u8; 4] {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl WireSerialize for [u8; 20] {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl WireSerialize for [u8; 32] {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl WireSerialize for Vec<u8> {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).wire_serialize(&mut target)?;
        target.write_all(self)?;
        Ok(())
    }
}

impl<T> WireSerialize for Vec<T>
where
    T: WireSerialize,
{
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).wire_serialize(&mut target)?;
        for item in self.iter() {
            item.wire_serialize(&mut target)?
        }
        Ok(())
    }
}

impl<T> WireSerialize for std::sync::Arc<T>
where
    T: WireSerialize,
{
    fn wire_serialize<W>(&self, target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.as_ref().wire_serialize(target)
    }
}

impl<T, U> WireSerialize for (T, U)
where
    T: WireSerialize,
    U: WireSerialize,
{
    fn wire_serialize<W>(&self, mut target: W) -> std::result::Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.0.wire_serialize(&mut target)?;
        self.1.wire_serialize(&mut target)?;
        Ok(())
    }
}

impl WireSerialize for String {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).wire_serialize(&mut target)?;
        target.write_all(self.as_bytes())?;
        Ok(())
    }
}
