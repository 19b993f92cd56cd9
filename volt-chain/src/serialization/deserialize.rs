use super::CompactInt;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use std::net::{Ipv6Addr, SocketAddr};
use std::{
    io,
    net::IpAddr::{V4, V6},
};

use super::SerializationError;

type Result<R> = std::result::Result<R, SerializationError>;

/// Deserialization from the volt wire encoding.
pub trait WireDeserialize {
    /// Read a value of this type from the given reader.
    fn wire_deserialize<R: io::Read>(reader: R) -> Result<Self>
    where
        Self: Sized;
}

/// Helper for deserializing more succinctly via type inference
pub trait WireDeserializeInto {
    /// Deserialize based on type inference
    fn wire_deserialize_into<T>(self) -> Result<T>
    where
        T: WireDeserialize;
}

impl<R: io::Read> WireDeserializeInto for R {
    fn wire_deserialize_into<T>(self) -> Result<T>
    where
        T: WireDeserialize,
    {
        T::wire_deserialize(self)
    }
}

impl WireDeserialize for bool {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<bool> {
        let value = reader.read_u8()?;
        match value {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SerializationError::Parse("invalid bool")),
        }
    }
}

impl WireDeserialize for u8 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<u8> {
        Ok(reader.read_u8()?)
    }
}

impl WireDeserialize for u16 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<u16> {
        Ok(reader.read_u16::<LittleEndian>()?)
    }
}

impl WireDeserialize for u32 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<u32> {
        Ok(reader.read_u32::<LittleEndian>()?)
    }
}

impl WireDeserialize for u64 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<u64> {
        Ok(reader.read_u64::<LittleEndian>()?)
    }
}

impl WireDeserialize for u128 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<u128> {
        Ok(reader.read_u128::<BigEndian>()?)
    }
}

impl WireDeserialize for i32 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<i32> {
        Ok(reader.read_i32::<LittleEndian>()?)
    }
}

impl WireDeserialize for i64 {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<i64> {
        Ok(reader.read_i64::<LittleEndian>()?)
    }
}

impl WireDeserialize for DateTime<Utc> {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<DateTime<Utc>> {
        let timestamp = reader.read_i64::<LittleEndian>()?;
        Utc.timestamp_opt(timestamp, 0)
            .single()
            .ok_or(SerializationError::Parse("timestamp out of range"))
    }
}

impl<T> WireDeserialize for Vec<T>
where
    T: WireDeserialize,
{
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<Vec<T>> {
        let len = CompactInt::wire_deserialize(&mut reader)?.value() as usize;
        // Limit preallocation since blind preallocation is a DOS vulnerability
        let blind_alloc_limit = 1024;
        let mut result: Vec<T> = Vec::with_capacity(std::cmp::min(len, blind_alloc_limit));
        for _ in 0..len {
            result.push(T::wire_deserialize(&mut reader)?);
        }
        Ok(result)
    }
}

impl WireDeserialize for String {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<String> {
        let len = CompactInt::wire_deserialize(&mut reader)?.value() as usize;
        if len > 1024 {
            return Err(SerializationError::Parse("string too long"));
        }
        let mut buf = vec![0; len];
        reader.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| SerializationError::Parse("invalid utf-8"))
    }
}

impl WireDeserialize for SocketAddr {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<SocketAddr> {
        let octets = <[u8; 16]>::wire_deserialize(&mut reader)?;
        let v6_addr = Ipv6Addr::from(octets);

        let addr = match v6_addr.to_ipv4() {
            Some(v4_addr) => V4(v4_addr),
            None => V6(v6_addr),
        };
        Ok(SocketAddr::from((addr, reader.read_u16::<BigEndian>()?)))
    }
}

impl<T> WireDeserialize for std::sync::Arc<T>
where
    T: WireDeserialize,
{
    fn wire_deserialize<R: io::Read>(reader: R) -> Result<std::sync::Arc<T>> {
        Ok(std::sync::Arc::new(T::wire_deserialize(reader)?))
    }
}

impl<T, U> WireDeserialize for (T, U)
where
    T: WireDeserialize,
    U: WireDeserialize,
{
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<(T, U)> {
        Ok((
            T::wire_deserialize(&mut reader)?,
            U::wire_deserialize(&mut reader)?,
        ))
    }
}

macro_rules! impl_deserializable_byte_array {
    ($size:expr) => {
        impl WireDeserialize for [u8; $size] {
            fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<[u8; $size]> {
                let mut result = [0u8; $size];
                reader.read_exact(&mut result)?;
                Ok(result)
            }
        }
    };
}

impl_deserializable_byte_array!(4);
impl_deserializable_byte_array!(16);
impl_deserializable_byte_array!(20);
impl_deserializable_byte_array!(32);
