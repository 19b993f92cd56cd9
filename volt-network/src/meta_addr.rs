//! Gossiped and persisted peer address records.

use std::io::{Read, Write};
use std::net::SocketAddr;

use chrono::{DateTime, Utc};

use volt_chain::{SerializationError, WireDeserialize, WireSerialize};
use volt_serde_derive::{WireDeserialize, WireSerialize};

/// An address as it travels in an `Address` message: when the advertising
/// peer last heard from it, and where it is.
#[derive(Copy, Clone, Debug, Eq, PartialEq, WireSerialize, WireDeserialize)]
pub struct MetaAddr {
    /// When the peer advertising this address last saw it.
    pub last_seen: DateTime<Utc>,
    /// The address itself.
    pub addr: SocketAddr,
}

/// An address as the pool persists it, with its misbehaviour record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AddressMetadata {
    /// When we last heard from this address.
    pub last_seen: DateTime<Utc>,
    /// The address itself.
    pub addr: SocketAddr,
    /// Accumulated misbehaviour. At the ban threshold the address is banned.
    pub ban_score: u8,
    /// Whether the address is currently banned.
    pub banned: bool,
    /// When the current ban began; meaningful only while `banned` is set.
    pub ban_time: DateTime<Utc>,
}

impl AddressMetadata {
    /// A fresh record for an address first seen at `last_seen`.
    pub fn new(addr: SocketAddr, last_seen: DateTime<Utc>) -> AddressMetadata {
        AddressMetadata {
            last_seen,
            addr,
            ban_score: 0,
            banned: false,
            ban_time: last_seen,
        }
    }

    /// The gossip form of this record.
    pub fn meta_addr(&self) -> MetaAddr {
        MetaAddr {
            last_seen: self.last_seen,
            addr: self.addr,
        }
    }
}

impl WireSerialize for AddressMetadata {
    fn wire_serialize<W: Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.last_seen.wire_serialize(&mut target)?;
        self.addr.wire_serialize(&mut target)?;
        target.write_all(&[self.ban_score])?;
        self.banned.wire_serialize(&mut target)?;
        self.ban_time.wire_serialize(&mut target)
    }
}

impl WireDeserialize for AddressMetadata {
    fn wire_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        // Each field is read directly into its own slot, in wire order.
        Ok(AddressMetadata {
            last_seen: <DateTime<Utc>>::wire_deserialize(&mut reader)?,
            addr: SocketAddr::wire_deserialize(&mut reader)?,
            ban_score: u8::wire_deserialize(&mut reader)?,
            banned: bool::wire_deserialize(&mut reader)?,
            ban_time: <DateTime<Utc>>::wire_deserialize(&mut reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use volt_chain::WireDeserializeInto;

    #[test]
    fn address_metadata_round_trip_preserves_ban_fields() {
        let seen = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let banned_at = Utc.timestamp_opt(1_700_000_600, 0).single().unwrap();
        let mut meta = AddressMetadata::new("[2001:db8::1]:9567".parse().unwrap(), seen);
        meta.ban_score = 60;
        meta.banned = true;
        meta.ban_time = banned_at;

        let bytes = meta.wire_serialize_to_vec().unwrap();
        let parsed: AddressMetadata = bytes.as_slice().wire_deserialize_into().unwrap();
        assert_eq!(parsed, meta);
        assert_eq!(parsed.ban_time, banned_at);
    }

    #[test]
    fn ipv4_addresses_round_trip_through_the_mapped_form() {
        let meta = MetaAddr {
            last_seen: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
            addr: "203.0.113.6:9567".parse().unwrap(),
        };
        let bytes = meta.wire_serialize_to_vec().unwrap();
        // 16-byte address plus big-endian port, after the 8-byte timestamp.
        assert_eq!(bytes.len(), 8 + 16 + 2);
        let parsed: MetaAddr = bytes.as_slice().wire_deserialize_into().unwrap();
        assert_eq!(parsed, meta);
    }
}
