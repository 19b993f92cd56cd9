//! Pay-to-public-key-hash addresses.

use std::{fmt, io};

use ripemd160::{Digest, Ripemd160};
use sha2::{Digest as sha2Digest, Sha256};

use crate::{
    parameters::Network,
    serialization::{SerializationError, WireDeserialize, WireSerialize},
};

use super::LockScript;

/// Version bytes that identify what network an address belongs to.
mod magics {
    pub const MAINNET: [u8; 1] = [0x46];
    pub const TESTNET: [u8; 1] = [0x6f];
}

/// A spendable address: a network tag plus a public key hash.
///
/// A single version byte is prepended to the hash, the result is hashed with
/// SHA256d, the first four bytes of that digest are appended as a checksum,
/// and the whole is Base58Check encoded for display.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Address {
    /// Production or test network.
    pub network: Network,
    /// 20 bytes specifying a public key hash, which is a RIPEMD-160
    /// hash of a SHA-256 hash of a compressed ECDSA key encoding.
    pub pub_key_hash: [u8; 20],
}

/// `RIPEMD160(SHA256(pub_key))`, the hash a single-signature lock commits to.
pub fn pub_key_hash(pub_key: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(pub_key);
    let ripe = Ripemd160::digest(&sha);
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&ripe);
    hash
}

impl Address {
    /// The address paying to (a hash of) the given compressed public key.
    pub fn from_pub_key(network: Network, pub_key: &[u8; 33]) -> Address {
        Address {
            network,
            pub_key_hash: pub_key_hash(pub_key),
        }
    }

    /// The lock script paying to this address.
    pub fn lock_script(&self) -> LockScript {
        LockScript::SingleSignature {
            pub_key_hash: self.pub_key_hash,
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Address")
            .field("network", &self.network)
            .field("pub_key_hash", &hex::encode(self.pub_key_hash))
            .finish()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = io::Cursor::new(Vec::new());
        let _ = self.wire_serialize(&mut bytes);

        f.write_str(&bs58::encode(bytes.get_ref()).with_check().into_string())
    }
}

impl std::str::FromStr for Address {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = &bs58::decode(s).with_check(None).into_vec();

        match result {
            Ok(bytes) => Self::wire_deserialize(&bytes[..]),
            Err(_) => Err(SerializationError::Parse("address decoding error")),
        }
    }
}

impl WireSerialize for Address {
    fn wire_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self.network {
            Network::Mainnet => writer.write_all(&magics::MAINNET[..])?,
            Network::Testnet => writer.write_all(&magics::TESTNET[..])?,
        }
        writer.write_all(&self.pub_key_hash)
    }
}

impl WireDeserialize for Address {
    fn wire_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let version = u8::wire_deserialize(&mut reader)?;
        let network = match [version] {
            magics::MAINNET => Network::Mainnet,
            magics::TESTNET => Network::Testnet,
            _ => return Err(SerializationError::Parse("unknown address version byte")),
        };
        Ok(Address {
            network,
            pub_key_hash: <[u8; 20]>::wire_deserialize(&mut reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_fromstr_round_trip() {
        let address = Address {
            network: Network::Mainnet,
            pub_key_hash: [0x42; 20],
        };
        let encoded = address.to_string();
        let decoded: Address = encoded.parse().expect("valid address should parse");
        assert_eq!(address, decoded);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let address = Address {
            network: Network::Testnet,
            pub_key_hash: [0x17; 20],
        };
        let mut encoded = address.to_string();
        // Flip the final character to damage the checksum.
        let last = encoded.pop().expect("address string is non-empty");
        encoded.push(if last == '1' { '2' } else { '1' });
        assert!(encoded.parse::<Address>().is_err());
    }

    #[test]
    fn pub_key_hash_is_twenty_bytes() {
        let hash = pub_key_hash(&[2u8; 33]);
        assert_eq!(hash.len(), 20);
    }
}
