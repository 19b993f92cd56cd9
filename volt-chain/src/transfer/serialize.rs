//! Wire encodings for inputs, outputs, and locks.

use std::convert::TryInto;
use std::io::{Read, Write};

use crate::serialization::{SerializationError, WireDeserialize, WireSerialize};
use crate::{amount::Amount, block, transaction};

use super::{CoinbaseData, Input, LockScript, OutPoint, Output, UnlockScript};

/// The outpoint hash of a coinbase input.
const COINBASE_HASH: [u8; 32] = [0u8; 32];
/// The outpoint index sentinel of a coinbase input.
const COINBASE_INDEX: u32 = u32::MAX;

impl WireSerialize for OutPoint {
    fn wire_serialize<W: Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.hash.wire_serialize(&mut target)?;
        self.index.wire_serialize(&mut target)
    }
}

impl WireDeserialize for OutPoint {
    fn wire_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: transaction::Hash::wire_deserialize(&mut reader)?,
            index: u32::wire_deserialize(&mut reader)?,
        })
    }
}

impl WireSerialize for Input {
    fn wire_serialize<W: Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        match self {
            Input::PrevOut { outpoint, unlock } => {
                outpoint.wire_serialize(&mut target)?;
                unlock.0.wire_serialize(&mut target)
            }
            Input::Coinbase { height, data } => {
                COINBASE_HASH.wire_serialize(&mut target)?;
                COINBASE_INDEX.wire_serialize(&mut target)?;
                let mut payload = Vec::with_capacity(4 + data.0.len());
                payload.extend_from_slice(&height.0.to_le_bytes());
                payload.extend_from_slice(&data.0);
                payload.wire_serialize(&mut target)
            }
        }
    }
}

impl WireDeserialize for Input {
    fn wire_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let hash = transaction::Hash::wire_deserialize(&mut reader)?;
        let index = u32::wire_deserialize(&mut reader)?;
        let script: Vec<u8> = Vec::wire_deserialize(&mut reader)?;

        if hash.0 == COINBASE_HASH && index == COINBASE_INDEX {
            if script.len() < 4 {
                return Err(SerializationError::Parse(
                    "coinbase input payload too short to hold a height",
                ));
            }
            if script.len() > 4 + CoinbaseData::MAX_LEN {
                return Err(SerializationError::Parse("coinbase data too long"));
            }
            let height = u32::from_le_bytes(
                script[0..4]
                    .try_into()
                    .expect("slice of length 4 converts to [u8; 4]"),
            );
            Ok(Input::Coinbase {
                height: block::Height(height),
                data: CoinbaseData(script[4..].to_vec()),
            })
        } else {
            Ok(Input::PrevOut {
                outpoint: OutPoint { hash, index },
                unlock: UnlockScript(script),
            })
        }
    }
}

impl WireSerialize for LockScript {
    fn wire_serialize<W: Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        match self {
            LockScript::SingleSignature { pub_key_hash } => {
                target.write_all(&[LockScript::SINGLE_SIGNATURE_TAG])?;
                pub_key_hash.wire_serialize(&mut target)
            }
        }
    }
}

impl WireDeserialize for LockScript {
    fn wire_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let tag = u8::wire_deserialize(&mut reader)?;
        match tag {
            LockScript::SINGLE_SIGNATURE_TAG => Ok(LockScript::SingleSignature {
                pub_key_hash: <[u8; 20]>::wire_deserialize(&mut reader)?,
            }),
            _ => Err(SerializationError::Parse("unknown lock type")),
        }
    }
}

impl WireSerialize for Output {
    fn wire_serialize<W: Write>(&self, mut target: W) -> Result<(), std::io::Error> {
        self.value.wire_serialize(&mut target)?;
        self.lock.wire_serialize(&mut target)
    }
}

impl WireDeserialize for Output {
    fn wire_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Output {
            value: Amount::wire_deserialize(&mut reader)?,
            lock: LockScript::wire_deserialize(&mut reader)?,
        })
    }
}
