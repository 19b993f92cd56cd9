use proptest::prelude::*;

use crate::serialization::{WireDeserializeInto, WireSerialize};
use crate::transfer::{CoinbaseData, Input, LockScript, OutPoint, Output, UnlockScript};
use crate::{amount::Amount, block::Height};

use super::*;

fn spend(outpoint: OutPoint, unlock: UnlockScript) -> Transaction {
    Transaction::new(
        1,
        vec![Input::PrevOut { outpoint, unlock }],
        vec![Output {
            value: Amount::from_units(10),
            lock: LockScript::SingleSignature {
                pub_key_hash: [9u8; 20],
            },
        }],
    )
}

#[test]
fn coinbase_input_uses_wire_sentinel() {
    let input = Input::Coinbase {
        height: Height(42),
        data: CoinbaseData::new(b"mined by volt".to_vec()),
    };
    let bytes = input.wire_serialize_to_vec().unwrap();

    // zero hash, then the u32::MAX index sentinel
    assert_eq!(&bytes[0..32], &[0u8; 32]);
    assert_eq!(&bytes[32..36], &[0xff; 4]);

    let parsed: Input = bytes.as_slice().wire_deserialize_into().unwrap();
    assert_eq!(parsed, input);
}

#[test]
fn coinbase_payload_without_height_is_rejected() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&[0u8; 32]);
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    // A 2-byte payload can't hold the 4-byte height.
    bytes.push(2);
    bytes.extend_from_slice(&[1, 2]);

    assert!(bytes.as_slice().wire_deserialize_into::<Input>().is_err());
}

#[test]
fn sighash_ignores_unlock_scripts() {
    let outpoint = OutPoint {
        hash: Hash([3u8; 32]),
        index: 1,
    };
    let unsigned = spend(outpoint, UnlockScript::default());
    let signed = spend(outpoint, UnlockScript(vec![0x30; 70]));

    assert_eq!(unsigned.sighash(), signed.sighash());
    // But the transaction hashes differ, since the hash covers the unlock.
    assert_ne!(unsigned.hash(), signed.hash());
}

#[test]
fn serialized_len_matches_reported_len() {
    let transaction = spend(
        OutPoint {
            hash: Hash([5u8; 32]),
            index: 0,
        },
        UnlockScript(vec![7u8; 71]),
    );
    let bytes = transaction.wire_serialize_to_vec().unwrap();
    assert_eq!(bytes.len(), transaction.len());
}

proptest! {
    #[test]
    fn transaction_roundtrip(transaction in any::<Transaction>()) {
        let bytes = transaction.wire_serialize_to_vec()?;
        let parsed: Transaction = bytes.as_slice().wire_deserialize_into()?;

        prop_assert_eq![transaction, parsed];
    }

    #[test]
    fn transaction_len_matches_serialization(transaction in any::<Transaction>()) {
        let bytes = transaction.wire_serialize_to_vec()?;
        prop_assert_eq![bytes.len(), transaction.len()];
    }
}
