use proptest::prelude::*;

use crate::serialization::{WireDeserializeInto, WireSerialize};
use crate::transaction::Transaction;
use crate::transfer::{CoinbaseData, Input, LockScript, Output};
use crate::{amount::Amount, parameters::Network};

use super::*;

#[test]
fn serialized_header_is_80_bytes() {
    let header = crate::parameters::genesis_block(Network::Mainnet).header;
    let bytes = header.wire_serialize_to_vec().unwrap();
    assert_eq!(bytes.len(), Header::len());
}

#[test]
fn deserialized_header_caches_its_hash() {
    let header = crate::parameters::genesis_block(Network::Mainnet).header;
    let bytes = header.wire_serialize_to_vec().unwrap();

    let parsed: Header = bytes.as_slice().wire_deserialize_into().unwrap();
    assert_eq!(parsed.hash(), header.hash());
}

#[test]
fn coinbase_height_is_read_from_first_input() {
    let coinbase = Transaction::new(
        1,
        vec![Input::Coinbase {
            height: Height(77),
            data: CoinbaseData::new(Vec::new()),
        }],
        vec![Output {
            value: Amount::from_units(50),
            lock: LockScript::SingleSignature {
                pub_key_hash: [1u8; 20],
            },
        }],
    );
    let mut block = crate::parameters::genesis_block(Network::Mainnet).as_ref().clone();
    block.transactions = vec![std::sync::Arc::new(coinbase)];
    assert_eq!(block.coinbase_height(), Some(Height(77)));
}

proptest! {
    #[test]
    fn block_hash_roundtrip(hash in any::<Hash>()) {
        let bytes = hash.wire_serialize_to_vec()?;
        let other_hash: Hash = bytes.as_slice().wire_deserialize_into()?;

        prop_assert_eq![hash, other_hash];
    }

    #[test]
    fn block_hash_display_fromstr_roundtrip(hash in any::<Hash>()) {
        let display = format!("{}", hash);
        let parsed = display.parse::<Hash>().expect("hash should parse");
        prop_assert_eq!(hash, parsed);
    }

    #[test]
    fn blockheader_roundtrip(header in any::<Header>()) {
        let bytes = header.wire_serialize_to_vec().unwrap();
        let other_header: Header = bytes.as_slice().wire_deserialize_into()?;

        prop_assert_eq![header, other_header];
    }

    #[test]
    fn block_roundtrip(block in any::<Block>()) {
        let bytes = block.wire_serialize_to_vec()?;
        let other_block: Block = bytes.as_slice().wire_deserialize_into()?;

        prop_assert_eq![block, other_block];
    }
}
