use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::{arbitrary::Arbitrary, collection::vec, prelude::*};

use crate::transaction::Transaction;
use crate::work::difficulty::CompactDifficulty;

use super::{merkle, Block, Hash, Header};

impl Arbitrary for Header {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (
            any::<u32>(),
            any::<Hash>(),
            any::<merkle::Root>(),
            // Bounded so every generated timestamp is a valid chrono datetime.
            0i64..=4_102_444_800,
            any::<u32>(),
            any::<u32>(),
        )
            .prop_map(|(version, previous_block_hash, merkle_root, timestamp, bits, nonce)| {
                Header::new(
                    version,
                    previous_block_hash,
                    merkle_root,
                    Utc.timestamp_opt(timestamp, 0)
                        .single()
                        .expect("timestamp range only contains valid datetimes"),
                    CompactDifficulty(bits),
                    nonce,
                )
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Block {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (any::<Header>(), vec(any::<Transaction>(), 0..4))
            .prop_map(|(header, transactions)| Block {
                header,
                transactions: transactions.into_iter().map(Arc::new).collect(),
            })
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
