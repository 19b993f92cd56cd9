use proptest::{arbitrary::Arbitrary, collection::vec, prelude::*};

use crate::block::Height;

use super::{CoinbaseData, Input, OutPoint, UnlockScript};

impl Arbitrary for UnlockScript {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        vec(any::<u8>(), 34..80).prop_map(UnlockScript).boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for CoinbaseData {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        vec(any::<u8>(), 0..=CoinbaseData::MAX_LEN)
            .prop_map(CoinbaseData)
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}

impl Arbitrary for Input {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        prop_oneof![
            (any::<OutPoint>(), any::<UnlockScript>()).prop_map(|(mut outpoint, unlock)| {
                // The coinbase sentinel must not appear in a regular outpoint.
                if outpoint.hash.0 == [0u8; 32] && outpoint.index == u32::MAX {
                    outpoint.index = 0;
                }
                Input::PrevOut { outpoint, unlock }
            }),
            (any::<Height>(), any::<CoinbaseData>())
                .prop_map(|(height, data)| Input::Coinbase { height, data }),
        ]
        .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
