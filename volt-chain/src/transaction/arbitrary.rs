use proptest::{arbitrary::Arbitrary, collection::vec, prelude::*};

use crate::transfer;

use super::Transaction;

impl Arbitrary for Transaction {
    type Parameters = ();

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (
            any::<u32>(),
            vec(any::<transfer::Input>(), 0..4),
            vec(any::<transfer::Output>(), 0..4),
        )
            .prop_map(|(version, inputs, outputs)| Transaction::new(version, inputs, outputs))
            .boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}
