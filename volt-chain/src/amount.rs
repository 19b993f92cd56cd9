//! Coin amounts.
//!
//! Output values are unsigned 64-bit counts of base units. On the wire an
//! amount is a fixed 8-byte **big-endian** field, unlike the little-endian
//! integers elsewhere in the encoding.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::{SerializationError, WireDeserialize, WireSerialize};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// Base units per whole coin.
pub const COIN: u64 = 100_000_000;

/// An amount of base units.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Amount(u64);

/// Arithmetic errors on amounts.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Amount addition overflowed u64.
    #[error("amount overflowed")]
    Overflow,
    /// Amount subtraction went below zero.
    #[error("amount underflowed")]
    Underflow,
}

impl Amount {
    /// The zero amount.
    pub const fn zero() -> Amount {
        Amount(0)
    }

    /// Wrap a raw count of base units.
    pub const fn from_units(units: u64) -> Amount {
        Amount(units)
    }

    /// The raw count of base units.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Checked addition.
    pub fn checked_add(self, rhs: Amount) -> Result<Amount, Error> {
        self.0
            .checked_add(rhs.0)
            .map(Amount)
            .ok_or(Error::Overflow)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, rhs: Amount) -> Result<Amount, Error> {
        self.0
            .checked_sub(rhs.0)
            .map(Amount)
            .ok_or(Error::Underflow)
    }

    /// Checked sum over an iterator of amounts.
    pub fn sum(amounts: impl IntoIterator<Item = Amount>) -> Result<Amount, Error> {
        amounts
            .into_iter()
            .try_fold(Amount::zero(), Amount::checked_add)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:08}", self.0 / COIN, self.0 % COIN)
    }
}

impl WireSerialize for Amount {
    fn wire_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<BigEndian>(self.0)
    }
}

impl WireDeserialize for Amount {
    fn wire_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Amount(reader.read_u64::<BigEndian>()?))
    }
}
