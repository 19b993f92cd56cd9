//! Block difficulty data structures and calculations.
//!
//! The block difficulty "target threshold" is stored in the block header as a
//! 32-bit `CompactDifficulty`. The `block::Hash` must be less than or equal
//! to the `ExpandedDifficulty` threshold, when both are interpreted as
//! unsigned 256-bit big-endian integers.

use std::cmp::Ordering;

use primitive_types::U256;

use crate::block;
use crate::{SerializationError, WireDeserialize, WireSerialize};

/// A 32-bit packed encoding of a 256-bit proof-of-work target.
///
/// The high byte is a base-256 exponent, the low 23 bits are a mantissa, and
/// bit 23 is a sign bit inherited from the encoding's signed-bignum ancestry.
/// Negative or zero targets are invalid.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CompactDifficulty(pub u32);

/// A 256-bit unpacked proof-of-work target.
///
/// Hashes at or below the target satisfy the proof of work; larger targets
/// represent *less* work.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct ExpandedDifficulty(U256);

/// The work performed to find a block at some target, `2^256 / (target + 1)`.
///
/// Cumulative chain work is the sum of the work of a block and all its
/// ancestors. u128 saturates long before any realistic chain does.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Work(u128);

/// Bit 23, the compact-encoding sign bit.
const SIGN_BIT: u32 = 0x0080_0000;
/// The low 23 bits, the compact-encoding mantissa.
const MANTISSA_MASK: u32 = 0x007f_ffff;

impl CompactDifficulty {
    /// Unpack into a 256-bit target.
    ///
    /// Returns `None` for targets that are zero, negative, or too large to
    /// fit in 256 bits.
    pub fn to_expanded(&self) -> Option<ExpandedDifficulty> {
        let exponent = (self.0 >> 24) as u64;
        let mantissa = self.0 & MANTISSA_MASK;

        if mantissa == 0 || self.0 & SIGN_BIT != 0 {
            return None;
        }
        // A 23-bit mantissa shifted past byte 32 no longer fits in a U256.
        if exponent > 32 {
            return None;
        }

        let target = if exponent <= 3 {
            U256::from(mantissa >> (8 * (3 - exponent as u32)))
        } else {
            U256::from(mantissa) << (8 * (exponent as usize - 3))
        };

        if target.is_zero() {
            None
        } else {
            Some(ExpandedDifficulty(target))
        }
    }

    /// The work represented by this target, if the target is valid.
    pub fn to_work(&self) -> Option<Work> {
        self.to_expanded().and_then(Work::from_expanded)
    }
}

impl std::fmt::Debug for CompactDifficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("CompactDifficulty")
            .field(&format_args!("{:#010x}", self.0))
            .finish()
    }
}

impl WireSerialize for CompactDifficulty {
    fn wire_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.wire_serialize(target)
    }
}

impl WireDeserialize for CompactDifficulty {
    fn wire_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(u32::wire_deserialize(reader)?))
    }
}

impl ExpandedDifficulty {
    /// Wrap a raw 256-bit target.
    pub fn from_u256(target: U256) -> ExpandedDifficulty {
        ExpandedDifficulty(target)
    }

    /// The raw 256-bit target.
    pub fn to_u256(self) -> U256 {
        self.0
    }

    /// Re-pack into the canonical compact form.
    ///
    /// `expanded.to_compact().to_expanded()` may lose mantissa precision, but
    /// packing is stable: a value produced by `to_expanded` re-packs to the
    /// compact value it came from.
    pub fn to_compact(self) -> CompactDifficulty {
        let mut size = (self.0.bits() + 7) / 8;
        let mut compact = if size <= 3 {
            self.0.low_u64() << (8 * (3 - size))
        } else {
            (self.0 >> (8 * (size - 3))).low_u64()
        } as u32;

        // The encoding is signed; carry into the exponent rather than set bit 23.
        if compact & SIGN_BIT != 0 {
            compact >>= 8;
            size += 1;
        }

        CompactDifficulty(compact | (size as u32) << 24)
    }

    /// Scale this target by `numerator / denominator`, saturating at `limit`.
    pub fn rescale(self, numerator: u64, denominator: u64, limit: ExpandedDifficulty) -> Self {
        let scaled = (self.0 / denominator)
            .checked_mul(U256::from(numerator))
            .unwrap_or(limit.0);
        ExpandedDifficulty(scaled.min(limit.0))
    }
}

impl Work {
    /// `2^256 / (target + 1)`, the expected hash count to meet `target`.
    pub fn from_expanded(target: ExpandedDifficulty) -> Option<Work> {
        // (!target / (target + 1)) + 1 == 2^256 / (target + 1), without
        // needing 257-bit arithmetic.
        let work = (!target.0 / (target.0 + U256::one())) + U256::one();
        if work.bits() > 128 {
            return None;
        }
        Some(Work(work.as_u128()))
    }

    /// The raw work value.
    pub fn value(&self) -> u128 {
        self.0
    }
}

impl std::ops::Add for Work {
    type Output = Work;
    fn add(self, rhs: Work) -> Work {
        Work(self.0.saturating_add(rhs.0))
    }
}

impl block::Hash {
    /// The hash bytes interpreted as an unsigned big-endian 256-bit integer,
    /// for comparison against a proof-of-work target.
    pub fn as_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl PartialEq<ExpandedDifficulty> for block::Hash {
    fn eq(&self, other: &ExpandedDifficulty) -> bool {
        self.as_u256() == other.0
    }
}

impl PartialOrd<ExpandedDifficulty> for block::Hash {
    fn partial_cmp(&self, other: &ExpandedDifficulty) -> Option<Ordering> {
        self.as_u256().partial_cmp(&other.0)
    }
}

impl PartialEq<block::Hash> for ExpandedDifficulty {
    fn eq(&self, other: &block::Hash) -> bool {
        other == self
    }
}

impl PartialOrd<block::Hash> for ExpandedDifficulty {
    fn partial_cmp(&self, other: &block::Hash) -> Option<Ordering> {
        other.partial_cmp(self).map(Ordering::reverse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_and_repack_is_stable() {
        for bits in [0x1d00_ffffu32, 0x1e00_ffff, 0x2000_ffff, 0x207f_ffff] {
            let expanded = CompactDifficulty(bits).to_expanded().expect("valid bits");
            assert_eq!(expanded.to_compact(), CompactDifficulty(bits));
        }
    }

    #[test]
    fn invalid_compact_values() {
        // Zero mantissa, sign bit, and oversized exponents are all invalid.
        assert_eq!(CompactDifficulty(0).to_expanded(), None);
        assert_eq!(CompactDifficulty(0x1d80_0000).to_expanded(), None);
        assert_eq!(CompactDifficulty(0xff00_ffff).to_expanded(), None);
    }

    #[test]
    fn hash_orders_against_target() {
        let target = CompactDifficulty(0x2000_ffff).to_expanded().unwrap();
        let low = block::Hash([0u8; 32]);
        let mut high_bytes = [0u8; 32];
        high_bytes[0] = 0xff;
        let high = block::Hash(high_bytes);

        assert!(low < target);
        assert!(high > target);
    }

    #[test]
    fn work_is_inverse_to_target() {
        let easy = CompactDifficulty(0x207f_ffff).to_work().unwrap();
        let hard = CompactDifficulty(0x1d00_ffff).to_work().unwrap();
        assert!(hard > easy);
        assert!(easy.value() > 0);
    }

    #[test]
    fn rescale_clamps_at_limit() {
        let limit = CompactDifficulty(0x207f_ffff).to_expanded().unwrap();
        let target = CompactDifficulty(0x2000_ffff).to_expanded().unwrap();
        let scaled = target.rescale(4, 1, limit);
        assert!(scaled <= limit);
        assert!(scaled > target);
    }
}
