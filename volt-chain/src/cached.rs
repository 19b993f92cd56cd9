//! Memoisation support for hash-carrying structures.

use crate::{SerializationError, WireDeserialize, WireSerialize};

/// A lazily-filled slot for a derived value, invisible to the wire encoding.
///
/// Header and transaction hashes are worth keeping around once computed, but
/// they are derived from the very bytes they would sit next to, so they must
/// never reach the wire: a populated and an unpopulated slot have to produce
/// identical encodings, or the hash would change the data it hashes.
/// `Cached` guarantees that by writing nothing and reading nothing.
#[derive(Clone, Copy, Eq, Serialize, Deserialize)]
pub struct Cached<T: Copy>(Option<T>);

impl<T: Copy> Cached<T> {
    /// A slot with nothing in it. Hand-assembled structures start here and
    /// recompute the derived value whenever it is asked for.
    pub fn new() -> Cached<T> {
        Cached(None)
    }

    /// A slot holding an already-computed value. Deserializers use this:
    /// they have the raw bytes in hand, so that is the cheapest moment to
    /// derive the value once and for all.
    pub fn filled(value: T) -> Cached<T> {
        Cached(Some(value))
    }

    /// The stored value, or `None` if the owner must recompute it.
    pub fn get(&self) -> Option<T> {
        self.0
    }
}

/// Equality ignores a slot that has not been filled.
///
/// A memo records how a value was obtained, not what the owning structure
/// is: a hand-built header and the same header read back from disk differ
/// only in their slots, and the two must compare equal. Two *filled* slots
/// do participate in the comparison, since they can only disagree when the
/// surrounding data disagrees.
impl<T: Copy + PartialEq> PartialEq for Cached<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => true,
        }
    }
}

impl<T: Copy + std::fmt::Debug> std::fmt::Debug for Cached<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(value) => write!(f, "Cached({:?})", value),
            None => f.write_str("Cached(empty)"),
        }
    }
}

/// Contributes no bytes, so a slot can sit in any wire structure without
/// changing its encoding or its hash.
impl<T: Copy> WireSerialize for Cached<T> {
    fn wire_serialize<W: std::io::Write>(&self, _target: W) -> Result<(), std::io::Error> {
        Ok(())
    }
}

/// Consumes no bytes. A deserializer that wants a filled slot builds one
/// with [`Cached::filled`] after hashing the raw input it just read.
impl<T: Copy> WireDeserialize for Cached<T> {
    fn wire_deserialize<R: std::io::Read>(_reader: R) -> Result<Self, SerializationError> {
        Ok(Cached(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slots_never_break_equality() {
        assert_eq!(Cached::<u32>::new(), Cached::new());
        assert_eq!(Cached::new(), Cached::filled(7));
        assert_eq!(Cached::filled(7), Cached::new());
        assert_eq!(Cached::filled(7), Cached::filled(7));
        assert_ne!(Cached::filled(7), Cached::filled(8));
    }

    #[test]
    fn slots_serialize_to_nothing() {
        let bytes = Cached::filled(7u32).wire_serialize_to_vec().unwrap();
        assert!(bytes.is_empty());
    }
}
