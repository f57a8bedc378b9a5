//! Fixed-width keys and the externally supplied comparator.
//!
//! Spec §3 deliberately keeps key/value type families out of the CORE's
//! scope: the tree only needs a fixed encoded width and a three-way
//! comparator, supplied by whoever instantiates it, rather than a closed
//! `IndexKey`/`KeyType` enum hard-coding `Integer`/`Varchar` and baking in
//! variable-length keys, a spec Non-goal.

use std::cmp::Ordering;

/// A key that can live in a fixed-width on-page slot.
///
/// `ENCODED_LEN` is the exact number of bytes every instance serializes to;
/// the layout code relies on this being constant so slot strides are fixed.
pub trait FixedKey: Clone + Send + Sync + 'static {
    const ENCODED_LEN: usize;

    fn encode(&self, out: &mut [u8]);
    fn decode(bytes: &[u8]) -> Self;
}

/// A three-way comparator, supplied externally to the tree (spec §3: "fixed-
/// width, totally ordered via an externally supplied three-way comparator").
/// Keeping this separate from `Ord` lets two trees over the same key type
/// order keys differently (e.g. a case-insensitive collation).
pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// The natural comparator for any `Ord` key.
#[derive(Debug, Default, Clone, Copy)]
pub struct NaturalOrder;

impl<K: Ord> KeyComparator<K> for NaturalOrder {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

macro_rules! impl_fixed_key_for_int {
    ($t:ty, $len:literal) => {
        impl FixedKey for $t {
            const ENCODED_LEN: usize = $len;

            fn encode(&self, out: &mut [u8]) {
                out[..$len].copy_from_slice(&self.to_be_bytes());
            }

            fn decode(bytes: &[u8]) -> Self {
                <$t>::from_be_bytes(bytes[..$len].try_into().unwrap())
            }
        }
    };
}

// Big-endian encoding so that unsigned integer byte order matches numeric
// order, which is a handy property for anyone building a raw-byte-compare
// comparator on top of this; the tree itself never compares bytes directly.
impl_fixed_key_for_int!(i32, 4);
impl_fixed_key_for_int!(i64, 8);
impl_fixed_key_for_int!(u32, 4);
impl_fixed_key_for_int!(u64, 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32_round_trips() {
        let mut buf = [0u8; 4];
        (-7i32).encode(&mut buf);
        assert_eq!(i32::decode(&buf), -7);
    }

    #[test]
    fn u64_round_trips() {
        let mut buf = [0u8; 8];
        42u64.encode(&mut buf);
        assert_eq!(u64::decode(&buf), 42);
    }

    #[test]
    fn natural_order_matches_ord() {
        let cmp = NaturalOrder;
        assert_eq!(cmp.compare(&1i32, &2i32), Ordering::Less);
        assert_eq!(cmp.compare(&2i32, &1i32), Ordering::Greater);
        assert_eq!(cmp.compare(&5i32, &5i32), Ordering::Equal);
    }
}
