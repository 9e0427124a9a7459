// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The core is generic over a 3-way byte comparator (§9 "Comparator
//! abstraction"). Per-type comparator resolution belongs to the host; SMOL
//! only fast-paths fixed-width integers and C-locale byte comparison.

use std::cmp::Ordering;
use std::sync::Arc;

/// A 3-way comparator over raw key bytes.
///
/// Implementations are free to assume both slices have the schema's fixed
/// key width; the core never compares differently-sized keys.
pub trait Comparator: Send + Sync {
    /// Compares two encoded keys.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Whether this comparator treats keys as fixed-width integers.
    ///
    /// Only consulted by [`KeyRleVersion::Auto`](crate::config::KeyRleVersion::Auto)
    /// to pick a default key-RLE tag; it has no effect on comparison itself.
    fn is_integer_like(&self) -> bool {
        false
    }
}

/// Shared handle to a comparator, bound once at build/open time.
pub type DynComparator = Arc<dyn Comparator>;

/// Byte-wise comparison, equivalent to C-locale (`memcmp`) ordering.
///
/// The correct comparator for short-text keys and the fallback for any key
/// shape the host doesn't special-case.
#[derive(Debug, Clone, Copy, Default)]
pub struct CLocaleComparator;

impl Comparator for CLocaleComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Fixed-width big-endian integer comparison fast path.
///
/// Keys are stored big-endian so that byte-wise comparison already agrees
/// with integer comparison; this comparator exists to make that contract
/// explicit and to let callers opt into it instead of falling back to
/// generic byte comparison for integer keys.
#[derive(Debug, Clone, Copy)]
pub struct IntegerComparator {
    width: usize,
}

impl IntegerComparator {
    /// Creates a comparator for big-endian integers of the given byte width
    /// (1, 2, 4, or 8).
    ///
    /// # Panics
    ///
    /// Panics if `width` is not one of 1, 2, 4, 8.
    #[must_use]
    pub fn new(width: usize) -> Self {
        assert!(
            matches!(width, 1 | 2 | 4 | 8),
            "integer key width must be 1, 2, 4, or 8 bytes"
        );
        Self { width }
    }
}

impl Comparator for IntegerComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        debug_assert_eq!(a.len(), self.width);
        debug_assert_eq!(b.len(), self.width);
        a.cmp(b)
    }

    fn is_integer_like(&self) -> bool {
        true
    }
}

/// Encodes a signed integer as a sign-flipped big-endian byte array, so that
/// unsigned byte-wise comparison reproduces signed integer ordering.
///
/// Used by the builder's internal integer sort paths (§4.3) and by callers
/// constructing keys for an `IntegerComparator`-backed schema.
#[must_use]
pub fn encode_i64_ordered(value: i64) -> [u8; 8] {
    ((value as u64) ^ (1 << 63)).to_be_bytes()
}

/// Inverse of [`encode_i64_ordered`].
#[must_use]
pub fn decode_i64_ordered(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ (1 << 63)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn c_locale_matches_memcmp() {
        let cmp = CLocaleComparator;
        assert_eq!(cmp.compare(b"apple", b"banana"), Ordering::Less);
        assert_eq!(cmp.compare(b"banana", b"banana"), Ordering::Equal);
    }

    #[test]
    fn signed_int_ordering_roundtrip() {
        let mut values = vec![-100i64, -1, 0, 1, 100, i64::MIN, i64::MAX];
        let encoded: Vec<[u8; 8]> = values.iter().copied().map(encode_i64_ordered).collect();

        let mut sorted_by_bytes = encoded.clone();
        sorted_by_bytes.sort_unstable();

        values.sort_unstable();
        let expected: Vec<[u8; 8]> = values.iter().copied().map(encode_i64_ordered).collect();

        assert_eq!(sorted_by_bytes, expected);

        for v in values {
            assert_eq!(decode_i64_ordered(encode_i64_ordered(v)), v);
        }
    }

    #[test]
    fn integer_comparator_agrees_with_decoded_order() {
        let cmp = IntegerComparator::new(8);
        let a = encode_i64_ordered(-5);
        let b = encode_i64_ordered(5);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
    }
}
