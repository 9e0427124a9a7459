// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-subtree zone maps (§3 "Zone map", §4.5).
//!
//! Zone maps are advisory pruning hints, aggregated bottom-up as an internal
//! page is built. No scan correctness decision may depend on them (§9 open
//! question).

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Number of leading key bytes a zone map's `minkey`/`maxkey` retain.
///
/// Integer keys up to 4 bytes are carried in full; wider integers and text
/// keys are truncated to this prefix, matching §3's "first 4 bytes of the
/// key (truncated) or the full integer".
pub const ZONE_KEY_PREFIX: usize = 4;

/// Number of double-hash rounds used by the fixed 64-bit Bloom filter.
///
/// A single 64-bit word gives little room for a low false-positive rate
/// regardless of `k`; 4 is the teacher's own default-ish middle ground
/// between probe cost and saturation once a leaf holds more than a handful
/// of distinct keys.
const BLOOM_HASH_ROUNDS: u64 = 4;

/// Aggregated statistics for one subtree, stored alongside its `highkey` in
/// an internal entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneMap {
    /// Truncated/padded minimum leading-key prefix in the subtree.
    pub minkey: [u8; ZONE_KEY_PREFIX],
    /// Truncated/padded maximum leading-key prefix in the subtree.
    pub maxkey: [u8; ZONE_KEY_PREFIX],
    /// Total row count in the subtree.
    pub row_count: u32,
    /// Approximate distinct leading-key count, saturating at `u16::MAX`.
    pub distinct_count: u16,
    /// 64-bit Bloom filter over distinct leading-key values in the subtree.
    pub bloom_filter: u64,
}

impl ZoneMap {
    /// Serialized size in bytes, including the reserved padding named in §3.
    pub const SERIALIZED_LEN: usize = ZONE_KEY_PREFIX * 2
        + std::mem::size_of::<u32>()
        + std::mem::size_of::<u16>()
        + std::mem::size_of::<u64>()
        + PADDING_LEN;

    /// A zone map with no observations yet.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            minkey: [0xFF; ZONE_KEY_PREFIX],
            maxkey: [0x00; ZONE_KEY_PREFIX],
            row_count: 0,
            distinct_count: 0,
            bloom_filter: 0,
        }
    }

    /// Builds a zone map from one leaf's observations: every key in the
    /// leaf (for Bloom membership and min/max) and its row/distinct counts.
    pub fn from_leaf<'a>(keys: impl Iterator<Item = &'a [u8]>, row_count: u32, distinct_count: u16) -> Self {
        let mut zm = Self::empty();
        zm.row_count = row_count;
        zm.distinct_count = distinct_count;
        for key in keys {
            let prefix = key_prefix(key);
            if prefix < zm.minkey {
                zm.minkey = prefix;
            }
            if prefix > zm.maxkey {
                zm.maxkey = prefix;
            }
            zm.bloom_filter |= bloom_bits(key);
        }
        zm
    }

    /// Componentwise-aggregates a set of child zone maps into their parent's.
    pub fn aggregate<'a>(children: impl Iterator<Item = &'a ZoneMap>) -> Self {
        let mut agg = Self::empty();
        for child in children {
            if child.minkey < agg.minkey {
                agg.minkey = child.minkey;
            }
            if child.maxkey > agg.maxkey {
                agg.maxkey = child.maxkey;
            }
            agg.row_count = agg.row_count.saturating_add(child.row_count);
            agg.distinct_count = agg.distinct_count.saturating_add(child.distinct_count);
            agg.bloom_filter |= child.bloom_filter;
        }
        agg
    }

    /// Returns `true` if `key`'s prefix falls within `[minkey, maxkey]`.
    ///
    /// Advisory only — a `true` result does not guarantee the key is
    /// present; a caller must never skip the authoritative tree descent.
    #[must_use]
    pub fn may_contain_range(&self, key: &[u8]) -> bool {
        let prefix = key_prefix(key);
        prefix >= self.minkey && prefix <= self.maxkey
    }

    /// Returns `true` if `key` may be a member, per the Bloom filter.
    /// Never false-negative; may false-positive.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.bloom_filter & bloom_bits(key) == bloom_bits(key)
    }
}

const PADDING_LEN: usize = 2;

fn key_prefix(key: &[u8]) -> [u8; ZONE_KEY_PREFIX] {
    let mut prefix = [0u8; ZONE_KEY_PREFIX];
    let n = key.len().min(ZONE_KEY_PREFIX);
    prefix[..n].copy_from_slice(&key[..n]);
    prefix
}

fn bloom_bits(key: &[u8]) -> u64 {
    let h0 = xxhash_rust::xxh3::xxh3_128(key);
    let (mut h1, mut h2) = ((h0 >> 64) as u64, h0 as u64);
    let mut bits = 0u64;
    for i in 0..BLOOM_HASH_ROUNDS {
        bits |= 1 << (h1 % 64);
        h1 = h1.wrapping_add(h2);
        h2 = h2.wrapping_add(i);
    }
    bits
}

impl Encode for ZoneMap {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&self.minkey)?;
        writer.write_all(&self.maxkey)?;
        writer.write_u32::<BigEndian>(self.row_count)?;
        writer.write_u16::<BigEndian>(self.distinct_count)?;
        writer.write_u64::<BigEndian>(self.bloom_filter)?;
        writer.write_all(&[0u8; PADDING_LEN])?;
        Ok(())
    }
}

impl Decode for ZoneMap {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut minkey = [0u8; ZONE_KEY_PREFIX];
        reader.read_exact(&mut minkey)?;
        let mut maxkey = [0u8; ZONE_KEY_PREFIX];
        reader.read_exact(&mut maxkey)?;
        let row_count = reader.read_u32::<BigEndian>()?;
        let distinct_count = reader.read_u16::<BigEndian>()?;
        let bloom_filter = reader.read_u64::<BigEndian>()?;
        let mut padding = [0u8; PADDING_LEN];
        reader.read_exact(&mut padding)?;
        Ok(Self {
            minkey,
            maxkey,
            row_count,
            distinct_count,
            bloom_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_log::test;

    #[test]
    fn roundtrip() {
        let zm = ZoneMap::from_leaf([b"aaaa".as_slice(), b"zzzz".as_slice()].into_iter(), 2, 2);
        let bytes = zm.encode_into_vec();
        assert_eq!(bytes.len(), ZoneMap::SERIALIZED_LEN);
        let decoded = ZoneMap::decode_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(zm, decoded);
    }

    #[test]
    fn aggregate_takes_componentwise_extremes_and_sums() {
        let a = ZoneMap::from_leaf([b"bbbb".as_slice()].into_iter(), 10, 1);
        let b = ZoneMap::from_leaf([b"aaaa".as_slice(), b"cccc".as_slice()].into_iter(), 20, 2);
        let parent = ZoneMap::aggregate([&a, &b].into_iter());
        assert_eq!(parent.minkey, *b"aaaa");
        assert_eq!(parent.maxkey, *b"cccc");
        assert_eq!(parent.row_count, 30);
        assert_eq!(parent.distinct_count, 3);
    }

    #[test]
    fn distinct_count_saturates() {
        let mut a = ZoneMap::empty();
        a.distinct_count = u16::MAX;
        let mut b = ZoneMap::empty();
        b.distinct_count = 10;
        let parent = ZoneMap::aggregate([&a, &b].into_iter());
        assert_eq!(parent.distinct_count, u16::MAX);
    }

    #[test]
    fn bloom_never_false_negative() {
        let zm = ZoneMap::from_leaf([b"hello".as_slice()].into_iter(), 1, 1);
        assert!(zm.may_contain(b"hello"));
    }

    #[test]
    fn range_check_respects_min_max() {
        let zm = ZoneMap::from_leaf([b"mmmm".as_slice()].into_iter(), 1, 1);
        assert!(zm.may_contain_range(b"mmmm"));
        assert!(!zm.may_contain_range(b"aaaa"));
        assert!(!zm.may_contain_range(b"zzzz"));
    }
}
