// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Internal directory pages (§3 "Internal page", §4.2 "Tree Navigator").
//!
//! An internal page is an ordered sequence of `{highkey, child, zone-map}`
//! entries. `highkey` is the maximum key in the subtree rooted at `child`; a
//! subtree search picks the leftmost entry whose `highkey` is `>=` the probe
//! key, falling back to the rightmost entry if none qualifies.

use crate::comparator::DynComparator;
use crate::error::{Error, Result};
use crate::page::zonemap::ZoneMap;
use crate::slice::Slice;
use byteorder::{BigEndian, ByteOrder};

/// One directory entry: the highest key in, and the child block of, one
/// subtree.
#[derive(Clone, Debug)]
pub struct InternalEntry {
    /// Maximum key in the subtree rooted at `child`.
    pub highkey: Slice,
    /// Block number of the child page (leaf or internal, one level down).
    pub child: u32,
    /// Aggregated statistics for the subtree.
    pub zone_map: ZoneMap,
}

/// A parsed internal page.
#[derive(Clone, Debug)]
pub struct InternalPage {
    key_len: usize,
    entries: Vec<InternalEntry>,
}

impl InternalPage {
    /// Parses an internal page's payload bytes.
    pub fn parse(bytes: &[u8], key_len: usize) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::FormatViolation("internal page shorter than its header"));
        }
        let nentries = BigEndian::read_u16(&bytes[0..2]);
        let entry_len = key_len + std::mem::size_of::<u32>() + ZoneMap::SERIALIZED_LEN;

        let mut offset = 2;
        let mut entries = Vec::with_capacity(usize::from(nentries));
        for _ in 0..nentries {
            if bytes.len() < offset + entry_len {
                return Err(Error::FormatViolation("internal page entry truncated"));
            }
            let highkey = Slice::from(&bytes[offset..offset + key_len]);
            offset += key_len;
            let child = BigEndian::read_u32(&bytes[offset..offset + 4]);
            offset += 4;
            let zone_map = ZoneMap::decode_from(&mut &bytes[offset..offset + ZoneMap::SERIALIZED_LEN])
                .map_err(|_| Error::FormatViolation("internal page zone map undecodable"))?;
            offset += ZoneMap::SERIALIZED_LEN;
            entries.push(InternalEntry {
                highkey,
                child,
                zone_map,
            });
        }

        Ok(Self { key_len, entries })
    }

    /// The page's entries, in ascending highkey order.
    #[must_use]
    pub fn entries(&self) -> &[InternalEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the page has no entries (never true for a committed build).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the leftmost entry whose `highkey >= probe`, falling back to the
    /// last entry if every `highkey < probe` (§4.2).
    #[must_use]
    pub fn descend_for(&self, probe: &[u8], comparator: &DynComparator) -> usize {
        let mut lo = 0usize;
        let mut hi = self.entries.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if comparator.compare(&self.entries[mid].highkey, probe) == std::cmp::Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == self.entries.len() {
            self.entries.len() - 1
        } else {
            lo
        }
    }

    /// The aggregate zone map for this page's whole subtree, for building
    /// the next level up.
    #[must_use]
    pub fn aggregate_zone_map(&self) -> ZoneMap {
        ZoneMap::aggregate(self.entries.iter().map(|e| &e.zone_map))
    }

    /// The page's own highkey: the last entry's highkey.
    pub fn highkey(&self) -> Result<&Slice> {
        self.entries
            .last()
            .map(|e| &e.highkey)
            .ok_or(Error::FormatViolation("internal page has no entries"))
    }
}

/// Packs an internal page's payload from its entries.
///
/// # Panics
///
/// Panics if `entries` has more than `u16::MAX` elements.
#[must_use]
pub fn pack_internal(entries: &[InternalEntry]) -> Vec<u8> {
    assert!(entries.len() <= usize::from(u16::MAX), "too many internal entries for one page");
    let mut out = Vec::new();
    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for entry in entries {
        out.extend_from_slice(&entry.highkey);
        out.extend_from_slice(&entry.child.to_be_bytes());
        out.extend_from_slice(&entry.zone_map.encode_into_vec());
    }
    out
}

use crate::coding::{Decode, Encode};
