// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The tree navigator (C2, §4.2): descends the internal-page directory to
//! locate a leaf from a key bound, or to the rightmost leaf.

use crate::comparator::DynComparator;
use crate::error::{Error, Result};
use crate::page::header::PageKind;
use crate::page::internal::InternalPage;
use crate::page::leaf::LeafPayload;
use crate::pagefile::PageFile;
use std::cmp::Ordering;

/// A located leaf: its block number and the 1-based logical row offset a
/// search landed on within it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LeafPosition {
    /// The leaf's block number.
    pub blkno: u32,
    /// 1-based logical row offset within the leaf.
    pub offset: u16,
}

/// Descends the directory from the root to a leaf.
pub struct TreeNavigator<'a> {
    file: &'a PageFile,
    key_len: usize,
    comparator: &'a DynComparator,
}

impl<'a> TreeNavigator<'a> {
    /// Creates a navigator bound to an open page file.
    #[must_use]
    pub fn new(file: &'a PageFile, key_len: usize, comparator: &'a DynComparator) -> Self {
        Self {
            file,
            key_len,
            comparator,
        }
    }

    fn root_blkno(&self) -> Result<u32> {
        let meta = self.file.metapage();
        if meta.is_empty() {
            return Err(Error::FormatViolation("tree is empty; no root to descend from"));
        }
        Ok(meta.root_blkno)
    }

    /// Descends from the root to the leaf block that contains (or would
    /// contain) `bound`.
    fn descend_to_leaf(&self, bound: &[u8]) -> Result<u32> {
        let mut blkno = self.root_blkno()?;
        loop {
            let page = self.file.read_page(blkno)?;
            match page.trailer.kind {
                PageKind::Leaf => return Ok(blkno),
                PageKind::Internal => {
                    let internal = InternalPage::parse(&page.payload, self.key_len)?;
                    let idx = internal.descend_for(bound, self.comparator);
                    blkno = internal
                        .entries()
                        .get(idx)
                        .ok_or(Error::FormatViolation("internal page entry index out of range"))?
                        .child;
                }
            }
        }
    }

    /// Finds the leaf block containing the first key `>= bound`, or the
    /// rightmost leaf if no key qualifies (§4.2).
    pub fn find_first_leaf(&self, bound: &[u8]) -> Result<u32> {
        self.descend_to_leaf(bound)
    }

    /// Descends to the rightmost leaf, following the last entry at each level.
    pub fn rightmost_leaf(&self) -> Result<u32> {
        let mut blkno = self.root_blkno()?;
        loop {
            let page = self.file.read_page(blkno)?;
            match page.trailer.kind {
                PageKind::Leaf => return Ok(blkno),
                PageKind::Internal => {
                    let internal = InternalPage::parse(&page.payload, self.key_len)?;
                    blkno = internal
                        .entries()
                        .last()
                        .ok_or(Error::FormatViolation("internal page has no entries"))?
                        .child;
                }
            }
        }
    }

    /// Binary-searches within leaf `blkno` for the first logical row whose
    /// key is `>= bound` (or `> bound` if `strict`). Returns `None` if every
    /// key in the leaf is below the bound.
    pub fn seek_within_leaf(&self, blkno: u32, bound: &[u8], strict: bool) -> Result<Option<u16>> {
        let page = self.file.read_page(blkno)?;
        let payload = LeafPayload::parse(page.payload.clone(), self.key_len, leaf_include_layout(self))?;
        let n = payload.n();
        if n == 0 {
            return Ok(None);
        }

        let mut lo = 1u16;
        let mut hi = n;
        let accept = |ord: Ordering| if strict { ord == Ordering::Greater } else { ord != Ordering::Less };

        // Check whether any position satisfies the predicate at all.
        let last_key = payload.keyptr(n)?;
        if !accept(self.comparator.compare(&last_key, bound)) {
            return Ok(None);
        }

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let key = payload.keyptr(mid)?;
            if accept(self.comparator.compare(&key, bound)) {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok(Some(lo))
    }

    /// Binary-searches within leaf `blkno` for the last logical row whose
    /// key is `<= bound`. Returns `None` if every key exceeds the bound.
    pub fn seek_within_leaf_backward(&self, blkno: u32, bound: &[u8]) -> Result<Option<u16>> {
        let page = self.file.read_page(blkno)?;
        let payload = LeafPayload::parse(page.payload.clone(), self.key_len, leaf_include_layout(self))?;
        let n = payload.n();
        if n == 0 {
            return Ok(None);
        }

        let first_key = payload.keyptr(1)?;
        if self.comparator.compare(&first_key, bound) == Ordering::Greater {
            return Ok(None);
        }

        let mut lo = 1u16;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            let key = payload.keyptr(mid)?;
            if self.comparator.compare(&key, bound) != Ordering::Greater {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        Ok(Some(lo))
    }

    /// Finds the exclusive end position for an upper bound: the first
    /// logical row exceeding `upper_bound` (`>` if `strict`, `>=` otherwise),
    /// walking one sibling forward if the leaf that contains `upper_bound`
    /// has no such row (§4.2).
    pub fn find_end_position(&self, upper_bound: &[u8], strict: bool) -> Result<Option<LeafPosition>> {
        let blkno = self.descend_to_leaf(upper_bound)?;
        if let Some(offset) = self.seek_within_leaf(blkno, upper_bound, !strict)? {
            return Ok(Some(LeafPosition { blkno, offset }));
        }

        let page = self.file.read_page(blkno)?;
        let rightlink = page.trailer.rightlink;
        if rightlink == crate::page::header::INVALID_BLOCK {
            return Ok(None);
        }
        Ok(Some(LeafPosition {
            blkno: rightlink,
            offset: 1,
        }))
    }
}

/// INCLUDE layout isn't needed for key-only navigation; the navigator only
/// ever reads keys, never INCLUDE bytes.
fn leaf_include_layout(_nav: &TreeNavigator<'_>) -> crate::page::leaf::IncludeLayout {
    crate::page::leaf::IncludeLayout::none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::CLocaleComparator;
    use crate::key::MAX_INCLUDE_COLUMNS;
    use crate::page::header::{PageTrailer, INVALID_BLOCK};
    use crate::page::internal::{pack_internal, InternalEntry};
    use crate::page::leaf::pack_plain;
    use crate::page::metapage::Metapage;
    use crate::page::zonemap::ZoneMap;
    use crate::pagefile::PageFileWriter;
    use crate::slice::Slice;
    use std::sync::Arc;
    use test_log::test;

    fn key(v: u32) -> Slice {
        Slice::from(v.to_be_bytes().as_slice())
    }

    /// Builds a tiny two-level tree: one internal root over two leaves,
    /// leaves = {1,2,3} and {4,5,6}.
    fn build_two_leaf_tree(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("tree.smol");
        let mut writer = PageFileWriter::create(&path).unwrap();

        let leaf_a = pack_plain(&[key(1), key(2), key(3)], &[]);
        let leaf_b = pack_plain(&[key(4), key(5), key(6)], &[]);

        let blk_a = writer.append_page(&leaf_a, &PageTrailer::new_leaf()).unwrap();
        let blk_b = writer.append_page(&leaf_b, &PageTrailer::new_leaf()).unwrap();
        writer
            .rewrite_trailer(
                blk_a,
                &PageTrailer {
                    kind: crate::page::header::PageKind::Leaf,
                    rightlink: blk_b,
                    leftlink: INVALID_BLOCK,
                },
            )
            .unwrap();
        writer
            .rewrite_trailer(
                blk_b,
                &PageTrailer {
                    kind: crate::page::header::PageKind::Leaf,
                    rightlink: INVALID_BLOCK,
                    leftlink: blk_a,
                },
            )
            .unwrap();

        let entries = vec![
            InternalEntry {
                highkey: key(3),
                child: blk_a,
                zone_map: ZoneMap::from_leaf([&*key(1), &*key(2), &*key(3)].into_iter(), 3, 3),
            },
            InternalEntry {
                highkey: key(6),
                child: blk_b,
                zone_map: ZoneMap::from_leaf([&*key(4), &*key(5), &*key(6)].into_iter(), 3, 3),
            },
        ];
        let root_bytes = pack_internal(&entries);
        let root_blk = writer.append_page(&root_bytes, &PageTrailer::new_internal()).unwrap();

        let metapage = Metapage {
            root_blkno: root_blk,
            height: 2,
            ..Metapage::empty(1, 4, 0, [0; MAX_INCLUDE_COLUMNS], 0, 0)
        };
        writer.commit_metapage(&metapage).unwrap();
        path
    }

    #[test]
    fn find_first_leaf_descends_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_two_leaf_tree(dir.path());
        let pf = crate::pagefile::PageFile::open(&path).unwrap();
        let cmp: DynComparator = Arc::new(CLocaleComparator);
        let nav = TreeNavigator::new(&pf, 4, &cmp);

        let leaf = nav.find_first_leaf(&key(5)).unwrap();
        let page = pf.read_page(leaf).unwrap();
        let payload = LeafPayload::parse(page.payload.clone(), 4, crate::page::leaf::IncludeLayout::none()).unwrap();
        assert_eq!(payload.first_key().unwrap(), key(4));
    }

    #[test]
    fn bound_above_all_keys_lands_on_rightmost_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_two_leaf_tree(dir.path());
        let pf = crate::pagefile::PageFile::open(&path).unwrap();
        let cmp: DynComparator = Arc::new(CLocaleComparator);
        let nav = TreeNavigator::new(&pf, 4, &cmp);

        let leaf = nav.find_first_leaf(&key(999)).unwrap();
        assert_eq!(leaf, nav.rightmost_leaf().unwrap());
    }

    #[test]
    fn find_end_position_walks_sibling_when_leaf_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_two_leaf_tree(dir.path());
        let pf = crate::pagefile::PageFile::open(&path).unwrap();
        let cmp: DynComparator = Arc::new(CLocaleComparator);
        let nav = TreeNavigator::new(&pf, 4, &cmp);

        // Upper bound 3, non-strict: end position is exclusive, so it should
        // land on the first row of the next leaf (key 4).
        let end = nav.find_end_position(&key(3), false).unwrap().unwrap();
        let page = pf.read_page(end.blkno).unwrap();
        let payload = LeafPayload::parse(page.payload.clone(), 4, crate::page::leaf::IncludeLayout::none()).unwrap();
        assert_eq!(payload.keyptr(end.offset).unwrap(), key(4));
    }
}
