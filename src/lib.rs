// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A space-efficient, read-only ordered index for fixed-width and
//! short-text keys.
//!
//! ##### About
//!
//! An index is built once, in a single streaming pass over caller-sorted
//! rows, and is immutable afterward: there is no insert, update, or delete
//! path. In exchange for giving up mutation, the on-disk representation can
//! run-length-encode duplicate keys, pack rows into dense fixed-width pages,
//! and scan a leaf chain without ever touching a lock.
//!
//! Pages are 8 KiB, sibling-linked for range scans in either direction, and
//! checksummed individually so a corrupted block is caught at read time
//! instead of silently returned. A small per-leaf zone map (min/max/count,
//! plus a 64-bit bloom filter) lets a scan or parallel worker skip leaves
//! that provably can't match, without that skip ever being load-bearing for
//! correctness.
//!
//! # Example usage
//!
//! ```
//! use smol_index::{Builder, ColumnSpec, Config, IntegerComparator, Row, Schema, ScanBounds, Slice};
//! use std::sync::Arc;
//! #
//! # let dir = tempfile::tempdir()?;
//! # let path = dir.path().join("scores.smol");
//!
//! let schema = Schema::new(
//!     vec![ColumnSpec::fixed(4)],
//!     vec![],
//!     Arc::new(IntegerComparator::new(4)),
//! )?;
//!
//! let rows = (1..=10).map(|k: i32| Row::new(vec![Slice::from(k.to_be_bytes().as_slice())], vec![]));
//! Builder::create(&path, schema.clone(), Config::new())?.build(rows)?;
//!
//! let index = smol_index::Index::open(&path, schema)?;
//! let seen: Vec<_> = index
//!     .scan(ScanBounds::unbounded())?
//!     .map(|t| t.map(|tuple| tuple.key))
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(seen.len(), 10);
//! #
//! # Ok::<(), smol_index::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod builder;
mod coding;
mod comparator;
mod config;
mod error;
mod key;
mod page;
mod pagefile;
mod parallel;
mod scan;
mod slice;
mod tree;

use std::path::Path;
use std::sync::Arc;

pub use builder::Builder;
pub use comparator::{decode_i64_ordered, encode_i64_ordered, CLocaleComparator, Comparator, DynComparator, IntegerComparator};
pub use config::{Config, KeyRleVersion};
pub use error::{Error, Result};
pub use key::{ColumnSpec, Row, Schema, MAX_INCLUDE_COLUMNS, MAX_KEY_WIDTH};
pub use pagefile::{PageFile, DEFAULT_CACHE_BYTES};
pub use scan::{Bound, CancellationToken, Direction, ParallelWorker, Scan, ScanBounds, Tuple};
pub use slice::Slice;

/// A read-only handle to a built index: the open page file paired with the
/// schema needed to interpret its keys and INCLUDE tuples.
///
/// The metapage alone doesn't carry a comparator (§3's `collation_oid` is an
/// opaque host identifier), so [`Index::open`] takes the schema the index
/// was built with rather than reconstructing it. Column widths are still
/// cross-checked against the metapage so an accidental schema/file mismatch
/// is caught at open time instead of surfacing as silent corruption later.
pub struct Index {
    file: PageFile,
    schema: Schema,
    config: Config,
}

impl Index {
    /// Builds a fresh index at `path` from a caller-sorted row stream, then
    /// opens it for scanning.
    pub fn build(path: &Path, schema: Schema, config: Config, rows: impl IntoIterator<Item = Row>) -> Result<Self> {
        Builder::create(path, schema.clone(), config.clone())?.build(rows)?;
        Self::open(path, schema)
    }

    /// Opens a previously built index, validating that `schema` agrees with
    /// the file's metapage.
    pub fn open(path: &Path, schema: Schema) -> Result<Self> {
        Self::open_with_config(path, schema, Config::new())
    }

    /// Opens a previously built index with explicit scan-time tunables
    /// (prefetch depth, parallel claim batch).
    pub fn open_with_config(path: &Path, schema: Schema, config: Config) -> Result<Self> {
        let file = PageFile::open(path)?;
        let meta = file.metapage();
        if !meta.is_empty() {
            if usize::from(meta.nkeyatts) != schema.key_column_count() {
                return Err(Error::FormatViolation("metapage key-column count disagrees with schema"));
            }
            if meta.key_len1 as usize != schema.key_columns()[0].width as usize {
                return Err(Error::FormatViolation("metapage leading key width disagrees with schema"));
            }
        }
        Ok(Self { file, schema, config })
    }

    /// This index's schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Whether this index has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file.metapage().is_empty()
    }

    /// Opens a forward (ascending) scan over `bounds`.
    pub fn scan(&self, bounds: ScanBounds) -> Result<Scan<'_>> {
        Scan::forward(&self.file, &self.schema, self.schema.comparator(), &self.config, bounds)
    }

    /// Opens a backward (descending) scan over `bounds`.
    pub fn scan_backward(&self, bounds: ScanBounds) -> Result<Scan<'_>> {
        Scan::backward(&self.file, &self.schema, self.schema.comparator(), &self.config, bounds)
    }

    /// Builds `worker_count` [`ParallelWorker`]s sharing one claim counter
    /// over `bounds` (§4.6). Every row in range is produced by exactly one
    /// worker, in no particular cross-worker order; within a worker's own
    /// stream, rows still come out in ascending key order.
    ///
    /// `bounds` is enforced the same way [`Self::scan`] enforces it: the
    /// claim counter's starting leaf is descended to via `bounds.lower`
    /// instead of the whole index's first leaf, and every worker stops a
    /// claimed span early once a row exceeds `bounds.upper`, rather than
    /// draining leaves past the range. `bounds.second_key_eq`, if given, is
    /// applied the same way — rows failing it are skipped rather than
    /// returned as a recheck.
    pub fn parallel_scan(&self, worker_count: u32, bounds: ScanBounds) -> Result<Vec<ParallelWorker<'_>>> {
        let claim_counter = Arc::new(parallel::ClaimCounter::new());
        let first_blkno = if self.file.metapage().is_empty() {
            page::header::INVALID_BLOCK
        } else {
            let nav = tree::TreeNavigator::new(&self.file, self.schema.key_width(), self.schema.comparator());
            match &bounds.lower {
                Some(b) => nav.find_first_leaf(&b.key)?,
                None => {
                    let min_key = vec![0u8; self.schema.key_width()];
                    nav.find_first_leaf(&min_key)?
                }
            }
        };

        Ok((0..worker_count.max(1))
            .map(|_| {
                ParallelWorker::new(
                    &self.file,
                    &self.schema,
                    self.schema.comparator(),
                    &self.config,
                    claim_counter.clone(),
                    first_blkno,
                    bounds.lower.clone(),
                    bounds.upper.clone(),
                    bounds.second_key_eq.clone(),
                )
            })
            .collect())
    }
}
