// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The scan state machine (C4, §4.4): positions a cursor against a leaf
//! chain and walks it forward, backward, or as one worker of a parallel
//! sweep, applying bounds and an optional second-key equality filter.
//!
//! Grounded on the teacher's [`segment::range::Range`] /
//! [`segment::reader::Reader`] pair, collapsed into a single cursor: SMOL
//! has no separate "data block" vs "index block" concept and no value
//! consumer, so one struct owns the current leaf, its run cache, and its
//! direction instead of the teacher's lo/hi dual-reader split.

use crate::comparator::DynComparator;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::key::Schema;
use crate::page::header::INVALID_BLOCK;
use crate::page::leaf::{IncludeLayout, LeafPayload};
use crate::pagefile::{PageFile, PagePin};
use crate::parallel::ClaimCounter;
use crate::slice::Slice;
use crate::tree::TreeNavigator;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// A scan's walking direction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Ascending key order, following `rightlink`.
    Forward,
    /// Descending key order, following `leftlink`.
    Backward,
}

/// One endpoint of a scan range.
#[derive(Clone, Debug)]
pub struct Bound {
    /// The encoded key bytes.
    pub key: Slice,
    /// `true` if the bound excludes `key` itself.
    pub strict: bool,
}

/// The key-range and recheck predicate a scan enforces (§4.4, §6).
///
/// Only leading-key bounds and a second-key equality filter are recognized;
/// anything else is the caller's responsibility as a recheck on the
/// returned tuple.
#[derive(Clone, Debug, Default)]
pub struct ScanBounds {
    /// Inclusive/exclusive lower bound on the leading key, if any.
    pub lower: Option<Bound>,
    /// Inclusive/exclusive upper bound on the leading key, if any.
    pub upper: Option<Bound>,
    /// Exact-match filter on the second key column, for two-column schemas.
    pub second_key_eq: Option<Slice>,
}

impl ScanBounds {
    /// No bounds: scans the whole index.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// A shared flag a caller can set to stop a scan early (§5 "cancellation").
pub type CancellationToken = Arc<AtomicBool>;

/// One emitted row: its key and, if the schema has INCLUDE columns, its
/// INCLUDE tuple.
#[derive(Clone, Debug)]
pub struct Tuple {
    /// The row's key bytes.
    pub key: Slice,
    /// The row's INCLUDE bytes, packed column-major-decoded into one
    /// contiguous tuple, or `None` if the schema has no INCLUDE columns.
    pub include: Option<Slice>,
}

fn include_layout(schema: &Schema) -> IncludeLayout {
    if schema.include_columns().is_empty() {
        IncludeLayout::none()
    } else {
        IncludeLayout::new(schema.include_columns().iter().map(|c| usize::from(c.width)).collect())
    }
}

/// Cached location of the run covering the cursor's current offset, so a
/// sequential scan over an RLE leaf doesn't re-walk every run per row.
#[derive(Clone, Debug)]
struct RunCache {
    /// Rows strictly before this run (0-based).
    rows_before: u32,
    /// Rows in this run.
    count: u32,
    key: Slice,
    include: Option<Slice>,
}

impl RunCache {
    fn covers(&self, offset: u16) -> bool {
        let offset = u32::from(offset);
        offset > self.rows_before && offset <= self.rows_before + self.count
    }
}

/// A single-direction cursor over the leaf chain (§4.4).
pub struct Scan<'a> {
    file: &'a PageFile,
    schema: &'a Schema,
    comparator: &'a DynComparator,
    config: &'a Config,
    direction: Direction,
    bounds: ScanBounds,
    cancellation: Option<CancellationToken>,

    blkno: u32,
    offset: u16,
    page: Option<PagePin>,
    payload: Option<LeafPayload>,
    run_cache: Option<RunCache>,

    started: bool,
    done: bool,
    pages_scanned: u32,
    /// Leaves this cursor may still cross before stopping regardless of
    /// sibling links (`u32::MAX` for an unbounded single-worker scan; set to
    /// a worker's claimed leaf count for a parallel span).
    remaining_span: u32,
}

impl<'a> Scan<'a> {
    /// Opens a forward scan (ascending key order) over `bounds`.
    pub fn forward(
        file: &'a PageFile,
        schema: &'a Schema,
        comparator: &'a DynComparator,
        config: &'a Config,
        bounds: ScanBounds,
    ) -> Result<Self> {
        let mut scan = Self::new(file, schema, comparator, config, Direction::Forward);
        scan.reset(bounds)?;
        Ok(scan)
    }

    /// Opens a backward scan (descending key order) over `bounds`.
    pub fn backward(
        file: &'a PageFile,
        schema: &'a Schema,
        comparator: &'a DynComparator,
        config: &'a Config,
        bounds: ScanBounds,
    ) -> Result<Self> {
        let mut scan = Self::new(file, schema, comparator, config, Direction::Backward);
        scan.reset(bounds)?;
        Ok(scan)
    }

    /// Opens a scan over one worker's claimed leaf span of a parallel sweep
    /// (§4.6), always walking forward within the span. `leaf_count` bounds
    /// how many sibling pages this worker may cross before stopping, so
    /// workers never overrun into a span another worker claimed.
    ///
    /// `lower`/`upper` are the same range bounds a plain forward scan would
    /// enforce (§4.4): the first claimed leaf of the whole scan may start
    /// mid-leaf against `lower`, and every leaf in the span still stops
    /// early against `upper` via the same out-of-bounds check a plain
    /// forward scan uses. Passing the unbounded range here reproduces the
    /// old whole-index behavior.
    pub fn parallel_span(
        file: &'a PageFile,
        schema: &'a Schema,
        comparator: &'a DynComparator,
        config: &'a Config,
        start_blkno: u32,
        leaf_count: u32,
        lower: Option<Bound>,
        upper: Option<Bound>,
        second_key_eq: Option<Slice>,
    ) -> Result<Self> {
        let mut scan = Self::new(file, schema, comparator, config, Direction::Forward);
        scan.bounds = ScanBounds {
            lower: lower.clone(),
            upper,
            second_key_eq,
        };
        scan.blkno = start_blkno;
        scan.remaining_span = leaf_count;
        scan.load_current_page()?;

        let offset = match &lower {
            Some(b) => {
                let nav = TreeNavigator::new(file, schema.key_width(), comparator);
                nav.seek_within_leaf(start_blkno, &b.key, b.strict)?
            }
            None => {
                let n = scan.payload.as_ref().map_or(0, LeafPayload::n);
                if n == 0 {
                    None
                } else {
                    Some(1u16)
                }
            }
        };

        match offset {
            Some(o) => {
                scan.offset = o;
                scan.started = true;
            }
            None => {
                // Either the first leaf is empty, or (on the very first
                // claimed span) every key in it is below `lower`.
                scan.advance_to_sibling_forward()?;
            }
        }
        Ok(scan)
    }

    fn new(file: &'a PageFile, schema: &'a Schema, comparator: &'a DynComparator, config: &'a Config, direction: Direction) -> Self {
        Self {
            file,
            schema,
            comparator,
            config,
            direction,
            bounds: ScanBounds::unbounded(),
            cancellation: None,
            blkno: INVALID_BLOCK,
            offset: 0,
            page: None,
            payload: None,
            run_cache: None,
            started: false,
            done: false,
            pages_scanned: 0,
            remaining_span: u32::MAX,
        }
    }

    /// Attaches a cancellation token; every call to [`Scan::next_tuple`]
    /// after it is set returns `Err(Error::Cancelled)`.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Repositions this cursor for a fresh range without reallocating the
    /// scan itself (§4.4 "re-scan support") — useful for repeated narrow
    /// scans against the same open file, e.g. probing many second-key
    /// values in a loop.
    pub fn reset(&mut self, bounds: ScanBounds) -> Result<()> {
        self.bounds = bounds;
        self.page = None;
        self.payload = None;
        self.run_cache = None;
        self.pages_scanned = 0;
        self.done = false;
        self.started = false;
        self.remaining_span = u32::MAX;

        if self.file.metapage().is_empty() {
            self.done = true;
            return Ok(());
        }

        let nav = TreeNavigator::new(self.file, self.schema.key_width(), self.comparator);
        match self.direction {
            Direction::Forward => self.position_forward(&nav)?,
            Direction::Backward => self.position_backward(&nav)?,
        }
        Ok(())
    }

    fn position_forward(&mut self, nav: &TreeNavigator<'_>) -> Result<()> {
        // An all-zero key of the schema's width is always `<=` every stored
        // key: zero-padded text sorts as the empty string, and a
        // sign-flipped `i64::MIN` is exactly all zero bytes. So it stands
        // in for "no lower bound" without needing a separate navigator call.
        let min_key = vec![0u8; self.schema.key_width()];
        let blkno = match &self.bounds.lower {
            Some(b) => nav.find_first_leaf(&b.key)?,
            None => nav.find_first_leaf(&min_key)?,
        };
        self.blkno = blkno;
        self.load_current_page()?;

        let offset = match &self.bounds.lower {
            Some(b) => nav.seek_within_leaf(blkno, &b.key, b.strict)?,
            None => Some(1u16),
        };

        match offset {
            Some(o) => {
                self.offset = o;
                self.started = true;
            }
            None => {
                // Every key in this leaf is below the bound; the next
                // sibling (if any) starts the qualifying range.
                self.advance_to_sibling_forward()?;
            }
        }
        Ok(())
    }

    fn position_backward(&mut self, nav: &TreeNavigator<'_>) -> Result<()> {
        let blkno = match &self.bounds.upper {
            Some(b) => nav.find_first_leaf(&b.key)?,
            None => nav.rightmost_leaf()?,
        };
        self.blkno = blkno;
        self.load_current_page()?;

        let strict_upper = self.bounds.upper.as_ref().filter(|b| b.strict).map(|b| b.key.clone());
        let offset = match &self.bounds.upper {
            Some(b) => nav.seek_within_leaf_backward(blkno, &b.key)?,
            None => {
                let n = self.payload.as_ref().expect("page just loaded").n();
                if n == 0 {
                    None
                } else {
                    Some(n)
                }
            }
        };

        match offset {
            Some(o) => {
                self.offset = o;
                self.started = true;
            }
            None => {
                self.advance_to_sibling_backward()?;
            }
        }

        // `seek_within_leaf_backward` finds the last key `<= bound`; a
        // strict upper bound must also reject a run of keys `== bound`
        // before the scan proper starts, possibly spanning several rows or
        // crossing a sibling link.
        if let Some(bound_key) = strict_upper {
            while !self.done {
                let payload = self.payload.as_ref().expect("page must be loaded while not done");
                let key = payload.keyptr(self.offset)?;
                if self.comparator.compare(&key, &bound_key) != Ordering::Equal {
                    break;
                }
                self.step_offset()?;
            }
        }
        Ok(())
    }

    fn load_current_page(&mut self) -> Result<()> {
        if self.blkno == INVALID_BLOCK {
            self.page = None;
            self.payload = None;
            self.done = true;
            return Ok(());
        }
        let page = self.file.read_page(self.blkno)?;
        let payload = LeafPayload::parse(page.payload.clone(), self.schema.key_width(), include_layout(self.schema))?;
        self.page = Some(page);
        self.payload = Some(payload);
        self.run_cache = None;
        Ok(())
    }

    fn maybe_prefetch(&self) {
        let depth = self
            .config
            .prefetch_depth
            .min(1u32.checked_shl(self.pages_scanned.min(8)).unwrap_or(u32::MAX));
        if depth == 0 {
            return;
        }
        let Some(page) = &self.page else { return };
        let mut link = match self.direction {
            Direction::Forward => page.trailer.rightlink,
            Direction::Backward => page.trailer.leftlink,
        };
        for _ in 0..depth {
            if link == INVALID_BLOCK {
                break;
            }
            let Ok(p) = self.file.read_page(link) else { break };
            link = match self.direction {
                Direction::Forward => p.trailer.rightlink,
                Direction::Backward => p.trailer.leftlink,
            };
        }
    }

    fn advance_to_sibling_forward(&mut self) -> Result<()> {
        loop {
            let Some(page) = &self.page else {
                self.done = true;
                return Ok(());
            };
            let next = page.trailer.rightlink;
            if next == INVALID_BLOCK || self.remaining_span <= 1 {
                self.done = true;
                return Ok(());
            }
            self.remaining_span = self.remaining_span.saturating_sub(1);
            self.pages_scanned += 1;
            self.maybe_prefetch();
            self.blkno = next;
            self.load_current_page()?;
            let n = self.payload.as_ref().map_or(0, LeafPayload::n);
            if n > 0 {
                self.offset = 1;
                self.started = true;
                return Ok(());
            }
        }
    }

    fn advance_to_sibling_backward(&mut self) -> Result<()> {
        loop {
            let Some(page) = &self.page else {
                self.done = true;
                return Ok(());
            };
            let prev = page.trailer.leftlink;
            if prev == INVALID_BLOCK {
                self.done = true;
                return Ok(());
            }
            self.pages_scanned += 1;
            self.maybe_prefetch();
            self.blkno = prev;
            self.load_current_page()?;
            let n = self.payload.as_ref().map_or(0, LeafPayload::n);
            if n > 0 {
                self.offset = n;
                self.started = true;
                return Ok(());
            }
        }
    }

    fn ensure_run_cache(&mut self) -> Result<()> {
        let payload = self.payload.as_ref().expect("page must be loaded");
        if matches!(payload, LeafPayload::Plain { .. }) {
            return Ok(());
        }
        if let Some(cache) = &self.run_cache {
            if cache.covers(self.offset) {
                return Ok(());
            }
        }
        let (_, rows_before, run) = payload.run_containing(self.offset)?;
        self.run_cache = Some(RunCache {
            rows_before,
            count: u32::from(run.count),
            key: run.key.clone(),
            include: run.include.clone(),
        });
        Ok(())
    }

    fn current_tuple(&mut self) -> Result<Tuple> {
        self.ensure_run_cache()?;
        let payload = self.payload.as_ref().expect("page must be loaded");
        match payload {
            LeafPayload::Plain { .. } => Ok(Tuple {
                key: payload.keyptr(self.offset)?,
                include: payload.include_ptr(self.offset)?,
            }),
            _ => {
                let cache = self.run_cache.as_ref().expect("run cache just ensured");
                Ok(Tuple {
                    key: cache.key.clone(),
                    include: cache.include.clone(),
                })
            }
        }
    }

    fn out_of_bounds(&self, key: &Slice) -> bool {
        match self.direction {
            Direction::Forward => {
                if let Some(b) = &self.bounds.upper {
                    let ord = self.comparator.compare(key, &b.key);
                    return if b.strict { ord != Ordering::Less } else { ord == Ordering::Greater };
                }
            }
            Direction::Backward => {
                if let Some(b) = &self.bounds.lower {
                    let ord = self.comparator.compare(key, &b.key);
                    return if b.strict { ord != Ordering::Greater } else { ord == Ordering::Less };
                }
            }
        }
        false
    }

    fn passes_second_key_filter(&self, key: &Slice) -> bool {
        let Some(filter) = &self.bounds.second_key_eq else {
            return true;
        };
        if self.schema.key_column_count() < 2 {
            return true;
        }
        let parts = self.schema.split_key(key);
        parts[1] == &**filter
    }

    fn step_offset(&mut self) -> Result<bool> {
        match self.direction {
            Direction::Forward => {
                let n = self.payload.as_ref().map_or(0, LeafPayload::n);
                if self.offset < n {
                    self.offset += 1;
                    Ok(true)
                } else {
                    self.advance_to_sibling_forward()?;
                    Ok(!self.done)
                }
            }
            Direction::Backward => {
                if self.offset > 1 {
                    self.offset -= 1;
                    Ok(true)
                } else {
                    self.advance_to_sibling_backward()?;
                    Ok(!self.done)
                }
            }
        }
    }

    /// Advances the cursor and returns the next qualifying tuple, or `None`
    /// once the range is exhausted (§4.4).
    ///
    /// Checked once per call, per §5: a cancellation token set between calls
    /// stops the scan with [`Error::Cancelled`] rather than silently
    /// finishing the range.
    pub fn next_tuple(&mut self) -> Option<Result<Tuple>> {
        if let Some(token) = &self.cancellation {
            if token.load(AtomicOrdering::Relaxed) {
                return Some(Err(Error::Cancelled));
            }
        }

        loop {
            if self.done || self.payload.is_none() {
                return None;
            }
            if !self.started {
                return None;
            }

            let tuple = match self.current_tuple() {
                Ok(t) => t,
                Err(e) => return Some(Err(e)),
            };

            if self.out_of_bounds(&tuple.key) {
                self.done = true;
                return None;
            }

            let matches_filter = self.passes_second_key_filter(&tuple.key);

            match self.step_offset() {
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }

            if matches_filter {
                return Some(Ok(tuple));
            }
            // Doesn't satisfy the second-key filter: keep advancing within
            // the same call rather than forcing the caller to re-poll.
        }
    }

    /// Number of sibling leaves crossed so far, for prefetch ramp-up and
    /// diagnostics.
    #[must_use]
    pub fn pages_scanned(&self) -> u32 {
        self.pages_scanned
    }
}

impl Iterator for Scan<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_tuple()
    }
}

/// Runs one worker's share of a parallel scan (§4.6): repeatedly claims a
/// leaf span from the shared [`ClaimCounter`] and drains it, until the
/// counter reports the whole index exhausted.
pub struct ParallelWorker<'a> {
    file: &'a PageFile,
    schema: &'a Schema,
    comparator: &'a DynComparator,
    config: &'a Config,
    claim_counter: Arc<ClaimCounter>,
    first_blkno: u32,
    lower: Option<Bound>,
    upper: Option<Bound>,
    second_key_eq: Option<Slice>,
    current: Option<Scan<'a>>,
}

impl<'a> ParallelWorker<'a> {
    /// Creates a worker sharing `claim_counter` with the rest of the sweep.
    /// `first_blkno` is the leftmost leaf of the whole scan range (found
    /// once by whichever caller sets up the sweep, already accounting for
    /// `lower`, then shared read-only). `lower`/`upper` are re-applied by
    /// every claimed span so a worker whose claim runs past `upper` stops
    /// early instead of draining the rest of the chain.
    #[must_use]
    pub fn new(
        file: &'a PageFile,
        schema: &'a Schema,
        comparator: &'a DynComparator,
        config: &'a Config,
        claim_counter: Arc<ClaimCounter>,
        first_blkno: u32,
        lower: Option<Bound>,
        upper: Option<Bound>,
        second_key_eq: Option<Slice>,
    ) -> Self {
        Self {
            file,
            schema,
            comparator,
            config,
            claim_counter,
            first_blkno,
            lower,
            upper,
            second_key_eq,
            current: None,
        }
    }

    fn claim_next_span(&mut self) -> Result<bool> {
        let Some(claim) = self.claim_counter.claim(self.file, self.first_blkno, self.config.parallel_claim_batch)? else {
            return Ok(false);
        };
        self.current = Some(Scan::parallel_span(
            self.file,
            self.schema,
            self.comparator,
            self.config,
            claim.start_blkno,
            claim.leaf_count,
            self.lower.clone(),
            self.upper.clone(),
            self.second_key_eq.clone(),
        )?);
        Ok(true)
    }

    /// Returns the next tuple this worker produces, transparently moving on
    /// to its next claimed span once the current one is drained.
    pub fn next_tuple(&mut self) -> Option<Result<Tuple>> {
        loop {
            if self.current.is_none() {
                match self.claim_next_span() {
                    Ok(true) => {}
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e)),
                }
            }
            let scan = self.current.as_mut().expect("just claimed or already present");
            match scan.next_tuple() {
                Some(item) => return Some(item),
                None => {
                    self.current = None;
                }
            }
        }
    }
}

impl Iterator for ParallelWorker<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_tuple()
    }
}
