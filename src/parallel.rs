// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Work-stealing coordination for parallel scans (C6, §4.6).
//!
//! A parallel scan has no pre-partitioned leaf ranges: every worker shares
//! one [`ClaimCounter`] and claims its next batch of leaves by walking the
//! sibling chain and swinging the counter forward with a single
//! compare-and-swap. Contention just means a retry with a freshly observed
//! value — never a blocked thread, never a lock.

use crate::error::Result;
use crate::page::header::INVALID_BLOCK;
use crate::pagefile::PageFile;
use std::sync::atomic::{AtomicU32, Ordering};

/// Sentinel meaning "no worker has claimed the first leaf yet".
const UNINITIALIZED: u32 = 0;

/// A claimed span of leaves: scan forward from `start_blkno`, stopping once
/// `leaf_count` leaves (including the first) have been consumed or a sibling
/// link runs out.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Claim {
    /// First leaf block in this worker's batch.
    pub start_blkno: u32,
    /// Number of leaves claimed, at most the configured batch size (fewer if
    /// the chain ran out).
    pub leaf_count: u32,
}

/// The shared claim counter every worker in a parallel scan holds a
/// reference to (§4.6).
///
/// Holds a single `AtomicU32`: `0` means uninitialized, [`INVALID_BLOCK`]
/// means exhausted, anything else is the block number of the next
/// unclaimed leaf.
#[derive(Debug, Default)]
pub struct ClaimCounter {
    curr: AtomicU32,
}

impl ClaimCounter {
    /// A fresh, uninitialized counter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            curr: AtomicU32::new(UNINITIALIZED),
        }
    }

    /// Claims the next batch of up to `batch` leaves.
    ///
    /// `first_blkno` is the leftmost leaf of the whole scan range (from the
    /// tree navigator); it is only consulted the first time any worker
    /// claims, via the `curr == 0` branch. Returns `None` once every leaf
    /// has been claimed by some worker.
    pub fn claim(&self, file: &PageFile, first_blkno: u32, batch: u32) -> Result<Option<Claim>> {
        debug_assert!(batch >= 1, "parallel_claim_batch must be at least 1");
        loop {
            let observed = self.curr.load(Ordering::Acquire);
            if observed == INVALID_BLOCK {
                return Ok(None);
            }

            // Two-branch protocol: the first claimant seeds `curr` from the
            // navigator's result; every later claimant resumes from wherever
            // `curr` already points.
            let start = if observed == UNINITIALIZED {
                first_blkno
            } else {
                observed
            };

            if start == INVALID_BLOCK {
                // Empty range: mark exhausted so later callers short-circuit.
                let _ = self.curr.compare_exchange(
                    observed,
                    INVALID_BLOCK,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                return Ok(None);
            }

            let (next_start, leaf_count) = self.walk_batch(file, start, batch)?;

            if self
                .curr
                .compare_exchange(observed, next_start, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(Some(Claim {
                    start_blkno: start,
                    leaf_count,
                }));
            }
            // Someone else swung `curr` first; retry with a fresh read.
        }
    }

    /// Walks `batch` sibling links forward from `start`, returning the block
    /// number just past the claimed span (or [`INVALID_BLOCK`] if the chain
    /// ended) and how many leaves were actually walked.
    fn walk_batch(&self, file: &PageFile, start: u32, batch: u32) -> Result<(u32, u32)> {
        let mut blkno = start;
        let mut walked = 1u32;
        while walked < batch {
            let page = file.read_page(blkno)?;
            if page.trailer.rightlink == INVALID_BLOCK {
                return Ok((INVALID_BLOCK, walked));
            }
            blkno = page.trailer.rightlink;
            walked += 1;
        }
        let last = file.read_page(blkno)?;
        Ok((last.trailer.rightlink, walked))
    }
}
