// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Leaf page payloads (§3 "Leaf page", §4.1 "Page Codec", §9 "Sum-types
//! instead of tagged pages").
//!
//! A leaf's payload is a tagged union dispatched through a `match`, never a
//! raw integer switch: [`LeafPayload::Plain`] (`n < 0x8000`), `KeyRleV1`
//! (`0x8001`), `KeyRleV2` (`0x8002`), or `IncludeRle` (`0x8003`).

use super::LeafTag;
use crate::error::{Error, Result};
use crate::slice::Slice;
use byteorder::{BigEndian, ByteOrder};

/// Fixed per-column widths of a leaf's INCLUDE tuple, in column order.
#[derive(Clone, Debug, Default)]
pub struct IncludeLayout {
    widths: Vec<usize>,
}

impl IncludeLayout {
    /// A leaf with no INCLUDE columns.
    #[must_use]
    pub fn none() -> Self {
        Self { widths: vec![] }
    }

    /// A leaf whose INCLUDE tuple has the given per-column widths.
    #[must_use]
    pub fn new(widths: Vec<usize>) -> Self {
        Self { widths }
    }

    /// Combined width in bytes of one INCLUDE tuple.
    #[must_use]
    pub fn row_width(&self) -> usize {
        self.widths.iter().sum()
    }

    /// Per-column widths.
    #[must_use]
    pub fn widths(&self) -> &[usize] {
        &self.widths
    }
}

/// One decoded run: a key (and, for Include-RLE, an INCLUDE tuple) shared by
/// `count` consecutive logical rows.
#[derive(Clone, Debug)]
pub struct Run {
    /// The run's key, equal for every logical row it represents.
    pub key: Slice,
    /// Number of logical rows in this run.
    pub count: u16,
    /// The run's shared INCLUDE tuple, present only for [`LeafPayload::IncludeRle`].
    pub include: Option<Slice>,
}

const KEY_RLE_V1_HEADER_LEN: usize = 2 + 2 + 2; // tag, n, nruns
const KEY_RLE_V2_HEADER_LEN: usize = KEY_RLE_V1_HEADER_LEN + 1; // + continues_byte
const RUN_COUNT_LEN: usize = 2; // u16 cnt per run

/// A parsed leaf payload.
#[derive(Clone, Debug)]
pub enum LeafPayload {
    /// `[u16 n][key0..key_{n-1}][inc column blocks]`, column-major INCLUDE.
    Plain {
        /// Logical row count.
        n: u16,
        /// The full payload bytes, retained for zero-copy key/INCLUDE access.
        bytes: Slice,
        /// Fixed key width.
        key_len: usize,
        /// INCLUDE column layout.
        include: IncludeLayout,
    },
    /// Tag `0x8001`: runs delimited purely by key-value changes.
    KeyRleV1 {
        /// Logical row count (sum of run counts).
        n: u16,
        /// The decoded runs, in order.
        runs: Vec<Run>,
    },
    /// Tag `0x8002`: as v1, plus cross-page run continuation.
    KeyRleV2 {
        /// Logical row count.
        n: u16,
        /// `true` iff the first run's key equals the previous leaf's last key.
        continues: bool,
        /// The decoded runs, in order.
        runs: Vec<Run>,
    },
    /// Tag `0x8003`: one shared INCLUDE tuple per run.
    IncludeRle {
        /// Logical row count.
        n: u16,
        /// The decoded runs, each carrying its shared INCLUDE tuple.
        runs: Vec<Run>,
    },
}

impl LeafPayload {
    /// Reads the logical item count without fully parsing the payload.
    pub fn nitems(bytes: &[u8]) -> Result<u16> {
        if bytes.len() < 2 {
            return Err(Error::FormatViolation("leaf payload shorter than its header"));
        }
        let first = BigEndian::read_u16(&bytes[0..2]);
        if LeafTag::from_raw(first).is_some() {
            if bytes.len() < 4 {
                return Err(Error::FormatViolation("RLE leaf payload shorter than its header"));
            }
            Ok(BigEndian::read_u16(&bytes[2..4]))
        } else {
            Ok(first)
        }
    }

    /// Parses a leaf payload, dispatching on its tag.
    pub fn parse(bytes: Slice, key_len: usize, include: IncludeLayout) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::FormatViolation("leaf payload shorter than its header"));
        }
        let first = BigEndian::read_u16(&bytes[0..2]);
        match LeafTag::from_raw(first) {
            None => Self::parse_plain(bytes, first, key_len, include),
            Some(LeafTag::KeyRleV1) => Self::parse_key_rle(bytes, key_len, false),
            Some(LeafTag::KeyRleV2) => Self::parse_key_rle(bytes, key_len, true),
            Some(LeafTag::IncludeRle) => Self::parse_include_rle(bytes, key_len, include),
        }
    }

    fn parse_plain(bytes: Slice, n: u16, key_len: usize, include: IncludeLayout) -> Result<Self> {
        let keys_len = usize::from(n) * key_len;
        let inc_len = usize::from(n) * include.row_width();
        if bytes.len() < 2 + keys_len + inc_len {
            return Err(Error::FormatViolation("plain leaf shorter than its declared item count"));
        }
        Ok(Self::Plain {
            n,
            bytes,
            key_len,
            include,
        })
    }

    fn parse_key_rle(bytes: Slice, key_len: usize, versioned: bool) -> Result<Self> {
        let header_len = if versioned {
            KEY_RLE_V2_HEADER_LEN
        } else {
            KEY_RLE_V1_HEADER_LEN
        };
        if bytes.len() < header_len {
            return Err(Error::FormatViolation("key-RLE leaf shorter than its header"));
        }
        let n = BigEndian::read_u16(&bytes[2..4]);
        let nruns = BigEndian::read_u16(&bytes[4..6]);
        let continues = versioned && bytes[6] != 0;

        let mut offset = header_len;
        let mut runs = Vec::with_capacity(usize::from(nruns));
        let mut total = 0u32;
        for _ in 0..nruns {
            if bytes.len() < offset + key_len + RUN_COUNT_LEN {
                return Err(Error::FormatViolation("key-RLE run truncated"));
            }
            let key = bytes.slice(offset..offset + key_len);
            offset += key_len;
            let count = BigEndian::read_u16(&bytes[offset..offset + RUN_COUNT_LEN]);
            offset += RUN_COUNT_LEN;
            total += u32::from(count);
            runs.push(Run {
                key,
                count,
                include: None,
            });
        }
        if total != u32::from(n) {
            return Err(Error::FormatViolation(
                "key-RLE run counts do not sum to the declared item count",
            ));
        }

        Ok(if versioned {
            Self::KeyRleV2 { n, continues, runs }
        } else {
            Self::KeyRleV1 { n, runs }
        })
    }

    fn parse_include_rle(bytes: Slice, key_len: usize, include: IncludeLayout) -> Result<Self> {
        if bytes.len() < KEY_RLE_V1_HEADER_LEN {
            return Err(Error::FormatViolation("include-RLE leaf shorter than its header"));
        }
        let n = BigEndian::read_u16(&bytes[2..4]);
        let nruns = BigEndian::read_u16(&bytes[4..6]);
        let inc_width = include.row_width();

        let mut offset = KEY_RLE_V1_HEADER_LEN;
        let mut runs = Vec::with_capacity(usize::from(nruns));
        let mut total = 0u32;
        for _ in 0..nruns {
            if bytes.len() < offset + key_len + RUN_COUNT_LEN + inc_width {
                return Err(Error::FormatViolation("include-RLE run truncated"));
            }
            let key = bytes.slice(offset..offset + key_len);
            offset += key_len;
            let count = BigEndian::read_u16(&bytes[offset..offset + RUN_COUNT_LEN]);
            offset += RUN_COUNT_LEN;
            let include_bytes = bytes.slice(offset..offset + inc_width);
            offset += inc_width;
            total += u32::from(count);
            runs.push(Run {
                key,
                count,
                include: Some(include_bytes),
            });
        }
        if total != u32::from(n) {
            return Err(Error::FormatViolation(
                "include-RLE run counts do not sum to the declared item count",
            ));
        }

        Ok(Self::IncludeRle { n, runs })
    }

    /// Logical row count, regardless of variant.
    #[must_use]
    pub fn n(&self) -> u16 {
        match self {
            Self::Plain { n, .. }
            | Self::KeyRleV1 { n, .. }
            | Self::KeyRleV2 { n, .. }
            | Self::IncludeRle { n, .. } => *n,
        }
    }

    /// `true` iff this is a [`LeafPayload::KeyRleV2`] page whose first run
    /// continues the previous leaf's last run (§3 invariant 4).
    #[must_use]
    pub fn continues_previous(&self) -> bool {
        matches!(self, Self::KeyRleV2 { continues: true, .. })
    }

    /// Returns the `idx`-th key (1-based), walking runs for RLE variants.
    ///
    /// O(1) for Plain, O(runs) for RLE — a scan-side cache amortizes repeat
    /// access to O(1) for sequential scans (§4.1).
    pub fn keyptr(&self, idx: u16) -> Result<Slice> {
        if idx == 0 || idx > self.n() {
            return Err(Error::FormatViolation("leaf item index out of range"));
        }
        match self {
            Self::Plain {
                bytes, key_len, ..
            } => {
                let offset = 2 + usize::from(idx - 1) * key_len;
                Ok(bytes.slice(offset..offset + key_len))
            }
            Self::KeyRleV1 { runs, .. }
            | Self::KeyRleV2 { runs, .. }
            | Self::IncludeRle { runs, .. } => {
                let (_, _, run) = run_containing(runs, idx)?;
                Ok(run.key.clone())
            }
        }
    }

    /// Returns the `idx`-th row's INCLUDE tuple (1-based), or `None` if this
    /// leaf has no INCLUDE columns.
    pub fn include_ptr(&self, idx: u16) -> Result<Option<Slice>> {
        if idx == 0 || idx > self.n() {
            return Err(Error::FormatViolation("leaf item index out of range"));
        }
        match self {
            Self::Plain {
                bytes,
                key_len,
                include,
                n,
            } => {
                if include.widths().is_empty() {
                    return Ok(None);
                }
                let keys_block = 2 + usize::from(*n) * key_len;
                let mut col_offset = keys_block;
                let mut out = Vec::with_capacity(include.row_width());
                for &width in include.widths() {
                    let row_offset = col_offset + usize::from(idx - 1) * width;
                    out.extend_from_slice(&bytes[row_offset..row_offset + width]);
                    col_offset += usize::from(*n) * width;
                }
                Ok(Some(Slice::from(out)))
            }
            Self::KeyRleV1 { .. } | Self::KeyRleV2 { .. } => Ok(None),
            Self::IncludeRle { runs, .. } => {
                let (_, _, run) = run_containing(runs, idx)?;
                Ok(run.include.clone())
            }
        }
    }

    /// The leaf's first logical key.
    pub fn first_key(&self) -> Result<Slice> {
        self.keyptr(1)
    }

    /// The leaf's last logical key: the "logically-last" key, i.e. the key
    /// of the run that covers the final logical row, not merely the last
    /// stored run entry (they coincide except under cross-page
    /// continuation, §9 open question).
    pub fn last_key(&self) -> Result<Slice> {
        self.keyptr(self.n())
    }

    /// Locates the run containing logical row `idx` (1-based), for building
    /// a scan-side run cache. Returns `(run_idx, rows_before_run, run)`.
    pub fn run_containing(&self, idx: u16) -> Result<(usize, u32, &Run)> {
        match self {
            Self::Plain { .. } => Err(Error::Unsupported("Plain leaves have no run structure")),
            Self::KeyRleV1 { runs, .. } | Self::KeyRleV2 { runs, .. } | Self::IncludeRle { runs, .. } => {
                run_containing(runs, idx)
            }
        }
    }

    /// The decoded runs, for variants that have them.
    #[must_use]
    pub fn runs(&self) -> Option<&[Run]> {
        match self {
            Self::Plain { .. } => None,
            Self::KeyRleV1 { runs, .. } | Self::KeyRleV2 { runs, .. } | Self::IncludeRle { runs, .. } => Some(runs),
        }
    }
}

fn run_containing(runs: &[Run], idx: u16) -> Result<(usize, u32, &Run)> {
    let mut before = 0u32;
    for (run_idx, run) in runs.iter().enumerate() {
        let end = before + u32::from(run.count);
        if u32::from(idx) <= end {
            return Ok((run_idx, before, run));
        }
        before = end;
    }
    Err(Error::FormatViolation(
        "leaf run counts do not cover the requested index",
    ))
}

/// Packs a Plain leaf from already-ordered keys and, if present, per-column
/// INCLUDE value vectors (column-major, per §3).
#[must_use]
pub fn pack_plain(keys: &[Slice], include_columns: &[Vec<Slice>]) -> Vec<u8> {
    let n = keys.len();
    let mut out = Vec::new();
    out.extend_from_slice(&(n as u16).to_be_bytes());
    for key in keys {
        out.extend_from_slice(key);
    }
    for column in include_columns {
        for value in column {
            out.extend_from_slice(value);
        }
    }
    out
}

/// Packs a Key-RLE v1 leaf (`tag = 0x8001`) from pre-grouped runs.
#[must_use]
pub fn pack_key_rle_v1(runs: &[(Slice, u16)]) -> Vec<u8> {
    pack_key_rle(LeafTag::KeyRleV1, runs, None)
}

/// Packs a Key-RLE v2 leaf (`tag = 0x8002`) from pre-grouped runs.
#[must_use]
pub fn pack_key_rle_v2(runs: &[(Slice, u16)], continues: bool) -> Vec<u8> {
    pack_key_rle(LeafTag::KeyRleV2, runs, Some(continues))
}

fn pack_key_rle(tag: LeafTag, runs: &[(Slice, u16)], continues: Option<bool>) -> Vec<u8> {
    let n: u32 = runs.iter().map(|(_, c)| u32::from(*c)).sum();
    let mut out = Vec::new();
    out.extend_from_slice(&(tag as u16).to_be_bytes());
    out.extend_from_slice(&(n as u16).to_be_bytes());
    out.extend_from_slice(&(runs.len() as u16).to_be_bytes());
    if let Some(continues) = continues {
        out.push(u8::from(continues));
    }
    for (key, count) in runs {
        out.extend_from_slice(key);
        out.extend_from_slice(&count.to_be_bytes());
    }
    out
}

/// Packs an Include-RLE leaf (`tag = 0x8003`) from pre-grouped runs, each
/// carrying its shared INCLUDE tuple.
#[must_use]
pub fn pack_inc_rle(runs: &[(Slice, u16, Slice)]) -> Vec<u8> {
    let n: u32 = runs.iter().map(|(_, c, _)| u32::from(*c)).sum();
    let mut out = Vec::new();
    out.extend_from_slice(&(LeafTag::IncludeRle as u16).to_be_bytes());
    out.extend_from_slice(&(n as u16).to_be_bytes());
    out.extend_from_slice(&(runs.len() as u16).to_be_bytes());
    for (key, count, include) in runs {
        out.extend_from_slice(key);
        out.extend_from_slice(&count.to_be_bytes());
        out.extend_from_slice(include);
    }
    out
}
