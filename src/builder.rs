// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The builder (C3, §4.3): turns a sorted key (and optional INCLUDE) stream
//! into leaves, upper internal levels, and a committed metapage.
//!
//! Key-RLE (v1/v2) never carries INCLUDE bytes (§3), so a schema with
//! INCLUDE columns can only ever choose between Plain and Include-RLE;
//! a schema with none chooses between Plain and Key-RLE.

use crate::comparator::{decode_i64_ordered, encode_i64_ordered};
use crate::config::{Config, KeyRleVersion};
use crate::error::{Error, Result};
use crate::key::{Row, Schema};
use crate::page::header::{PageKind, PageTrailer, INVALID_BLOCK};
use crate::page::internal::{pack_internal, InternalEntry};
use crate::page::leaf::{pack_inc_rle, pack_key_rle_v1, pack_key_rle_v2, pack_plain};
use crate::page::metapage::Metapage;
use crate::page::zonemap::ZoneMap;
use crate::page::{payload_capacity, MAX_PLAIN_ITEMS};
use crate::pagefile::PageFileWriter;
use crate::slice::Slice;
use std::path::Path;

/// Conservative reservation against overflow in scan-loop counters (§4.3):
/// no leaf carries more than this many logical rows...
const MAX_ROWS_PER_PAGE: u32 = 32_000;
/// ...nor more than this many runs.
const MAX_RUNS_PER_PAGE: usize = u16::MAX as usize;

/// One row already merged into a run of identical (key[, INCLUDE]) values.
#[derive(Clone, Debug)]
struct RawRun {
    key: Slice,
    include: Option<Slice>,
    count: u32,
}

struct LevelEntry {
    highkey: Slice,
    child: u32,
    zone_map: ZoneMap,
}

/// Builds one index in one shot from a sorted input stream.
pub struct Builder {
    schema: Schema,
    config: Config,
    writer: PageFileWriter,
}

impl Builder {
    /// Creates a builder that will write a fresh page file at `path`.
    pub fn create(path: &Path, schema: Schema, config: Config) -> Result<Self> {
        let writer = PageFileWriter::create(path)?;
        Ok(Self { schema, config, writer })
    }

    /// Consumes a caller-sorted row stream and writes the whole index.
    ///
    /// Rows must already be in non-decreasing key order (§6): the builder
    /// only internally sorts via the dedicated integer entry points below.
    pub fn build(mut self, rows: impl IntoIterator<Item = Row>) -> Result<()> {
        let has_include = self.schema.include_width() > 0;
        let runs = self.collect_runs(rows, has_include)?;
        self.write_index(runs)
    }

    /// Builds a single-column integer index, sorting internally via a
    /// stable LSD radix sort over the sign-flipped big-endian encoding
    /// (§4.3 "Optional parallel build", integer path).
    pub fn build_sorted_i64_single_column(mut self, mut keys: Vec<i64>) -> Result<()> {
        if self.schema.key_column_count() != 1 || self.schema.include_width() > 0 {
            return Err(Error::InvalidInput(
                "the integer fast-sort path requires a single-column schema with no INCLUDE columns",
            ));
        }
        radix_sort_i64(&mut keys);
        let rows = keys.into_iter().map(|k| {
            Row::new(vec![Slice::from(encode_i64_ordered(k))], vec![])
        });
        self.build(rows)
    }

    /// Builds a two-column `(i64, i64)` index, sorting internally on
    /// `(k1, k2)` via a stable LSD radix sort on the leading column followed
    /// by a stable sort on the trailing column (radix sort is stable, so
    /// sorting k2-then-k1 yields a correct lexicographic order).
    pub fn build_sorted_i64_two_column(mut self, mut rows: Vec<(i64, i64)>) -> Result<()> {
        if self.schema.key_column_count() != 2 || self.schema.include_width() > 0 {
            return Err(Error::InvalidInput(
                "the integer two-column fast-sort path requires a two-column schema with no INCLUDE columns",
            ));
        }
        rows.sort_by_key(|(_, k2)| *k2);
        rows.sort_by_key(|(k1, _)| *k1); // stable: preserves k2 order within equal k1
        let rows = rows.into_iter().map(|(k1, k2)| {
            Row::new(
                vec![Slice::from(encode_i64_ordered(k1)), Slice::from(encode_i64_ordered(k2))],
                vec![],
            )
        });
        self.build(rows)
    }

    fn collect_runs(&self, rows: impl IntoIterator<Item = Row>, has_include: bool) -> Result<Vec<RawRun>> {
        let mut runs: Vec<RawRun> = Vec::new();
        let max_row_bytes = self.schema.key_width() + self.schema.include_width();
        if max_row_bytes + 2 > payload_capacity() {
            return Err(Error::RowTooLarge {
                row_len: max_row_bytes,
                available: payload_capacity(),
            });
        }

        for row in rows {
            let key = self.schema.encode_key(&row.key_parts)?;
            let include = if has_include {
                Some(self.schema.encode_include(&row.include_parts)?)
            } else {
                None
            };

            let mergeable = runs.last_mut().filter(|r| {
                r.count < u32::from(u16::MAX) && r.key == key && (!has_include || r.include == include)
            });

            if let Some(last) = mergeable {
                last.count += 1;
            } else {
                runs.push(RawRun { key, include, count: 1 });
            }
        }

        Ok(runs)
    }

    fn write_index(mut self, runs: Vec<RawRun>) -> Result<()> {
        if runs.is_empty() {
            let meta = self.empty_metapage();
            self.writer.commit_metapage(&meta)?;
            return Ok(());
        }

        let leaves = self.write_leaves(&runs)?;
        let (root_blkno, height) = self.write_levels(leaves)?;

        let meta = Metapage {
            root_blkno,
            height,
            directory_blkno: root_blkno,
            ..self.empty_metapage()
        };
        self.writer.commit_metapage(&meta)?;
        Ok(())
    }

    fn empty_metapage(&self) -> Metapage {
        let mut inc_len = [0u16; crate::key::MAX_INCLUDE_COLUMNS];
        for (slot, col) in inc_len.iter_mut().zip(self.schema.include_columns()) {
            *slot = col.width;
        }
        let key_columns = self.schema.key_columns();
        Metapage {
            nkeyatts: self.schema.key_column_count() as u8,
            key_len1: key_columns[0].width,
            key_len2: key_columns.get(1).map_or(0, |c| c.width),
            root_blkno: crate::page::metapage::INVALID_ROOT,
            height: 0,
            inc_count: self.schema.include_columns().len() as u8,
            inc_len,
            collation_oid: 0,
            directory_blkno: crate::page::metapage::INVALID_ROOT,
            zone_maps_enabled: self.config.build_zone_maps,
        }
    }

    /// Resolves [`KeyRleVersion::Auto`] against this builder's schema:
    /// V2 for an integer-like comparator, V1 otherwise (§6).
    fn effective_key_rle_version(&self) -> KeyRleVersion {
        match self.config.key_rle_version {
            KeyRleVersion::Auto => {
                if self.schema.comparator().is_integer_like() {
                    KeyRleVersion::V2
                } else {
                    KeyRleVersion::V1
                }
            }
            explicit => explicit,
        }
    }

    fn write_leaves(&mut self, runs: &[RawRun]) -> Result<Vec<LevelEntry>> {
        let has_include = self.schema.include_width() > 0;
        let key_len = self.schema.key_width();
        let inc_width = self.schema.include_width();
        let avail = payload_capacity();
        let key_rle_version = self.effective_key_rle_version();

        let mut leaves = Vec::new();
        let mut cursor = 0usize;
        let mut cursor_consumed = 0u32;
        let mut prev_blkno: Option<u32> = None;
        let mut prev_leftlink: u32 = INVALID_BLOCK;
        let mut prev_last_key: Option<Slice> = None;

        while cursor < runs.len() {
            let candidate = scan_rle_candidate(
                runs,
                cursor,
                cursor_consumed,
                key_len,
                inc_width,
                has_include,
                key_rle_version,
                avail,
            );

            let plain_bytes_same_n = 2 + candidate.rows as usize * (key_len + inc_width);
            let uniqueness = candidate.entries.len() as f32 / candidate.rows.max(1) as f32;
            let use_rle = candidate.rows > 0
                && candidate.bytes <= avail
                && candidate.bytes < plain_bytes_same_n
                && uniqueness < self.config.rle_uniqueness_threshold;

            let (payload_bytes, last_key, new_cursor, new_consumed, distinct_count, row_count, zone_keys) = if use_rle
            {
                let mut pack_runs: Vec<(Slice, u16, Option<Slice>)> = Vec::with_capacity(candidate.entries.len());
                let mut distinct_count = 0u16;
                let mut last_key_seen: Option<Slice> = None;
                for &(run_idx, take) in &candidate.entries {
                    let key = runs[run_idx].key.clone();
                    if last_key_seen.as_ref() != Some(&key) {
                        distinct_count = distinct_count.saturating_add(1);
                        last_key_seen = Some(key.clone());
                    }
                    pack_runs.push((key, take as u16, runs[run_idx].include.clone()));
                }

                let zone_keys: Vec<Slice> = pack_runs.iter().map(|(k, _, _)| k.clone()).collect();
                let last_key = pack_runs.last().unwrap().0.clone();

                let bytes = if has_include {
                    let triples: Vec<(Slice, u16, Slice)> = pack_runs
                        .iter()
                        .map(|(k, c, inc)| (k.clone(), *c, inc.clone().unwrap_or_else(Slice::empty)))
                        .collect();
                    pack_inc_rle(&triples)
                } else {
                    let pairs: Vec<(Slice, u16)> = pack_runs.iter().map(|(k, c, _)| (k.clone(), *c)).collect();
                    match key_rle_version {
                        KeyRleVersion::V1 => pack_key_rle_v1(&pairs),
                        KeyRleVersion::V2 => {
                            let continues = prev_last_key.as_ref() == Some(&pack_runs[0].0);
                            pack_key_rle_v2(&pairs, continues)
                        }
                        KeyRleVersion::Auto => unreachable!("effective_key_rle_version never returns Auto"),
                    }
                };

                (
                    bytes,
                    last_key,
                    candidate.new_cursor,
                    candidate.new_consumed,
                    distinct_count,
                    candidate.rows,
                    zone_keys,
                )
            } else {
                let plain = scan_plain_candidate(runs, cursor, cursor_consumed, key_len, inc_width, avail);
                let include_columns = split_into_columns(&plain.includes, &self.schema);
                let bytes = pack_plain(&plain.keys, &include_columns);
                let mut distinct_count = 0u16;
                let mut last_key_seen: Option<&Slice> = None;
                for key in &plain.keys {
                    if last_key_seen != Some(key) {
                        distinct_count = distinct_count.saturating_add(1);
                        last_key_seen = Some(key);
                    }
                }
                let last_key = plain.keys.last().unwrap().clone();
                (
                    bytes,
                    last_key,
                    plain.new_cursor,
                    plain.new_consumed,
                    distinct_count,
                    plain.keys.len() as u32,
                    plain.keys,
                )
            };

            let this_leftlink = prev_blkno.unwrap_or(INVALID_BLOCK);
            let trailer = PageTrailer {
                kind: PageKind::Leaf,
                rightlink: INVALID_BLOCK,
                leftlink: this_leftlink,
            };
            let blkno = self.writer.append_page(&payload_bytes, &trailer)?;

            if let Some(prev) = prev_blkno {
                self.writer.rewrite_trailer(
                    prev,
                    &PageTrailer {
                        kind: PageKind::Leaf,
                        rightlink: blkno,
                        leftlink: prev_leftlink,
                    },
                )?;
            }
            prev_leftlink = this_leftlink;

            let zone_map = if self.config.build_zone_maps {
                ZoneMap::from_leaf(zone_keys.iter().map(|k| &**k), row_count, distinct_count)
            } else {
                ZoneMap::empty()
            };

            leaves.push(LevelEntry {
                highkey: last_key.clone(),
                child: blkno,
                zone_map,
            });

            prev_blkno = Some(blkno);
            prev_last_key = Some(last_key);
            cursor = new_cursor;
            cursor_consumed = new_consumed;
        }

        Ok(leaves)
    }

    fn write_levels(&mut self, mut level: Vec<LevelEntry>) -> Result<(u32, u32)> {
        let mut height = 1u32;
        if level.len() == 1 {
            let only = level.into_iter().next().expect("checked len == 1");
            return Ok((only.child, height));
        }

        let key_len = self.schema.key_width();
        let entry_cost = key_len + std::mem::size_of::<u32>() + ZoneMap::SERIALIZED_LEN;
        let avail = payload_capacity();
        let max_entries = ((avail - 2) / entry_cost).max(1);

        while level.len() > 1 {
            let mut next_level = Vec::new();
            for chunk in level.chunks(max_entries) {
                let entries: Vec<InternalEntry> = chunk
                    .iter()
                    .map(|e| InternalEntry {
                        highkey: e.highkey.clone(),
                        child: e.child,
                        zone_map: e.zone_map.clone(),
                    })
                    .collect();
                let zone_map = ZoneMap::aggregate(entries.iter().map(|e| &e.zone_map));
                let highkey = entries.last().expect("chunk is non-empty").highkey.clone();
                let bytes = pack_internal(&entries);
                let blkno = self.writer.append_page(&bytes, &PageTrailer::new_internal())?;
                next_level.push(LevelEntry {
                    highkey,
                    child: blkno,
                    zone_map,
                });
            }
            level = next_level;
            height += 1;
        }

        let root = level.into_iter().next().expect("loop exits with exactly one entry");
        Ok((root.child, height))
    }
}

struct RleCandidate {
    entries: Vec<(usize, u32)>,
    rows: u32,
    bytes: usize,
    new_cursor: usize,
    new_consumed: u32,
}

#[allow(clippy::too_many_arguments)]
fn scan_rle_candidate(
    runs: &[RawRun],
    cursor: usize,
    cursor_consumed: u32,
    key_len: usize,
    inc_width: usize,
    has_include: bool,
    key_rle_version: KeyRleVersion,
    avail: usize,
) -> RleCandidate {
    let header_len = if has_include || key_rle_version == KeyRleVersion::V1 {
        6 // IncludeRle / KeyRleV1: tag, n, nruns
    } else {
        7 // KeyRleV2: + continues_byte
    };
    let entry_cost = key_len + 2 + if has_include { inc_width } else { 0 };

    let mut entries = Vec::new();
    let mut rows = 0u32;
    let mut bytes = header_len;
    let mut i = cursor;
    let mut consumed_here = cursor_consumed;
    let mut new_cursor = cursor;
    let mut new_consumed = cursor_consumed;

    while i < runs.len() {
        if entries.len() >= MAX_RUNS_PER_PAGE || bytes + entry_cost > avail {
            break;
        }
        let room = MAX_ROWS_PER_PAGE.saturating_sub(rows);
        if room == 0 {
            break;
        }
        let available_here = runs[i].count - consumed_here;
        let take = room.min(available_here);
        if take == 0 {
            break;
        }
        bytes += entry_cost;
        rows += take;
        entries.push((i, take));

        if take < available_here {
            new_cursor = i;
            new_consumed = consumed_here + take;
            return RleCandidate {
                entries,
                rows,
                bytes,
                new_cursor,
                new_consumed,
            };
        }

        i += 1;
        consumed_here = 0;
    }

    new_cursor = i;
    new_consumed = 0;
    RleCandidate {
        entries,
        rows,
        bytes,
        new_cursor,
        new_consumed,
    }
}

struct PlainCandidate {
    keys: Vec<Slice>,
    /// One entry per row: the row's whole encoded INCLUDE tuple, still to be
    /// split into per-column blocks by [`split_into_columns`].
    includes: Vec<Slice>,
    new_cursor: usize,
    new_consumed: u32,
}

fn scan_plain_candidate(
    runs: &[RawRun],
    cursor: usize,
    cursor_consumed: u32,
    key_len: usize,
    inc_width: usize,
    avail: usize,
) -> PlainCandidate {
    let row_cost = key_len + inc_width;
    let max_by_capacity = ((avail - 2) / row_cost.max(1)) as u32;
    let max_rows = max_by_capacity.min(MAX_ROWS_PER_PAGE).min(u32::from(MAX_PLAIN_ITEMS));

    let mut keys = Vec::new();
    let mut includes = Vec::new();
    let mut i = cursor;
    let mut consumed = cursor_consumed;
    while i < runs.len() && (keys.len() as u32) < max_rows {
        let take_here = (max_rows - keys.len() as u32).min(runs[i].count - consumed);
        for _ in 0..take_here {
            keys.push(runs[i].key.clone());
            if inc_width > 0 {
                includes.push(runs[i].include.clone().unwrap_or_else(Slice::empty));
            }
        }
        consumed += take_here;
        if consumed == runs[i].count {
            i += 1;
            consumed = 0;
        } else {
            break;
        }
    }

    PlainCandidate {
        keys,
        includes,
        new_cursor: i,
        new_consumed: consumed,
    }
}

/// Splits each row's whole encoded INCLUDE tuple into one `Vec<Slice>` per
/// real column, so [`pack_plain`] can lay them out column-major (§3).
fn split_into_columns(row_tuples: &[Slice], schema: &Schema) -> Vec<Vec<Slice>> {
    if row_tuples.is_empty() {
        return Vec::new();
    }
    let mut columns: Vec<Vec<Slice>> = schema.include_columns().iter().map(|_| Vec::with_capacity(row_tuples.len())).collect();
    for tuple in row_tuples {
        let mut offset = 0usize;
        for (col_idx, col) in schema.include_columns().iter().enumerate() {
            let width = usize::from(col.width);
            columns[col_idx].push(tuple.slice(offset..offset + width));
            offset += width;
        }
    }
    columns
}

fn radix_sort_i64(values: &mut [i64]) {
    let mut encoded: Vec<[u8; 8]> = values.iter().map(|v| encode_i64_ordered(*v)).collect();
    let mut scratch = vec![[0u8; 8]; encoded.len()];

    for byte_idx in (0..8).rev() {
        let mut counts = [0usize; 256];
        for bytes in &encoded {
            counts[bytes[byte_idx] as usize] += 1;
        }
        let mut offsets = [0usize; 256];
        let mut acc = 0;
        for (bucket, count) in counts.iter().enumerate() {
            offsets[bucket] = acc;
            acc += count;
        }
        for bytes in &encoded {
            let bucket = bytes[byte_idx] as usize;
            scratch[offsets[bucket]] = *bytes;
            offsets[bucket] += 1;
        }
        std::mem::swap(&mut encoded, &mut scratch);
    }

    for (slot, bytes) in values.iter_mut().zip(encoded) {
        *slot = decode_i64_ordered(bytes);
    }
}
