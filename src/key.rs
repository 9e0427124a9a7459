// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Key and INCLUDE-column shape (§3 "Entities").

use crate::comparator::DynComparator;
use crate::error::{Error, Result};
use crate::slice::Slice;

/// Maximum number of INCLUDE columns an index may carry.
pub const MAX_INCLUDE_COLUMNS: usize = 16;

/// Maximum combined width of a key, in bytes.
pub const MAX_KEY_WIDTH: usize = 16;

/// Text-key cap widths the page layout understands.
pub const TEXT_CAPS: [u16; 3] = [8, 16, 32];

/// Fixed byte width of one key or INCLUDE column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Stride in bytes: 1/2/4/8/16 for fixed binary columns, or one of
    /// [`TEXT_CAPS`] for zero-padded short text.
    pub width: u16,
}

impl ColumnSpec {
    /// A fixed binary column of the given width.
    #[must_use]
    pub fn fixed(width: u16) -> Self {
        Self { width }
    }

    /// A zero-padded short-text column of the given cap.
    ///
    /// # Panics
    ///
    /// Panics if `cap` is not one of [`TEXT_CAPS`].
    #[must_use]
    pub fn text(cap: u16) -> Self {
        assert!(TEXT_CAPS.contains(&cap), "text cap must be 8, 16, or 32");
        Self { width: cap }
    }

    /// Encodes `value` into this column's fixed width, zero-padding on the
    /// right if shorter.
    pub(crate) fn encode(&self, value: &[u8]) -> Result<Slice> {
        let width = usize::from(self.width);
        if value.len() > width {
            return Err(Error::InvalidInput(
                "column value exceeds its fixed/capped width",
            ));
        }
        if value.len() == width {
            return Ok(Slice::from(value));
        }
        let mut buf = vec![0u8; width];
        buf[..value.len()].copy_from_slice(value);
        Ok(Slice::from(buf))
    }
}

/// The schema of an index: its key columns (1 or 2), its INCLUDE columns
/// (up to 16), and the comparator used to order the leading key column.
#[derive(Clone)]
pub struct Schema {
    key_columns: Vec<ColumnSpec>,
    include_columns: Vec<ColumnSpec>,
    comparator: DynComparator,
}

impl Schema {
    /// Builds a schema, validating the column-count invariants of §3/§7.
    pub fn new(
        key_columns: Vec<ColumnSpec>,
        include_columns: Vec<ColumnSpec>,
        comparator: DynComparator,
    ) -> Result<Self> {
        if !(1..=2).contains(&key_columns.len()) {
            return Err(Error::InvalidInput("nkeyatts must be 1 or 2"));
        }
        if include_columns.len() > MAX_INCLUDE_COLUMNS {
            return Err(Error::InvalidInput("at most 16 INCLUDE columns are allowed"));
        }
        let key_width: usize = key_columns.iter().map(|c| usize::from(c.width)).sum();
        if key_width > MAX_KEY_WIDTH {
            return Err(Error::InvalidInput("combined key width exceeds 16 bytes"));
        }
        Ok(Self {
            key_columns,
            include_columns,
            comparator,
        })
    }

    /// Number of key columns (1 or 2).
    #[must_use]
    pub fn key_column_count(&self) -> usize {
        self.key_columns.len()
    }

    /// The key columns, in order.
    #[must_use]
    pub fn key_columns(&self) -> &[ColumnSpec] {
        &self.key_columns
    }

    /// The INCLUDE columns, in order.
    #[must_use]
    pub fn include_columns(&self) -> &[ColumnSpec] {
        &self.include_columns
    }

    /// Combined width in bytes of all key columns, packed `k1‖k2`.
    #[must_use]
    pub fn key_width(&self) -> usize {
        self.key_columns.iter().map(|c| usize::from(c.width)).sum()
    }

    /// Width in bytes of the leading key column alone.
    #[must_use]
    pub fn leading_key_width(&self) -> usize {
        usize::from(self.key_columns[0].width)
    }

    /// Combined width in bytes of all INCLUDE columns.
    #[must_use]
    pub fn include_width(&self) -> usize {
        self.include_columns
            .iter()
            .map(|c| usize::from(c.width))
            .sum()
    }

    /// The comparator used for ordering and range bounds.
    #[must_use]
    pub fn comparator(&self) -> &DynComparator {
        &self.comparator
    }

    /// Encodes one input row's key columns into the packed, fixed-width key
    /// representation stored on every page.
    pub fn encode_key(&self, parts: &[Option<Slice>]) -> Result<Slice> {
        if parts.len() != self.key_columns.len() {
            return Err(Error::InvalidInput("wrong key-attribute count"));
        }
        let mut buf = Vec::with_capacity(self.key_width());
        for (col, part) in self.key_columns.iter().zip(parts) {
            let Some(value) = part else {
                return Err(Error::InvalidInput("NULL key value"));
            };
            buf.extend_from_slice(&col.encode(value)?);
        }
        Ok(Slice::from(buf))
    }

    /// Encodes one input row's INCLUDE columns into the packed representation.
    pub fn encode_include(&self, parts: &[Option<Slice>]) -> Result<Slice> {
        if parts.len() != self.include_columns.len() {
            return Err(Error::InvalidInput("wrong INCLUDE-attribute count"));
        }
        let mut buf = Vec::with_capacity(self.include_width());
        for (col, part) in self.include_columns.iter().zip(parts) {
            let Some(value) = part else {
                return Err(Error::InvalidInput("NULL INCLUDE value"));
            };
            buf.extend_from_slice(&col.encode(value)?);
        }
        Ok(Slice::from(buf))
    }

    /// Splits a packed key back into its per-column sub-slices.
    #[must_use]
    pub fn split_key<'a>(&self, key: &'a [u8]) -> Vec<&'a [u8]> {
        let mut out = Vec::with_capacity(self.key_columns.len());
        let mut offset = 0;
        for col in &self.key_columns {
            let width = usize::from(col.width);
            out.push(&key[offset..offset + width]);
            offset += width;
        }
        out
    }
}

/// One input row: a sorted (or to-be-sorted) stream element. `key_parts` and
/// `include_parts` use `None` for a SQL-style NULL, which is always a fatal
/// build error (§3 Non-goals: no NULL keys).
#[derive(Clone)]
pub struct Row {
    /// One entry per key column.
    pub key_parts: Vec<Option<Slice>>,
    /// One entry per INCLUDE column.
    pub include_parts: Vec<Option<Slice>>,
}

impl Row {
    /// Builds a row from already-non-null parts.
    #[must_use]
    pub fn new(key_parts: Vec<Slice>, include_parts: Vec<Slice>) -> Self {
        Self {
            key_parts: key_parts.into_iter().map(Some).collect(),
            include_parts: include_parts.into_iter().map(Some).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::CLocaleComparator;
    use std::sync::Arc;
    use test_log::test;

    fn schema_i32() -> Schema {
        Schema::new(
            vec![ColumnSpec::fixed(4)],
            vec![],
            Arc::new(CLocaleComparator),
        )
        .unwrap()
    }

    #[test]
    fn rejects_too_many_key_columns() {
        let err = Schema::new(
            vec![ColumnSpec::fixed(4), ColumnSpec::fixed(4), ColumnSpec::fixed(4)],
            vec![],
            Arc::new(CLocaleComparator),
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_too_many_include_columns() {
        let includes = (0..17).map(|_| ColumnSpec::fixed(4)).collect();
        let err = Schema::new(vec![ColumnSpec::fixed(4)], includes, Arc::new(CLocaleComparator));
        assert!(err.is_err());
    }

    #[test]
    fn text_column_zero_pads() {
        let col = ColumnSpec::text(8);
        let encoded = col.encode(b"ab").unwrap();
        assert_eq!(&*encoded, b"ab\0\0\0\0\0\0");
    }

    #[test]
    fn encode_key_rejects_null() {
        let schema = schema_i32();
        let err = schema.encode_key(&[None]);
        assert!(err.is_err());
    }

    #[test]
    fn split_key_roundtrips_two_columns() {
        let schema = Schema::new(
            vec![ColumnSpec::fixed(4), ColumnSpec::fixed(4)],
            vec![],
            Arc::new(CLocaleComparator),
        )
        .unwrap();

        let key = schema
            .encode_key(&[
                Some(Slice::from(1i32.to_be_bytes().as_slice())),
                Some(Slice::from(2i32.to_be_bytes().as_slice())),
            ])
            .unwrap();

        let parts = schema.split_key(&key);
        assert_eq!(parts[0], 1i32.to_be_bytes());
        assert_eq!(parts[1], 2i32.to_be_bytes());
    }
}
