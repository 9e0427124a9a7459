// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Block 0: the metapage (§3 "Metapage", §5 "Ordering guarantees").
//!
//! `root_blkno` and `height` are the last fields a builder writes; a reader
//! that observes a committed metapage is guaranteed to see every page the
//! tree reaches from it.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::page::{FORMAT_VERSION, MAGIC_BYTES};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::key::MAX_INCLUDE_COLUMNS;

/// Block number of an empty index's (nonexistent) root.
pub const INVALID_ROOT: u32 = u32::MAX;

/// The index's fixed metadata, committed once at the end of a build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metapage {
    /// Number of leading key columns (1 or 2).
    pub nkeyatts: u8,
    /// Width in bytes of the first key column.
    pub key_len1: u16,
    /// Width in bytes of the second key column, or 0 if `nkeyatts == 1`.
    pub key_len2: u16,
    /// Block number of the root page, or [`INVALID_ROOT`] if the index is
    /// empty.
    pub root_blkno: u32,
    /// Tree height: `0` for an empty index, `1` for a single leaf, and so on.
    pub height: u32,
    /// Number of INCLUDE columns.
    pub inc_count: u8,
    /// Width in bytes of each INCLUDE column, `0`-padded beyond `inc_count`.
    pub inc_len: [u16; MAX_INCLUDE_COLUMNS],
    /// Host-assigned collation identifier, opaque to the core.
    pub collation_oid: u32,
    /// Block number of the top-level directory page (equal to `root_blkno`
    /// for a single-level tree; kept distinct for host compatibility).
    pub directory_blkno: u32,
    /// Whether this index carries zone maps.
    pub zone_maps_enabled: bool,
}

impl Metapage {
    /// A metapage for an index with no rows yet: `height = 0`, invalid root.
    #[must_use]
    pub fn empty(nkeyatts: u8, key_len1: u16, key_len2: u16, inc_len: [u16; MAX_INCLUDE_COLUMNS], inc_count: u8, collation_oid: u32) -> Self {
        Self {
            nkeyatts,
            key_len1,
            key_len2,
            root_blkno: INVALID_ROOT,
            height: 0,
            inc_count,
            inc_len,
            collation_oid,
            directory_blkno: INVALID_ROOT,
            zone_maps_enabled: true,
        }
    }

    /// `true` if the index has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.root_blkno == INVALID_ROOT
    }
}

impl Encode for Metapage {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&MAGIC_BYTES)?;
        writer.write_u16::<BigEndian>(FORMAT_VERSION)?;
        writer.write_u8(self.nkeyatts)?;
        writer.write_u16::<BigEndian>(self.key_len1)?;
        writer.write_u16::<BigEndian>(self.key_len2)?;
        writer.write_u32::<BigEndian>(self.root_blkno)?;
        writer.write_u32::<BigEndian>(self.height)?;
        writer.write_u8(self.inc_count)?;
        for len in &self.inc_len {
            writer.write_u16::<BigEndian>(*len)?;
        }
        writer.write_u32::<BigEndian>(self.collation_oid)?;
        writer.write_u32::<BigEndian>(self.directory_blkno)?;
        writer.write_u8(u8::from(self.zone_maps_enabled))?;
        Ok(())
    }
}

impl Decode for Metapage {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut magic = [0u8; MAGIC_BYTES.len()];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC_BYTES {
            return Err(DecodeError::InvalidTag("metapage magic"));
        }

        let version = reader.read_u16::<BigEndian>()?;
        if version != FORMAT_VERSION {
            return Err(DecodeError::InvalidTag("metapage version"));
        }

        let nkeyatts = reader.read_u8()?;
        let key_len1 = reader.read_u16::<BigEndian>()?;
        let key_len2 = reader.read_u16::<BigEndian>()?;
        let root_blkno = reader.read_u32::<BigEndian>()?;
        let height = reader.read_u32::<BigEndian>()?;
        let inc_count = reader.read_u8()?;

        let mut inc_len = [0u16; MAX_INCLUDE_COLUMNS];
        for len in &mut inc_len {
            *len = reader.read_u16::<BigEndian>()?;
        }

        let collation_oid = reader.read_u32::<BigEndian>()?;
        let directory_blkno = reader.read_u32::<BigEndian>()?;
        let zone_maps_enabled = reader.read_u8()? != 0;

        Ok(Self {
            nkeyatts,
            key_len1,
            key_len2,
            root_blkno,
            height,
            inc_count,
            inc_len,
            collation_oid,
            directory_blkno,
            zone_maps_enabled,
        })
    }
}
