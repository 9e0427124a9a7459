// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-page header and trailer (§6 "Page files").
//!
//! Every page is `[Header][payload bytes][Trailer]`. The header carries a
//! checksum over the payload; the trailer is the "opaque area" carrying
//! sibling links and the leaf/internal flag.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::page::checksum::Checksum;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Sentinel block number meaning "no such sibling".
pub const INVALID_BLOCK: u32 = u32::MAX;

/// Front-of-page header: checksum and payload length.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageHeader {
    /// Checksum of the payload bytes that follow.
    pub checksum: Checksum,
    /// Length of the payload, in bytes.
    pub payload_len: u16,
}

impl PageHeader {
    /// Serialized size of the header, in bytes.
    pub const SERIALIZED_LEN: usize = std::mem::size_of::<u64>() + std::mem::size_of::<u16>();
}

impl Encode for PageHeader {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u64::<BigEndian>(*self.checksum)?;
        writer.write_u16::<BigEndian>(self.payload_len)?;
        Ok(())
    }
}

impl Decode for PageHeader {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let checksum = Checksum::from_raw(reader.read_u64::<BigEndian>()?);
        let payload_len = reader.read_u16::<BigEndian>()?;
        Ok(Self {
            checksum,
            payload_len,
        })
    }
}

/// Whether a page is a leaf or an internal directory page.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PageKind {
    /// Stores key/INCLUDE bytes.
    Leaf,
    /// Stores `{highkey, child, zone-map}` entries.
    Internal,
}

/// End-of-page "opaque" area: the leaf/internal flag and sibling links.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageTrailer {
    /// Leaf or internal.
    pub kind: PageKind,
    /// Block number of the next sibling in key order, or [`INVALID_BLOCK`].
    pub rightlink: u32,
    /// Block number of the previous sibling in key order, or [`INVALID_BLOCK`].
    pub leftlink: u32,
}

impl PageTrailer {
    /// Serialized size of the trailer, in bytes.
    pub const SERIALIZED_LEN: usize = std::mem::size_of::<u8>() + 2 * std::mem::size_of::<u32>();

    /// A trailer for a leaf with no siblings yet (both links invalid).
    #[must_use]
    pub fn new_leaf() -> Self {
        Self {
            kind: PageKind::Leaf,
            rightlink: INVALID_BLOCK,
            leftlink: INVALID_BLOCK,
        }
    }

    /// A trailer for an internal page (never sibling-linked).
    #[must_use]
    pub fn new_internal() -> Self {
        Self {
            kind: PageKind::Internal,
            rightlink: INVALID_BLOCK,
            leftlink: INVALID_BLOCK,
        }
    }
}

impl Encode for PageTrailer {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let flag = match self.kind {
            PageKind::Leaf => 0u8,
            PageKind::Internal => 1u8,
        };
        writer.write_u8(flag)?;
        writer.write_u32::<BigEndian>(self.rightlink)?;
        writer.write_u32::<BigEndian>(self.leftlink)?;
        Ok(())
    }
}

impl Decode for PageTrailer {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let kind = match reader.read_u8()? {
            0 => PageKind::Leaf,
            1 => PageKind::Internal,
            _ => return Err(DecodeError::InvalidTag("page trailer flags")),
        };
        let rightlink = reader.read_u32::<BigEndian>()?;
        let leftlink = reader.read_u32::<BigEndian>()?;
        Ok(Self {
            kind,
            rightlink,
            leftlink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_log::test;

    #[test]
    fn header_roundtrip() {
        let header = PageHeader {
            checksum: Checksum::from_raw(0xDEAD_BEEF),
            payload_len: 123,
        };
        let bytes = header.encode_into_vec();
        assert_eq!(bytes.len(), PageHeader::SERIALIZED_LEN);
        let decoded = PageHeader::decode_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn trailer_roundtrip_leaf() {
        let trailer = PageTrailer {
            kind: PageKind::Leaf,
            rightlink: 7,
            leftlink: INVALID_BLOCK,
        };
        let bytes = trailer.encode_into_vec();
        assert_eq!(bytes.len(), PageTrailer::SERIALIZED_LEN);
        let decoded = PageTrailer::decode_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(trailer, decoded);
    }

    #[test]
    fn trailer_rejects_bad_flag() {
        let bytes = [2u8, 0, 0, 0, 0, 0, 0, 0, 0];
        let err = PageTrailer::decode_from(&mut Cursor::new(bytes));
        assert!(err.is_err());
    }
}
