// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The page file: a sequence of fixed-size blocks on disk, opened for
//! read-only random access (§6 "Page files", §5 "Page sharing").
//!
//! Pages are immutable once written, so sharing one between concurrent
//! scans needs nothing beyond a reference count — there is no reader-writer
//! lock anywhere in [`PageFile`]. The builder ([`crate::builder`]) is the
//! only writer, and it never shares a `PageFile` with a reader.

use crate::coding::{Decode, Encode};
use crate::error::{Error, Result};
use crate::page::checksum::Checksum;
use crate::page::header::{PageHeader, PageTrailer};
use crate::page::metapage::Metapage;
use crate::page::PAGE_SIZE;
use crate::slice::Slice;
use quick_cache::sync::Cache;
use quick_cache::Weighter;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// One page's parsed header, payload, and trailer, as cached in memory.
#[derive(Debug)]
pub struct RawPage {
    /// The page's front header.
    pub header: PageHeader,
    /// The page's payload bytes (checksum-verified at load time).
    pub payload: Slice,
    /// The page's end-of-page opaque area.
    pub trailer: PageTrailer,
}

/// A shared, reference-counted handle to a page's bytes.
///
/// Post-build, pages never change, so "pinning" a page is exactly holding a
/// clone of this handle — there is no separate pin/unpin bookkeeping and no
/// lock to release (§5 "Page sharing").
pub type PagePin = Arc<RawPage>;

#[derive(Clone)]
struct PageWeighter;

impl Weighter<u32, PagePin> for PageWeighter {
    fn weight(&self, _: &u32, _: &PagePin) -> u64 {
        PAGE_SIZE as u64
    }
}

/// Default page cache capacity, in bytes, when a caller doesn't override it.
pub const DEFAULT_CACHE_BYTES: u64 = 32 * 1024 * 1024;

/// A read-only handle to a built index's page file.
pub struct PageFile {
    file: Mutex<File>,
    cache: Cache<u32, PagePin, PageWeighter, rustc_hash::FxBuildHasher>,
    metapage: Metapage,
}

impl PageFile {
    /// Opens a page file, reading and validating its metapage.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_cache_bytes(path, DEFAULT_CACHE_BYTES)
    }

    /// Opens a page file with an explicit page-cache budget.
    pub fn open_with_cache_bytes(path: &Path, cache_bytes: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut block0 = vec![0u8; PAGE_SIZE];
        file.read_exact(&mut block0)?;
        let metapage = Metapage::decode_from(&mut block0.as_slice())?;

        let cache = Cache::with(
            1_024,
            cache_bytes,
            PageWeighter,
            rustc_hash::FxBuildHasher::default(),
            quick_cache::sync::DefaultLifecycle::default(),
        );

        Ok(Self {
            file: Mutex::new(file),
            cache,
            metapage,
        })
    }

    /// The index's metadata.
    #[must_use]
    pub fn metapage(&self) -> &Metapage {
        &self.metapage
    }

    /// Reads (and, unless cached, checksum-verifies) block `blkno`.
    ///
    /// `blkno` must not be `0` — the metapage is read once at [`Self::open`]
    /// and is not cached as a regular page.
    pub fn read_page(&self, blkno: u32) -> Result<PagePin> {
        debug_assert_ne!(blkno, 0, "block 0 is the metapage, never a regular page");

        if let Some(page) = self.cache.get(&blkno) {
            return Ok(page);
        }

        let mut raw = vec![0u8; PAGE_SIZE];
        {
            let mut file = self.file.lock().expect("page file lock poisoned");
            file.seek(SeekFrom::Start(u64::from(blkno) * PAGE_SIZE as u64))?;
            file.read_exact(&mut raw)?;
        }

        let mut cursor = raw.as_slice();
        let header = PageHeader::decode_from(&mut cursor)?;

        let payload_start = PageHeader::SERIALIZED_LEN;
        let payload_end = payload_start + usize::from(header.payload_len);
        if payload_end + PageTrailer::SERIALIZED_LEN > raw.len() {
            return Err(Error::FormatViolation("page payload_len overruns the page"));
        }
        let payload_bytes = &raw[payload_start..payload_end];

        let computed = Checksum::compute(payload_bytes);
        if computed != header.checksum {
            return Err(Error::FormatViolation("page checksum mismatch"));
        }

        let mut trailer_cursor = &raw[raw.len() - PageTrailer::SERIALIZED_LEN..];
        let trailer = PageTrailer::decode_from(&mut trailer_cursor)?;

        let payload = Slice::from(payload_bytes);
        let page = Arc::new(RawPage {
            header,
            payload,
            trailer,
        });

        self.cache.insert(blkno, page.clone());
        Ok(page)
    }
}

/// Sequential, single-threaded writer used by the builder (§4.3).
///
/// Block 0 is reserved with zeros on creation and only overwritten by
/// [`PageFileWriter::commit_metapage`], which is always the writer's last
/// call — so a reader can never observe a metapage whose `root_blkno`
/// points at pages that weren't fully written (§5 "Ordering guarantees").
pub struct PageFileWriter {
    file: File,
    next_blkno: u32,
}

impl PageFileWriter {
    /// Creates a fresh page file, reserving block 0 for the metapage.
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = File::create(path)?;
        file.write_all(&vec![0u8; PAGE_SIZE])?;
        Ok(Self { file, next_blkno: 1 })
    }

    /// Appends one page, returning its block number.
    pub fn append_page(&mut self, payload: &[u8], trailer: &PageTrailer) -> Result<u32> {
        if payload.len() > crate::page::payload_capacity() {
            return Err(Error::RowTooLarge {
                row_len: payload.len(),
                available: crate::page::payload_capacity(),
            });
        }

        let header = PageHeader {
            checksum: Checksum::compute(payload),
            payload_len: payload.len() as u16,
        };

        let mut block = header.encode_into_vec();
        block.extend_from_slice(payload);
        block.resize(PAGE_SIZE - PageTrailer::SERIALIZED_LEN, 0);
        block.extend_from_slice(&trailer.encode_into_vec());
        debug_assert_eq!(block.len(), PAGE_SIZE);

        self.file.write_all(&block)?;

        let blkno = self.next_blkno;
        self.next_blkno += 1;
        Ok(blkno)
    }

    /// Overwrites a previously-written page's trailer in place.
    ///
    /// Used to back-patch a leaf's `rightlink` once its successor has been
    /// written — the two page writes are never held open simultaneously
    /// (§5 "Page sharing").
    pub fn rewrite_trailer(&mut self, blkno: u32, trailer: &PageTrailer) -> Result<()> {
        let offset =
            u64::from(blkno) * PAGE_SIZE as u64 + (PAGE_SIZE - PageTrailer::SERIALIZED_LEN) as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&trailer.encode_into_vec())?;
        Ok(())
    }

    /// The next block number [`Self::append_page`] will hand out.
    #[must_use]
    pub fn next_blkno(&self) -> u32 {
        self.next_blkno
    }

    /// Writes the metapage to block 0 and fsyncs. Consumes the writer:
    /// nothing may be appended after commit.
    pub fn commit_metapage(mut self, metapage: &Metapage) -> Result<()> {
        let mut block0 = metapage.encode_into_vec();
        block0.resize(PAGE_SIZE, 0);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&block0)?;
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Encode;
    use crate::page::header::PageKind;
    use test_log::test;

    fn write_test_file(dir: &Path, metapage: &Metapage, pages: &[(Vec<u8>, PageTrailer)]) -> std::path::PathBuf {
        use std::io::Write;

        let path = dir.join("index.smol");
        let mut file = File::create(&path).unwrap();

        let mut block0 = metapage.encode_into_vec();
        block0.resize(PAGE_SIZE, 0);
        file.write_all(&block0).unwrap();

        for (payload, trailer) in pages {
            let header = PageHeader {
                checksum: Checksum::compute(payload),
                payload_len: payload.len() as u16,
            };
            let mut block = header.encode_into_vec();
            block.extend_from_slice(payload);
            block.resize(PAGE_SIZE - PageTrailer::SERIALIZED_LEN, 0);
            block.extend_from_slice(&trailer.encode_into_vec());
            assert_eq!(block.len(), PAGE_SIZE);
            file.write_all(&block).unwrap();
        }

        file.sync_all().unwrap();
        path
    }

    #[test]
    fn open_reads_metapage() {
        let dir = tempfile::tempdir().unwrap();
        let metapage = Metapage::empty(1, 4, 0, [0; crate::key::MAX_INCLUDE_COLUMNS], 0, 0);
        let path = write_test_file(dir.path(), &metapage, &[]);

        let pf = PageFile::open(&path).unwrap();
        assert!(pf.metapage().is_empty());
    }

    #[test]
    fn read_page_verifies_checksum_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let metapage = Metapage {
            root_blkno: 1,
            height: 1,
            ..Metapage::empty(1, 4, 0, [0; crate::key::MAX_INCLUDE_COLUMNS], 0, 0)
        };
        let payload = b"hello page".to_vec();
        let trailer = PageTrailer::new_leaf();
        let path = write_test_file(dir.path(), &metapage, &[(payload.clone(), trailer)]);

        let pf = PageFile::open(&path).unwrap();
        let page = pf.read_page(1).unwrap();
        assert_eq!(&*page.payload, payload.as_slice());
        assert_eq!(page.trailer.kind, PageKind::Leaf);

        let cached = pf.read_page(1).unwrap();
        assert!(Arc::ptr_eq(&page, &cached));
    }

    #[test]
    fn writer_round_trips_through_page_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("written.smol");

        let mut writer = PageFileWriter::create(&path).unwrap();
        let leaf1 = writer.append_page(b"leaf one", &PageTrailer::new_leaf()).unwrap();
        let leaf2 = writer.append_page(b"leaf two", &PageTrailer::new_leaf()).unwrap();
        writer
            .rewrite_trailer(
                leaf1,
                &PageTrailer {
                    kind: PageKind::Leaf,
                    rightlink: leaf2,
                    leftlink: crate::page::header::INVALID_BLOCK,
                },
            )
            .unwrap();

        let metapage = Metapage {
            root_blkno: leaf1,
            height: 1,
            ..Metapage::empty(1, 4, 0, [0; crate::key::MAX_INCLUDE_COLUMNS], 0, 0)
        };
        writer.commit_metapage(&metapage).unwrap();

        let pf = PageFile::open(&path).unwrap();
        assert_eq!(pf.metapage().root_blkno, leaf1);

        let page1 = pf.read_page(leaf1).unwrap();
        assert_eq!(&*page1.payload, b"leaf one");
        assert_eq!(page1.trailer.rightlink, leaf2);

        let page2 = pf.read_page(leaf2).unwrap();
        assert_eq!(&*page2.payload, b"leaf two");
    }

    #[test]
    fn corrupted_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let metapage = Metapage {
            root_blkno: 1,
            height: 1,
            ..Metapage::empty(1, 4, 0, [0; crate::key::MAX_INCLUDE_COLUMNS], 0, 0)
        };
        let payload = b"hello page".to_vec();
        let path = write_test_file(dir.path(), &metapage, &[(payload, PageTrailer::new_leaf())]);

        // Flip a payload byte after the checksum was computed over the original.
        let mut bytes = std::fs::read(&path).unwrap();
        let corrupt_at = PAGE_SIZE + PageHeader::SERIALIZED_LEN;
        bytes[corrupt_at] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let pf = PageFile::open(&path).unwrap();
        let err = pf.read_page(1);
        assert!(err.is_err());
    }
}
