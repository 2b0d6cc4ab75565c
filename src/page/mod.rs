//! Fixed-size WAL page codec.
//!
//! A page is `crc | magic | free_space | [v2 fields] | chunk...`, all integers
//! big-endian. Each chunk is `continues | is_tail | len | payload`; a logical
//! record is the concatenation of a chunk flagged `continues` and the leading
//! chunks of the following pages, up to the one with `continues` clear.

mod layout;
mod page_format;

use std::fmt;

use byteorder::BigEndian;
use byteorder::ByteOrder;

pub use self::layout::ChunkPlacement;
pub use self::layout::Chunks;
pub use self::layout::PageLayout;
pub use self::layout::Placement;
pub use self::page_format::PageFormat;

/// `continues(1B) | is_tail(1B) | length(4B)`
pub const CHUNK_HEADER_SIZE: usize = 6;

/// A chunk must carry at least one payload byte, a page with less free space
/// than this is considered full.
pub const MIN_RECORD_SIZE: usize = CHUNK_HEADER_SIZE + 1;

/// On-page footprint of a chunk carrying `record_size` payload bytes.
pub fn calculate_serialized_size(record_size: usize) -> usize {
    record_size + CHUNK_HEADER_SIZE
}

/// Payload bytes a chunk can carry in `serialized_size` bytes of page space.
pub fn calculate_record_size(serialized_size: usize) -> usize {
    serialized_size.saturating_sub(CHUNK_HEADER_SIZE)
}

/// Why a page read from disk can not be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
pub enum PageDamage {
    #[error("unknown magic number 0x{0:016x}")]
    BadMagic(u64),

    #[error("crc32 mismatch: stored 0x{stored:08x}, actual 0x{actual:08x}")]
    ChecksumMismatch { stored: u32, actual: u32 },

    #[error("page is {actual} while the segment is {expected}")]
    UnexpectedFormat {
        expected: PageFormat,
        actual: PageFormat,
    },

    #[error("free space {free_space} exceeds the page capacity")]
    BadFreeSpace { free_space: usize },

    #[error("bad chunk at offset {offset}: {reason}")]
    BadChunk { offset: usize, reason: &'static str },

    #[error("record continues beyond the last written page")]
    DanglingContinuation,

    #[error("record ends on a non-last page that still has {free_space} bytes free")]
    UnexpectedFreeSpace { free_space: usize },
}

/// One WAL page image.
#[derive(Clone, PartialEq, Eq)]
pub struct WalPage {
    buf: Vec<u8>,
    format: PageFormat,
}

impl fmt::Debug for WalPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalPage")
            .field("format", &self.format)
            .field("page_size", &self.page_size())
            .field("free_space", &self.free_space())
            .field("last_stored_lsn_position", &self.last_stored_lsn_position())
            .field("end_of_last_record", &self.end_of_last_record())
            .finish()
    }
}

impl WalPage {
    /// Create an empty page: all space after the header is free and, for
    /// `V2`, no record ends on it.
    pub fn new(page_size: usize, format: PageFormat) -> Self {
        let mut page = Self {
            buf: vec![0u8; page_size],
            format,
        };
        page.set_free_space(page_size - format.records_offset());
        page.write_i64_field(format.last_stored_lsn_offset(), -1);
        page.write_i32_field(format.end_of_last_record_offset(), -1);
        page.seal();
        page
    }

    /// Parse a page read from disk, verifying its magic number and CRC.
    pub fn decode(buf: Vec<u8>) -> Result<Self, PageDamage> {
        if buf.len() < PageFormat::V2.records_offset() + MIN_RECORD_SIZE {
            return Err(PageDamage::BadChunk {
                offset: 0,
                reason: "page is shorter than its header",
            });
        }

        let magic = BigEndian::read_u64(&buf[PageFormat::MAGIC_OFFSET..]);
        let format =
            PageFormat::from_magic(magic).ok_or(PageDamage::BadMagic(magic))?;

        let stored = BigEndian::read_u32(&buf[PageFormat::CRC_OFFSET..]);
        let actual = crc32fast::hash(&buf[PageFormat::MAGIC_OFFSET..]);
        if stored != actual {
            return Err(PageDamage::ChecksumMismatch { stored, actual });
        }

        let page = Self { buf, format };

        let free_space = page.free_space();
        if free_space > page.page_size() - format.records_offset() {
            return Err(PageDamage::BadFreeSpace { free_space });
        }

        Ok(page)
    }

    /// Like [`WalPage::decode`], additionally requiring the given format.
    pub fn decode_as(
        buf: Vec<u8>,
        expected: PageFormat,
    ) -> Result<Self, PageDamage> {
        let page = Self::decode(buf)?;
        if page.format != expected {
            return Err(PageDamage::UnexpectedFormat {
                expected,
                actual: page.format,
            });
        }
        Ok(page)
    }

    pub fn format(&self) -> PageFormat {
        self.format
    }

    pub fn page_size(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn free_space(&self) -> usize {
        BigEndian::read_u32(&self.buf[PageFormat::FREE_SPACE_OFFSET..]) as usize
    }

    pub(crate) fn set_free_space(&mut self, free_space: usize) {
        BigEndian::write_u32(
            &mut self.buf[PageFormat::FREE_SPACE_OFFSET..],
            free_space as u32,
        );
    }

    /// Segment position of the last record whose final chunk is on this
    /// page. Always `None` for `V1` pages.
    pub fn last_stored_lsn_position(&self) -> Option<u64> {
        let offset = self.format.last_stored_lsn_offset()?;
        let v = BigEndian::read_i64(&self.buf[offset..]);
        if v < 0 {
            None
        } else {
            Some(v as u64)
        }
    }

    /// In-page offset right after the last record ending on this page.
    pub fn end_of_last_record(&self) -> Option<usize> {
        let offset = self.format.end_of_last_record_offset()?;
        let v = BigEndian::read_i32(&self.buf[offset..]);
        if v < 0 {
            None
        } else {
            Some(v as usize)
        }
    }

    /// Record that a record starting at segment `position` ends on this page
    /// at in-page offset `end`. A no-op for `V1`.
    pub(crate) fn mark_record_end(&mut self, position: u64, end: usize) {
        self.write_i64_field(self.format.last_stored_lsn_offset(), position as i64);
        self.write_i32_field(self.format.end_of_last_record_offset(), end as i32);
    }

    /// Write one chunk at `offset` and return the in-page offset right after
    /// it. The free space is updated to what remains after the chunk.
    pub(crate) fn write_chunk(
        &mut self,
        offset: usize,
        payload: &[u8],
        continues: bool,
    ) -> usize {
        let end = offset + calculate_serialized_size(payload.len());
        debug_assert!(offset >= self.format.records_offset());
        debug_assert!(end <= self.page_size());

        self.buf[offset] = continues as u8;
        self.buf[offset + 1] = (!continues) as u8;
        BigEndian::write_u32(&mut self.buf[offset + 2..], payload.len() as u32);
        self.buf[offset + CHUNK_HEADER_SIZE..end].copy_from_slice(payload);

        let page_size = self.page_size();
        self.set_free_space(page_size - end);
        end
    }

    /// Returns the payload of the chunk starting at `offset`.
    pub fn get_record(&self, offset: usize) -> Result<&[u8], PageDamage> {
        self.check_chunk_header(offset)?;

        let len = BigEndian::read_u32(&self.buf[offset + 2..]) as usize;
        let start = offset + CHUNK_HEADER_SIZE;
        if len > self.page_size() - start {
            return Err(PageDamage::BadChunk {
                offset,
                reason: "chunk payload exceeds the page",
            });
        }
        Ok(&self.buf[start..start + len])
    }

    /// Whether the record whose chunk starts at `offset` continues on the
    /// next page.
    pub fn merge_with_next_page(&self, offset: usize) -> bool {
        if self.check_chunk_header(offset).is_err() {
            return false;
        }
        self.buf[offset] != 0
    }

    /// Stamp the magic number and CRC; must be called before the page is
    /// written to disk.
    pub(crate) fn seal(&mut self) {
        let magic = self.format.magic();
        BigEndian::write_u64(&mut self.buf[PageFormat::MAGIC_OFFSET..], magic);

        let crc = crc32fast::hash(&self.buf[PageFormat::MAGIC_OFFSET..]);
        BigEndian::write_u32(&mut self.buf[PageFormat::CRC_OFFSET..], crc);
    }

    fn check_chunk_header(&self, offset: usize) -> Result<(), PageDamage> {
        if offset < self.format.records_offset()
            || offset + CHUNK_HEADER_SIZE > self.page_size()
        {
            return Err(PageDamage::BadChunk {
                offset,
                reason: "chunk header is outside the record area",
            });
        }
        Ok(())
    }

    fn write_i64_field(&mut self, offset: Option<usize>, v: i64) {
        if let Some(offset) = offset {
            BigEndian::write_i64(&mut self.buf[offset..], v);
        }
    }

    fn write_i32_field(&mut self, offset: Option<usize>, v: i32) {
        if let Some(offset) = offset {
            BigEndian::write_i32(&mut self.buf[offset..], v);
        }
    }
}
