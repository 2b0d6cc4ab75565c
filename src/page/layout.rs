use std::cmp::min;
use std::ops::Range;

use crate::page::calculate_record_size;
use crate::page::calculate_serialized_size;
use crate::page::PageFormat;
use crate::page::MIN_RECORD_SIZE;

/// Maps logical records onto the pages of one segment.
///
/// Every writer and reader of a segment derives chunk positions from here, so
/// that a record's LSN, the chunks it is split into, and the LSN of the record
/// that follows it always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    page_size: usize,
    format: PageFormat,
}

/// Where a record of a given size lands: `[from, to)` in segment positions.
///
/// `from` is the LSN position of the record; `to` is the position right after
/// its last chunk, i.e., the new `filled_up_to` of the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub from: u64,
    pub to: u64,
}

/// One chunk of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlacement {
    pub page_index: u64,

    /// In-page offset of the chunk header.
    pub offset: usize,

    /// The slice of the record payload this chunk carries.
    pub range: Range<usize>,

    pub continues: bool,
}

impl PageLayout {
    pub fn new(page_size: usize, format: PageFormat) -> Self {
        Self { page_size, format }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn format(&self) -> PageFormat {
        self.format
    }

    pub fn records_offset(&self) -> usize {
        self.format.records_offset()
    }

    pub fn page_index(&self, position: u64) -> u64 {
        position / self.page_size as u64
    }

    /// Position of the first record on page `page_index`.
    pub fn first_record_position(&self, page_index: u64) -> u64 {
        page_index * self.page_size as u64 + self.records_offset() as u64
    }

    /// The position a record appended after `filled_up_to` starts at.
    ///
    /// A record never starts on a page boundary, and never on a page with
    /// less than [`MIN_RECORD_SIZE`] bytes left.
    pub fn record_start(&self, filled_up_to: u64) -> u64 {
        let page_size = self.page_size as u64;
        let in_page = filled_up_to % page_size;

        if in_page == 0 {
            filled_up_to + self.records_offset() as u64
        } else if page_size - in_page < MIN_RECORD_SIZE as u64 {
            self.first_record_position(filled_up_to / page_size + 1)
        } else {
            filled_up_to
        }
    }

    /// Place a record of `record_size` bytes after `filled_up_to`.
    pub fn place(&self, filled_up_to: u64, record_size: usize) -> Placement {
        let from = self.record_start(filled_up_to);
        let mut chunks = self.chunks(from, record_size);
        for _ in chunks.by_ref() {}

        Placement {
            from,
            to: chunks.position,
        }
    }

    /// Split a record of `record_size` bytes starting at `from` into chunks.
    ///
    /// `from` must be a valid record start, as returned by
    /// [`PageLayout::record_start`]. An empty record still occupies one
    /// chunk.
    pub fn chunks(&self, from: u64, record_size: usize) -> Chunks {
        Chunks {
            layout: *self,
            position: from,
            record_size,
            written: 0,
            done: false,
        }
    }
}

/// Iterator of the chunks of one record, see [`PageLayout::chunks`].
pub struct Chunks {
    layout: PageLayout,
    position: u64,
    record_size: usize,
    written: usize,
    done: bool,
}

impl Iterator for Chunks {
    type Item = ChunkPlacement;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let page_size = self.layout.page_size as u64;
        let page_index = self.position / page_size;
        let offset = (self.position % page_size) as usize;

        let available = calculate_record_size(self.layout.page_size - offset);
        let n = min(available, self.record_size - self.written);

        let range = self.written..self.written + n;
        self.written += n;

        let continues = self.written < self.record_size;
        if continues {
            // This chunk consumed the rest of the page.
            self.position = self.layout.first_record_position(page_index + 1);
        } else {
            let end = offset + calculate_serialized_size(n);
            self.position = page_index * page_size + end as u64;
            self.done = true;
        }

        Some(ChunkPlacement {
            page_index,
            offset,
            range,
            continues,
        })
    }
}
