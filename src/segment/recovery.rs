//! Reading records from the pages of a segment file, and finding out how much
//! of a segment survived a crash.

use std::io;

use log::error;
use log::warn;

use crate::errors::PageBroken;
use crate::num::div_ceil;
use crate::page::PageDamage;
use crate::page::PageFormat;
use crate::page::PageLayout;
use crate::page::WalPage;
use crate::page::MIN_RECORD_SIZE;
use crate::segment::segment_file::SegmentFile;
use crate::LogSequenceNumber;

/// The intact part of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct RecoveredTail {
    pub(crate) filled_up_to: u64,

    /// Position of the last intact record.
    pub(crate) last: Option<u64>,
}

pub(crate) fn read_verified_page(
    file: &SegmentFile,
    layout: &PageLayout,
    order: u64,
    page_index: u64,
) -> Result<WalPage, io::Error> {
    let bytes = file.read_page(page_index)?;
    let page = WalPage::decode_as(bytes, layout.format())
        .map_err(|damage| PageBroken::new(order, page_index, damage))?;
    Ok(page)
}

/// Read the record starting at `position`, following its continuation chunks
/// across pages. `filled_up_to` bounds the pages the record may span.
pub(crate) fn read_record(
    file: &SegmentFile,
    layout: &PageLayout,
    order: u64,
    position: u64,
    filled_up_to: u64,
) -> Result<Vec<u8>, io::Error> {
    let page_size = layout.page_size() as u64;
    let pages = div_ceil(filled_up_to, page_size);

    let mut page_index = position / page_size;
    let mut offset = (position % page_size) as usize;
    let mut record = Vec::new();

    loop {
        let page = read_verified_page(file, layout, order, page_index)?;

        let chunk = page
            .get_record(offset)
            .map_err(|damage| PageBroken::new(order, page_index, damage))?;
        record.extend_from_slice(chunk);

        if !page.merge_with_next_page(offset) {
            let free_space = page.free_space();
            if free_space >= MIN_RECORD_SIZE && page_index + 1 < pages {
                let damage = PageDamage::UnexpectedFreeSpace { free_space };
                return Err(PageBroken::new(order, page_index, damage).into());
            }
            return Ok(record);
        }

        if page_index + 1 >= pages {
            let damage = PageDamage::DanglingContinuation;
            return Err(PageBroken::new(order, page_index, damage).into());
        }

        page_index += 1;
        offset = layout.records_offset();
    }
}

/// Find the last intact record of a segment.
///
/// With `repair`, broken trailing pages are cut off the file and the free
/// space of the last page is fixed up, so that new records are appended right
/// after the last intact one.
pub(crate) fn recover(
    file: &SegmentFile,
    layout: &PageLayout,
    order: u64,
    repair: bool,
) -> Result<RecoveredTail, io::Error> {
    match layout.format() {
        PageFormat::V1 => recover_v1(file, layout, order, repair),
        PageFormat::V2 => recover_v2(file, layout, order, repair),
    }
}

/// `V2` pages record where their last record ends: scan backward for the last
/// intact page on which a record ends.
fn recover_v2(
    file: &SegmentFile,
    layout: &PageLayout,
    order: u64,
    repair: bool,
) -> Result<RecoveredTail, io::Error> {
    let page_size = layout.page_size();
    let pages = file.pages_count()?;

    let mut page_index = pages;
    let found = loop {
        if page_index == 0 {
            break None;
        }
        page_index -= 1;

        let bytes = file.read_page(page_index)?;
        match WalPage::decode_as(bytes, layout.format()) {
            Err(damage) => {
                warn!(
                    "Page {} of WAL segment {} is broken and will be cut off: {}",
                    page_index, order, damage
                );
            }
            Ok(page) => {
                if let Some(position) = page.last_stored_lsn_position() {
                    break Some((page_index, page, position));
                }
            }
        }
    };

    let Some((page_index, mut page, position)) = found else {
        if pages > 0 {
            error!(
                "WAL segment {} has no intact record in its {} pages, \
                all of its content is lost",
                order, pages
            );
            if repair {
                file.truncate_pages(0)?;
                file.sync()?;
            }
        }
        return Ok(RecoveredTail::default());
    };

    // Whether the file was changed and must be synced.
    let mut repaired = false;

    if page_index + 1 < pages {
        error!(
            "WAL segment {}: pages [{}, {}) are cut off, \
            records after {} are lost",
            order,
            page_index + 1,
            pages,
            LogSequenceNumber::new(order, position)
        );
        if repair {
            file.truncate_pages(page_index + 1)?;
            repaired = true;
        }
    }

    // A record that started after the last complete one may have been torn
    // on a page that is now cut off.
    let end = page.end_of_last_record().filter(|end| *end <= page_size);
    if let Some(end) = end {
        let free_space = page_size - end;
        if page.free_space() != free_space {
            error!(
                "WAL segment {}: page {} has free space {} but its last \
                record ends at {}, the incomplete record after {} is dropped",
                order,
                page_index,
                page.free_space(),
                end,
                LogSequenceNumber::new(order, position)
            );

            page.set_free_space(free_space);
            if repair {
                page.seal();
                file.write_page(page_index, page.as_bytes())?;
                repaired = true;
            }
        }
    }

    if repaired {
        file.sync()?;
    }

    let page_size = page_size as u64;
    Ok(RecoveredTail {
        filled_up_to: page_index * page_size + page_size
            - page.free_space() as u64,
        last: Some(position),
    })
}

/// `V1` pages do not record where records end: cut off broken trailing
/// pages, then walk the records from the beginning until one can not be read.
fn recover_v1(
    file: &SegmentFile,
    layout: &PageLayout,
    order: u64,
    repair: bool,
) -> Result<RecoveredTail, io::Error> {
    let page_size = layout.page_size() as u64;
    let pages = file.pages_count()?;

    let mut intact = None;
    for page_index in (0..pages).rev() {
        let bytes = file.read_page(page_index)?;
        match WalPage::decode_as(bytes, layout.format()) {
            Ok(page) => {
                intact = Some((page_index, page));
                break;
            }
            Err(damage) => {
                warn!(
                    "Page {} of WAL segment {} is broken and will be cut off: {}",
                    page_index, order, damage
                );
            }
        }
    }

    let Some((page_index, page)) = intact else {
        if pages > 0 {
            error!("WAL segment {} has no intact page, all of its content is lost", order);
            if repair {
                file.truncate_pages(0)?;
                file.sync()?;
            }
        }
        return Ok(RecoveredTail::default());
    };

    if page_index + 1 < pages {
        error!(
            "WAL segment {}: pages [{}, {}) are cut off",
            order,
            page_index + 1,
            pages
        );
        if repair {
            file.truncate_pages(page_index + 1)?;
            file.sync()?;
        }
    }

    let upper = page_index * page_size + page_size - page.free_space() as u64;

    let mut tail = RecoveredTail::default();
    let mut position = layout.record_start(0);
    while position < upper {
        match read_record(file, layout, order, position, upper) {
            Ok(record) => {
                let placement = layout.place(position, record.len());
                tail = RecoveredTail {
                    filled_up_to: placement.to,
                    last: Some(position),
                };
                position = layout.record_start(placement.to);
            }
            Err(e) => {
                error!(
                    "WAL segment {}: record at {} can not be read, \
                    the log is cut there: {}",
                    order,
                    LogSequenceNumber::new(order, position),
                    e
                );
                break;
            }
        }
    }

    Ok(tail)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io;

    use crate::page::PageFormat;
    use crate::page::PageLayout;
    use crate::page::WalPage;
    use crate::segment::recovery::read_verified_page;
    use crate::segment::recovery::recover;
    use crate::segment::recovery::RecoveredTail;
    use crate::segment::segment_file::SegmentFile;

    const PAGE_SIZE: usize = 128;

    /// One page holding a complete record at 28 and the first chunk of a
    /// record whose next page never reached the disk.
    fn write_torn_page(path: &str) -> Result<(), io::Error> {
        let mut page = WalPage::new(PAGE_SIZE, PageFormat::V2);

        let end = page.write_chunk(28, &[1; 12], false);
        page.mark_record_end(28, end);
        page.write_chunk(end, &vec![2; PAGE_SIZE - end - 6], true);
        page.seal();

        fs::write(path, page.as_bytes())
    }

    #[test]
    fn test_recover_repairs_and_syncs_last_page() -> Result<(), io::Error> {
        let temp_dir = tempfile::tempdir()?;
        let path = format!("{}/s.0.wal", temp_dir.path().display());
        write_torn_page(&path)?;

        let layout = PageLayout::new(PAGE_SIZE, PageFormat::V2);
        let file = SegmentFile::open(&path, PAGE_SIZE, true)?;

        let want = RecoveredTail {
            filled_up_to: 46,
            last: Some(28),
        };
        assert_eq!(want, recover(&file, &layout, 0, true)?);
        assert_eq!(1, file.sync_count());

        let page = read_verified_page(&file, &layout, 0, 0)?;
        assert_eq!(PAGE_SIZE - 46, page.free_space());

        // Nothing left to repair
        assert_eq!(want, recover(&file, &layout, 0, true)?);
        assert_eq!(1, file.sync_count());

        Ok(())
    }

    #[test]
    fn test_recover_without_repair_leaves_file() -> Result<(), io::Error> {
        let temp_dir = tempfile::tempdir()?;
        let path = format!("{}/s.0.wal", temp_dir.path().display());
        write_torn_page(&path)?;
        let before = fs::read(&path)?;

        let layout = PageLayout::new(PAGE_SIZE, PageFormat::V2);
        let file = SegmentFile::open(&path, PAGE_SIZE, false)?;

        let tail = recover(&file, &layout, 0, false)?;
        assert_eq!(46, tail.filled_up_to);
        assert_eq!(0, file.sync_count());
        assert_eq!(before, fs::read(&path)?);

        Ok(())
    }
}
