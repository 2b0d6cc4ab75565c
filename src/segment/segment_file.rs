use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
#[cfg(test)]
use std::sync::atomic::AtomicU64;
#[cfg(test)]
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use byteorder::BigEndian;
use byteorder::ByteOrder;
use codeq::error_context_ext::ErrorContextExt;

use crate::num::div_ceil;
use crate::page::PageFormat;

/// Page granular access to one segment file.
///
/// Shared by the coordinator, which reads, and the background writer, which
/// writes; the file cursor is protected by a mutex.
#[derive(Debug)]
pub(crate) struct SegmentFile {
    path: String,
    page_size: usize,
    f: Mutex<File>,

    /// Number of `sync()` calls that reached the disk.
    #[cfg(test)]
    syncs: AtomicU64,
}

impl SegmentFile {
    /// Create a new empty segment file, failing if it exists.
    pub(crate) fn create(path: &str, page_size: usize) -> Result<Self, io::Error> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .context(|| format!("create segment file '{}'", path))?;

        Ok(Self::new(path, page_size, f))
    }

    pub(crate) fn open(
        path: &str,
        page_size: usize,
        writable: bool,
    ) -> Result<Self, io::Error> {
        let f = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .context(|| format!("open segment file '{}'", path))?;

        Ok(Self::new(path, page_size, f))
    }

    fn new(path: &str, page_size: usize, f: File) -> Self {
        Self {
            path: path.to_string(),
            page_size,
            f: Mutex::new(f),
            #[cfg(test)]
            syncs: AtomicU64::new(0),
        }
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn len(&self) -> Result<u64, io::Error> {
        let f = self.f.lock().unwrap();
        Ok(f.metadata()?.len())
    }

    /// Number of pages, counting a partially written last page.
    pub(crate) fn pages_count(&self) -> Result<u64, io::Error> {
        Ok(div_ceil(self.len()?, self.page_size as u64))
    }

    /// Read one page. Bytes beyond the end of the file read as zero.
    pub(crate) fn read_page(&self, page_index: u64) -> Result<Vec<u8>, io::Error> {
        let mut buf = vec![0u8; self.page_size];

        let mut f = self.f.lock().unwrap();
        f.seek(SeekFrom::Start(page_index * self.page_size as u64))?;

        let mut n = 0;
        while n < buf.len() {
            let got = f.read(&mut buf[n..]).context(|| {
                format!("read page {} of '{}'", page_index, self.path)
            })?;
            if got == 0 {
                break;
            }
            n += got;
        }

        Ok(buf)
    }

    pub(crate) fn write_page(
        &self,
        page_index: u64,
        bytes: &[u8],
    ) -> Result<(), io::Error> {
        debug_assert_eq!(bytes.len(), self.page_size);

        let mut f = self.f.lock().unwrap();
        f.seek(SeekFrom::Start(page_index * self.page_size as u64))?;
        f.write_all(bytes).context(|| {
            format!("write page {} of '{}'", page_index, self.path)
        })
    }

    /// Cut the file to its first `pages` pages.
    pub(crate) fn truncate_pages(&self, pages: u64) -> Result<(), io::Error> {
        let f = self.f.lock().unwrap();
        f.set_len(pages * self.page_size as u64)
            .context(|| format!("truncate '{}' to {} pages", self.path, pages))
    }

    pub(crate) fn sync(&self) -> Result<(), io::Error> {
        let f = self.f.lock().unwrap();
        f.sync_data().context(|| format!("sync '{}'", self.path))?;

        #[cfg(test)]
        self.syncs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Relaxed)
    }

    /// The format of the segment as told by the magic number of its first
    /// page. Empty or unrecognizable files are taken as the current format;
    /// their broken pages are dealt with by recovery.
    pub(crate) fn detect_format(&self) -> Result<PageFormat, io::Error> {
        if self.len()? < (PageFormat::MAGIC_OFFSET + 8) as u64 {
            return Ok(PageFormat::CURRENT);
        }

        let first = self.read_page(0)?;
        let magic = BigEndian::read_u64(&first[PageFormat::MAGIC_OFFSET..]);
        Ok(PageFormat::from_magic(magic).unwrap_or(PageFormat::CURRENT))
    }
}
