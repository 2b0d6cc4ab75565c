use std::fs;
use std::io;
use std::sync::Arc;

use tempfile::TempDir;

use crate::page::PageLayout;
use crate::page::WalPage;
use crate::wal::context::WALContext;
use crate::Config;
use crate::LogSequenceNumber as Lsn;
use crate::PageFormat;
use crate::WriteAheadLog;

/// Page size used by tests, small enough to make records span pages.
pub(crate) const PAGE_SIZE: usize = 128;

pub(crate) fn new_testing() -> Result<(TestContext, WriteAheadLog), io::Error> {
    let ctx = TestContext::new()?;
    let wal = ctx.new_wal()?;

    Ok((ctx, wal))
}

pub(crate) struct TestContext {
    pub(crate) config: Config,

    _temp_dir: TempDir,
}

impl TestContext {
    pub(crate) fn new() -> Result<TestContext, io::Error> {
        let temp_dir = tempfile::tempdir()?;

        let config = Config {
            dir: temp_dir.path().to_str().unwrap().to_string(),
            page_size: Some(PAGE_SIZE),
            max_segment_size: Some(64 * 1024),
            ..Default::default()
        };

        Ok(TestContext {
            config,
            _temp_dir: temp_dir,
        })
    }

    pub(crate) fn arc_config(&self) -> Arc<Config> {
        Arc::new(self.config.clone())
    }

    pub(crate) fn new_wal(&self) -> Result<WriteAheadLog, io::Error> {
        WriteAheadLog::open(self.arc_config())
    }

    pub(crate) fn wal_context(&self) -> Arc<WALContext> {
        Arc::new(WALContext::new(self.arc_config()))
    }
}

/// Write segment 0 at `path` holding the given encoded records, bypassing the
/// log, and return their LSNs.
pub(crate) fn write_segment_file(
    path: &str,
    format: PageFormat,
    records: &[Vec<u8>],
) -> Result<Vec<Lsn>, io::Error> {
    let layout = PageLayout::new(PAGE_SIZE, format);

    let mut pages: Vec<WalPage> = vec![];
    let mut lsns = vec![];
    let mut filled = 0;

    for bytes in records {
        let placement = layout.place(filled, bytes.len());
        lsns.push(Lsn::new(0, placement.from));

        for chunk in layout.chunks(placement.from, bytes.len()) {
            while pages.len() as u64 <= chunk.page_index {
                pages.push(WalPage::new(PAGE_SIZE, format));
            }
            let page = &mut pages[chunk.page_index as usize];
            let end =
                page.write_chunk(chunk.offset, &bytes[chunk.range], chunk.continues);
            if !chunk.continues {
                page.mark_record_end(placement.from, end);
            }
        }
        filled = placement.to;
    }

    let mut buf = vec![];
    for mut page in pages {
        page.seal();
        buf.extend_from_slice(page.as_bytes());
    }
    fs::write(path, buf)?;

    Ok(lsns)
}
