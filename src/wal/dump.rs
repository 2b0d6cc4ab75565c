use std::io;
use std::sync::Arc;

use log::warn;

use crate::errors::RecordDecodeError;
use crate::page::PageLayout;
use crate::segment::recovery;
use crate::segment::segment_file::SegmentFile;
use crate::wal::dump_api::DumpApi;
use crate::Config;
use crate::LogSequenceNumber;
use crate::WALRecord;
use crate::WriteAheadLog;

/// Dump the records of a WAL directory without opening the log.
///
/// It takes no directory lock and never repairs a segment, so it can inspect
/// the files of a running or crashed process. A record that can not be read
/// ends the dump of its segment; the next segment is dumped anyway.
pub struct Dump {
    config: Arc<Config>,
}

impl Dump {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Dump one segment; `Err` is returned only if `write_record` fails.
    fn write_segment<D>(
        &self,
        order: u64,
        write_record: &mut D,
    ) -> Result<(), io::Error>
    where
        D: FnMut(
            u64,
            u64,
            Result<(LogSequenceNumber, WALRecord), io::Error>,
        ) -> Result<(), io::Error>,
    {
        let config = self.config.as_ref();
        let path = config.segment_path(order);

        let opened = SegmentFile::open(&path, config.page_size(), false)
            .and_then(|file| {
                let format = file.detect_format()?;
                let layout = PageLayout::new(config.page_size(), format);
                let tail = recovery::recover(&file, &layout, order, false)?;
                Ok((file, layout, tail))
            });

        let (file, layout, tail) = match opened {
            Ok(x) => x,
            Err(e) => return write_record(order, 0, Err(e)),
        };

        let Some(last) = tail.last else {
            return Ok(());
        };

        let mut position = layout.record_start(0);
        let mut index = 0;

        while position <= last {
            let lsn = LogSequenceNumber::new(order, position);

            let res = recovery::read_record(
                &file,
                &layout,
                order,
                position,
                tail.filled_up_to,
            )
            .and_then(|bytes| {
                let rec = WALRecord::from_bytes(&bytes)
                    .map_err(|e| RecordDecodeError::new(lsn, e))?;
                Ok((bytes.len(), rec))
            });

            let (size, rec) = match res {
                Ok(x) => x,
                Err(e) => {
                    warn!("Stop dumping WAL segment {} at {}: {}", order, lsn, e);
                    return write_record(order, index, Err(e));
                }
            };

            write_record(order, index, Ok((lsn, rec)))?;
            index += 1;

            let placement = layout.place(position, size);
            position = layout.record_start(placement.to);
        }

        Ok(())
    }
}

impl DumpApi for Dump {
    fn write_with<D>(&self, mut write_record: D) -> Result<(), io::Error>
    where D: FnMut(
            u64,
            u64,
            Result<(LogSequenceNumber, WALRecord), io::Error>,
        ) -> Result<(), io::Error> {
        let orders = WriteAheadLog::load_segment_orders(&self.config)?;
        for order in orders {
            self.write_segment(order, &mut write_record)?;
        }
        Ok(())
    }
}

impl DumpApi for WriteAheadLog {
    /// Dump the records of the open log, including those not yet stored.
    fn write_with<D>(&self, mut write_record: D) -> Result<(), io::Error>
    where D: FnMut(
            u64,
            u64,
            Result<(LogSequenceNumber, WALRecord), io::Error>,
        ) -> Result<(), io::Error> {
        use crate::api::log_reader::LogReader;

        let mut prev_segment = None;
        let mut index = 0;

        for res in self.iter()? {
            let segment = match &res {
                Ok((lsn, _)) => lsn.segment(),
                Err(_) => prev_segment.unwrap_or_default(),
            };

            if prev_segment != Some(segment) {
                index = 0;
                prev_segment = Some(segment);
            }

            let failed = res.is_err();
            write_record(segment, index, res)?;
            index += 1;

            if failed {
                break;
            }
        }
        Ok(())
    }
}
