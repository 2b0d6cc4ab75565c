//! One append-only segment file of the log.

pub(crate) mod pending_record;
pub(crate) mod recovery;
pub(crate) mod segment_file;
pub(crate) mod shared;
pub(crate) mod write_request;
pub(crate) mod write_worker;

use std::fs;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use codeq::error_context_ext::ErrorContextExt;
use log::debug;
use log::info;

use crate::errors::WALClosed;
use crate::page::PageFormat;
use crate::page::PageLayout;
use crate::segment::pending_record::PendingRecord;
use crate::segment::recovery::RecoveredTail;
use crate::segment::segment_file::SegmentFile;
use crate::segment::shared::SegmentShared;
use crate::segment::write_worker::SegmentFlusher;
use crate::segment::write_worker::WriteWorker;
use crate::segment::write_worker::WriteWorkerHandle;
use crate::wal::context::WALContext;
use crate::LogSequenceNumber;
use crate::SegmentStat;

/// A segment of the log: the file `<storage_name>.<order>.wal`.
///
/// Only the tail segment has a background writer and accepts records. All
/// methods are called with the coordinator lock held.
pub(crate) struct LogSegment {
    shared: Arc<SegmentShared>,

    /// Logical length of the segment, including records not yet stored.
    filled_up_to: u64,

    /// Position of the last record.
    last: Option<u64>,

    worker: Option<WriteWorkerHandle>,

    /// The last record read, for sequential scans that read a record and
    /// then ask for its successor.
    last_read: Option<(LogSequenceNumber, Arc<Vec<u8>>)>,

    closed: bool,
}

impl LogSegment {
    /// Create a new empty segment file in the current page format.
    pub(crate) fn create(
        context: Arc<WALContext>,
        order: u64,
    ) -> Result<Self, io::Error> {
        let config = context.config.clone();
        let path = config.segment_path(order);

        let file = SegmentFile::create(&path, config.page_size())?;
        let layout = PageLayout::new(config.page_size(), PageFormat::CURRENT);

        info!("WAL segment created: {}", path);

        Ok(Self::new(context, order, layout, file, RecoveredTail::default()))
    }

    /// Open an existing segment file and recover its intact part.
    pub(crate) fn open(
        context: Arc<WALContext>,
        order: u64,
    ) -> Result<Self, io::Error> {
        let config = context.config.clone();
        let path = config.segment_path(order);

        let file = SegmentFile::open(&path, config.page_size(), true)?;
        let format = file.detect_format()?;
        let layout = PageLayout::new(config.page_size(), format);

        let tail = recovery::recover(&file, &layout, order, true)
            .context(|| format!("recover WAL segment '{}'", path))?;

        info!(
            "WAL segment opened: {}, format: {}, filled_up_to: {}, last: {:?}",
            path, format, tail.filled_up_to, tail.last
        );

        Ok(Self::new(context, order, layout, file, tail))
    }

    fn new(
        context: Arc<WALContext>,
        order: u64,
        layout: PageLayout,
        file: SegmentFile,
        tail: RecoveredTail,
    ) -> Self {
        let shared =
            SegmentShared::new(order, layout, file, context, tail.filled_up_to);

        Self {
            shared: Arc::new(shared),
            filled_up_to: tail.filled_up_to,
            last: tail.last,
            worker: None,
            last_read: None,
            closed: false,
        }
    }

    pub(crate) fn order(&self) -> u64 {
        self.shared.order
    }

    pub(crate) fn format(&self) -> PageFormat {
        self.shared.layout.format()
    }

    pub(crate) fn path(&self) -> &str {
        self.shared.file.path()
    }

    pub(crate) fn filled_up_to(&self) -> u64 {
        self.filled_up_to
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.last.is_none()
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.worker.is_some()
    }

    /// LSN of the first record.
    pub(crate) fn begin(&self) -> Option<LogSequenceNumber> {
        self.last?;
        let position = self.shared.layout.record_start(0);
        Some(LogSequenceNumber::new(self.order(), position))
    }

    /// LSN of the last record.
    pub(crate) fn end(&self) -> Option<LogSequenceNumber> {
        self.last.map(|p| LogSequenceNumber::new(self.order(), p))
    }

    /// Start the background writer; the segment becomes the tail.
    pub(crate) fn start_background_write(&mut self) -> Result<(), io::Error> {
        if self.worker.is_some() {
            return Ok(());
        }

        if self.closed {
            return Err(WALClosed::new(format!(
                "starting writer of segment {}",
                self.order()
            ))
            .into());
        }

        if self.format() != PageFormat::CURRENT {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "WAL segment {} is in format {} and can only be read",
                    self.order(),
                    self.format()
                ),
            ));
        }

        let worker = WriteWorker::spawn(self.shared.clone(), self.end())?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Stop the background writer; the segment becomes read only.
    ///
    /// Without `flush`, records not yet stored are discarded.
    pub(crate) fn stop_background_write(
        &mut self,
        flush: bool,
    ) -> Result<(), io::Error> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        let timeout = self.shared.context.config.shutdown_timeout();
        worker.shutdown(flush, timeout)?;

        if !flush {
            let dropped = self.shared.take_pending();
            if !dropped.is_empty() {
                info!(
                    "WAL segment {}: {} records not stored are discarded",
                    self.order(),
                    dropped.len()
                );
            }
        }
        Ok(())
    }

    /// Append a record and return its LSN. The record is stored by the
    /// background writer later.
    pub(crate) fn log_record(
        &mut self,
        record: Vec<u8>,
    ) -> Result<LogSequenceNumber, io::Error> {
        let Some(worker) = &self.worker else {
            return Err(WALClosed::new(format!(
                "appending to read only segment {}",
                self.shared.order
            ))
            .into());
        };

        self.shared.check_failure()?;

        let layout = self.shared.layout;
        let placement = layout.place(self.filled_up_to, record.len());

        self.shared.push_pending(PendingRecord {
            bytes: record,
            from: placement.from,
            to: placement.to,
        });

        self.filled_up_to = placement.to;
        self.last = Some(placement.from);

        let config = &self.shared.context.config;
        let page_size = config.page_size() as u64;
        let cached_pages =
            (self.filled_up_to - self.shared.written_up_to()) / page_size;

        if cached_pages > config.max_pages_cache_size() as u64 {
            debug!(
                "WAL segment {}: {} pages cached, store them now",
                self.shared.order, cached_pages
            );
            self.shared
                .context
                .cache_overflow_count
                .fetch_add(1, Ordering::Relaxed);
            worker.write()?;
        }

        Ok(LogSequenceNumber::new(self.shared.order, placement.from))
    }

    /// Read the record at `lsn`, `None` if there is no record there.
    pub(crate) fn read_record(
        &mut self,
        lsn: LogSequenceNumber,
    ) -> Result<Option<Arc<Vec<u8>>>, io::Error> {
        debug_assert_eq!(lsn.segment(), self.order());

        if let Some((cached_lsn, record)) = &self.last_read {
            if *cached_lsn == lsn {
                return Ok(Some(record.clone()));
            }
        }

        if self.closed {
            return Err(WALClosed::new(format!("reading {}", lsn)).into());
        }

        let layout = self.shared.layout;
        let in_page = lsn.position() % layout.page_size() as u64;
        if lsn.position() >= self.filled_up_to
            || in_page < layout.records_offset() as u64
        {
            return Ok(None);
        }

        self.ensure_stored()?;

        let record = recovery::read_record(
            &self.shared.file,
            &layout,
            self.shared.order,
            lsn.position(),
            self.filled_up_to,
        )?;

        let record = Arc::new(record);
        self.last_read = Some((lsn, record.clone()));
        Ok(Some(record))
    }

    /// LSN of the record following the one at `lsn`, `None` if it is the
    /// last one in this segment.
    pub(crate) fn next_lsn(
        &mut self,
        lsn: LogSequenceNumber,
    ) -> Result<Option<LogSequenceNumber>, io::Error> {
        let Some(record) = self.read_record(lsn)? else {
            return Ok(None);
        };

        let layout = self.shared.layout;
        let placement = layout.place(lsn.position(), record.len());
        let next = layout.record_start(placement.to);

        if next >= self.filled_up_to {
            Ok(None)
        } else {
            Ok(Some(LogSequenceNumber::new(self.order(), next)))
        }
    }

    /// Make the file contain every record appended so far.
    fn ensure_stored(&self) -> Result<(), io::Error> {
        if self.shared.written_up_to() >= self.filled_up_to {
            return Ok(());
        }

        match &self.worker {
            Some(worker) => worker.write(),
            None => Err(WALClosed::new(format!(
                "reading unstored records of segment {}",
                self.order()
            ))
            .into()),
        }
    }

    pub(crate) fn flusher(&self) -> Option<SegmentFlusher> {
        self.worker.as_ref().map(|w| w.flusher())
    }

    /// Stop the background writer and stop serving reads. Closing again is
    /// a no-op.
    pub(crate) fn close(&mut self, flush: bool) -> Result<(), io::Error> {
        if self.closed {
            return Ok(());
        }

        self.last_read = None;
        let res = self.stop_background_write(flush);
        self.closed = true;
        res
    }

    /// Close the segment and remove its file.
    pub(crate) fn delete(mut self, flush: bool) -> Result<(), io::Error> {
        self.close(flush)?;

        let path = self.path().to_string();
        drop(self);

        fs::remove_file(&path)
            .context(|| format!("remove WAL segment '{}'", path))?;
        info!("WAL segment removed: {}", path);
        Ok(())
    }

    pub(crate) fn stat(&self) -> SegmentStat {
        SegmentStat {
            order: self.order(),
            format: self.format(),
            filled_up_to: self.filled_up_to,
            begin: self.begin(),
            end: self.end(),
            writable: self.is_writable(),
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &SegmentShared {
        &self.shared
    }
}
