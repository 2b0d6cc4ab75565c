use std::io;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use log::debug;
use log::info;

use crate::errors::PageBroken;
use crate::errors::ShutdownTimeout;
use crate::errors::WALClosed;
use crate::page::WalPage;
use crate::segment::shared::SegmentShared;
use crate::segment::write_request::Done;
use crate::segment::write_request::WriteRequest;
use crate::LogSequenceNumber;

/// Background writer of the tail segment.
///
/// It stores pending records into pages every `write_interval`, and syncs the
/// file and publishes the flushed LSN every `commit_delay`. Blocking requests
/// do either immediately.
pub(crate) struct WriteWorker {
    shared: Arc<SegmentShared>,
    rx: Receiver<WriteRequest>,

    /// The last page written, kept to append to it without reading it back.
    open_page: Option<(u64, WalPage)>,

    /// The last record stored in the file.
    stored: Option<LogSequenceNumber>,

    /// The last record synced to disk.
    synced: Option<LogSequenceNumber>,
}

impl WriteWorker {
    /// `last` is the last record already durable in the segment file.
    pub(crate) fn spawn(
        shared: Arc<SegmentShared>,
        last: Option<LogSequenceNumber>,
    ) -> Result<WriteWorkerHandle, io::Error> {
        let (tx, rx) = std::sync::mpsc::sync_channel(1024);
        let order = shared.order;

        let worker = WriteWorker {
            shared,
            rx,
            open_page: None,
            stored: last,
            synced: last,
        };

        let join_handle = std::thread::Builder::new()
            .name(format!("paged_wal_write_worker-{}", order))
            .spawn(move || {
                worker.run();
            })?;

        info!("WriteWorker of WAL segment {} started", order);

        Ok(WriteWorkerHandle {
            order,
            tx,
            join_handle: Some(join_handle),
        })
    }

    fn run(mut self) {
        let order = self.shared.order;
        let res = self.run_inner();
        if let Err(e) = res {
            log::error!("WriteWorker of WAL segment {} failed: {}", order, e);
        }
    }

    fn run_inner(&mut self) -> Result<(), io::Error> {
        let config = self.shared.context.config.clone();
        let write_interval = config.write_interval();
        let commit_delay = config.commit_delay();
        let periodic_sync = !commit_delay.is_zero();

        let mut last_sync = Instant::now();

        loop {
            match self.rx.recv_timeout(write_interval) {
                Ok(WriteRequest::Write { done }) => {
                    let res = self.store_pending();
                    let _ = done.send(res);
                }
                Ok(WriteRequest::Flush { done }) => {
                    let res = self.store_pending().and_then(|_| self.sync(true));
                    let _ = done.send(res);
                    last_sync = Instant::now();
                }
                Ok(WriteRequest::Shutdown { flush, done }) => {
                    let res = if flush {
                        self.store_pending().and_then(|_| self.sync(true))
                    } else {
                        Ok(())
                    };
                    info!("WriteWorker of WAL segment {} quit", self.shared.order);
                    let _ = done.send(res);
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!(
                        "WriteWorker of WAL segment {} input channel closed, quit",
                        self.shared.order
                    );
                    return Ok(());
                }
            }

            // Errors are recorded in the segment and returned to the next
            // caller; the worker keeps serving requests.
            let _ = self.store_pending();

            if periodic_sync && last_sync.elapsed() >= commit_delay {
                let _ = self.sync(false);
                last_sync = Instant::now();
            }
        }
    }

    fn store_pending(&mut self) -> Result<(), io::Error> {
        self.shared.check_failure()?;

        let res = self.store_pending_inner();
        if let Err(e) = &res {
            self.shared.set_failure(e);
        }
        res
    }

    /// Write pending records into their pages and the pages into the file.
    fn store_pending_inner(&mut self) -> Result<(), io::Error> {
        let records = self.shared.take_pending();
        let Some(first) = records.first() else {
            return Ok(());
        };

        let layout = self.shared.layout;
        let order = self.shared.order;

        let (mut page_index, mut page) =
            self.take_page(layout.page_index(first.from))?;

        for rec in records.iter() {
            for chunk in layout.chunks(rec.from, rec.bytes.len()) {
                if chunk.page_index != page_index {
                    self.write_page(page_index, &mut page)?;
                    (page_index, page) = self.take_page(chunk.page_index)?;
                }

                let end = page.write_chunk(
                    chunk.offset,
                    &rec.bytes[chunk.range.clone()],
                    chunk.continues,
                );
                if !chunk.continues {
                    page.mark_record_end(rec.from, end);
                }
            }
        }

        self.write_page(page_index, &mut page)?;
        self.open_page = Some((page_index, page));

        let last = records.last().map(|r| (r.from, r.to));
        if let Some((from, to)) = last {
            self.shared.set_written_up_to(to);
            self.stored = Some(LogSequenceNumber::new(order, from));
        }

        debug!(
            "WAL segment {}: stored {} records, up to {:?}",
            order,
            records.len(),
            self.stored
        );

        self.shared.context.check_free_space();
        Ok(())
    }

    /// Returns the page to append to: the open page, a page already in the
    /// file, or a new one.
    fn take_page(&mut self, page_index: u64) -> Result<(u64, WalPage), io::Error> {
        if let Some((i, page)) = self.open_page.take() {
            if i == page_index {
                return Ok((i, page));
            }
        }

        let shared = &self.shared;
        let layout = shared.layout;

        if page_index < shared.file.pages_count()? {
            let bytes = shared.file.read_page(page_index)?;
            let page = WalPage::decode_as(bytes, layout.format())
                .map_err(|d| PageBroken::new(shared.order, page_index, d))?;
            Ok((page_index, page))
        } else {
            Ok((page_index, WalPage::new(layout.page_size(), layout.format())))
        }
    }

    fn write_page(
        &self,
        page_index: u64,
        page: &mut WalPage,
    ) -> Result<(), io::Error> {
        page.seal();
        self.shared.file.write_page(page_index, page.as_bytes())
    }

    /// Sync the stored records and publish the flushed LSN.
    ///
    /// With `sync_on_page_flush` off the periodic sync does nothing; only an
    /// explicit flush makes records durable then. The flushed LSN only moves
    /// after a real fsync.
    fn sync(&mut self, force: bool) -> Result<(), io::Error> {
        self.shared.check_failure()?;

        let Some(stored) = self.stored else {
            return Ok(());
        };
        if self.synced >= Some(stored) {
            return Ok(());
        }

        if !force && !self.shared.context.config.sync_on_page_flush() {
            return Ok(());
        }

        if let Err(e) = self.shared.file.sync() {
            self.shared.set_failure(&e);
            return Err(e);
        }

        self.synced = Some(stored);
        self.shared.context.flushed.advance(stored);
        Ok(())
    }
}

/// Owned by the segment; sends requests to its [`WriteWorker`].
pub(crate) struct WriteWorkerHandle {
    order: u64,
    tx: SyncSender<WriteRequest>,
    join_handle: Option<JoinHandle<()>>,
}

impl WriteWorkerHandle {
    /// Store all pending records before returning.
    pub(crate) fn write(&self) -> Result<(), io::Error> {
        let sent = blocking_request(&self.tx, |done| WriteRequest::Write { done })?;
        sent.ok_or_else(|| {
            WALClosed::new(format!("writing segment {}", self.order)).into()
        })
    }

    pub(crate) fn flusher(&self) -> SegmentFlusher {
        SegmentFlusher {
            tx: self.tx.clone(),
        }
    }

    /// Stop the worker, waiting at most `timeout` for it to finish.
    pub(crate) fn shutdown(
        mut self,
        flush: bool,
        timeout: Duration,
    ) -> Result<(), io::Error> {
        let (done, rx) = std::sync::mpsc::sync_channel(1);

        let sent = self.tx.send(WriteRequest::Shutdown { flush, done });
        if sent.is_err() {
            // Already quit
            return self.join();
        }

        let res = match rx.recv_timeout(timeout) {
            Ok(res) => res,
            Err(RecvTimeoutError::Timeout) => {
                return Err(ShutdownTimeout::new(self.order, timeout).into());
            }
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "WriteWorker of WAL segment {} quit without response",
                    self.order
                ),
            )),
        };

        self.join()?;
        res
    }

    fn join(&mut self) -> Result<(), io::Error> {
        if let Some(h) = self.join_handle.take() {
            h.join().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("WriteWorker of WAL segment {} panicked", self.order),
                )
            })?;
        }
        Ok(())
    }
}

/// Requests a flush from a worker without holding the coordinator lock.
pub(crate) struct SegmentFlusher {
    tx: SyncSender<WriteRequest>,
}

impl SegmentFlusher {
    /// Store and sync everything pending.
    ///
    /// Returns `Ok(false)` if the worker already quit; a worker flushes
    /// before it quits unless the log is closed without flush.
    pub(crate) fn flush(&self) -> Result<bool, io::Error> {
        let res = blocking_request(&self.tx, |done| WriteRequest::Flush { done })?;
        Ok(res.is_some())
    }
}

/// Send a request and wait for the response. Returns `Ok(None)` if the worker
/// is gone.
fn blocking_request(
    tx: &SyncSender<WriteRequest>,
    make: impl FnOnce(Done) -> WriteRequest,
) -> Result<Option<()>, io::Error> {
    let (done, rx) = std::sync::mpsc::sync_channel(1);

    if tx.send(make(done)).is_err() {
        return Ok(None);
    }

    match rx.recv() {
        Ok(res) => res.map(Some),
        Err(_) => Ok(None),
    }
}
