use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::mem;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;

use codeq::error_context_ext::ErrorContextExt;
use log::error;
use log::info;
use log::warn;

use crate::api::log_reader::LogReader;
use crate::api::log_writer::LogWriter;
use crate::errors::ActiveOperationsPresent;
use crate::errors::RecordDecodeError;
use crate::errors::WALClosed;
use crate::file_lock::FileLock;
use crate::num::format_pad_u64;
use crate::page::PageFormat;
use crate::segment::LogSegment;
use crate::wal::active_operations::ActiveOperations;
use crate::wal::context::WALContext;
use crate::wal::listener::CheckpointRequestListener;
use crate::wal::listener::ListenerId;
use crate::wal::listener::LowDiskSpaceListener;
use crate::wal::master_record::MasterRecord;
use crate::Config;
use crate::LogSequenceNumber;
use crate::Stat;
use crate::WALRecord;

/// A paginated write-ahead log stored as a sequence of segment files.
///
/// Records are appended to the last segment, the tail. Once the tail outgrows
/// `max_segment_size` and no atomic operation is open, a new tail is started.
/// Older segments are removed with [`LogWriter::cut_till`] once a checkpoint
/// makes them unnecessary.
///
/// All methods take `&self`; a single lock serializes LSN assignment, master
/// record updates and rotation. Pages are written to disk by a background
/// worker of the tail segment.
pub struct WriteAheadLog {
    config: Arc<Config>,

    context: Arc<WALContext>,

    inner: Mutex<WALInner>,

    /// Notified when a pending rotation completes or the log is closed.
    rotated: Condvar,

    /// Acquire the dir exclusive lock when writing to the log.
    _dir_lock: FileLock,
}

struct WALInner {
    context: Arc<WALContext>,

    /// Live segments ordered by `order`. The last one is the tail.
    segments: Vec<LogSegment>,

    master_record: MasterRecord,

    active_operations: ActiveOperations,

    /// Reference counted LSNs `cut_till` never cuts past.
    cut_till_limits: BTreeMap<LogSequenceNumber, usize>,

    /// Total size of the segments before the tail.
    non_active_size: u64,

    closed: bool,
}

impl WriteAheadLog {
    /// Opens the log in `config.dir`, creating it if there is none.
    ///
    /// This operation:
    /// 1. Acquires an exclusive lock on the directory
    /// 2. Opens every segment, cutting off broken trailing pages
    /// 3. Starts a new tail segment if there is none or the last one is in an
    ///    old page format
    /// 4. Loads the master record and drops slots pointing outside the log
    pub fn open(config: Arc<Config>) -> Result<Self, io::Error> {
        config.validate()?;

        let dir_lock = FileLock::new(config.clone())
            .context(|| format!("open WAL in '{}'", config.dir))?;

        let context = Arc::new(WALContext::new(config.clone()));

        let orders = Self::load_segment_orders(&config)?;

        let mut segments = Vec::with_capacity(orders.len() + 1);
        for order in orders {
            segments.push(LogSegment::open(context.clone(), order)?);
        }

        if let Some(last) = segments.iter().rev().find_map(|s| s.end()) {
            context.flushed.advance(last);
        }

        let tail_reusable = segments
            .last()
            .map(|s| s.format() == PageFormat::CURRENT)
            .unwrap_or(false);

        if !tail_reusable {
            let order = segments.last().map(|s| s.order() + 1).unwrap_or(0);
            if order > 0 {
                info!(
                    "WAL tail segment {} is in an old page format, \
                    start segment {} in format {}",
                    order - 1,
                    order,
                    PageFormat::CURRENT
                );
            }
            segments.push(LogSegment::create(context.clone(), order)?);
        }

        let non_active_size = segments
            .iter()
            .rev()
            .skip(1)
            .map(|s| s.filled_up_to())
            .sum();

        // Checked above: there is at least one segment
        if let Some(tail) = segments.last_mut() {
            tail.start_background_write()?;
        }

        let mut master_record = MasterRecord::open(config.master_record_path())?;
        master_record.fix(|lsn| contains_lsn(&segments, lsn))?;

        context.check_free_space();

        let inner = WALInner {
            context: context.clone(),
            segments,
            master_record,
            active_operations: ActiveOperations::default(),
            cut_till_limits: BTreeMap::new(),
            non_active_size,
            closed: false,
        };

        info!(
            "WAL opened in '{}': segments: {:?}, last checkpoint: {:?}",
            config.dir,
            inner.segments.iter().map(|s| s.order()).collect::<Vec<_>>(),
            inner.master_record.get()
        );

        Ok(Self {
            config,
            context,
            inner: Mutex::new(inner),
            rotated: Condvar::new(),
            _dir_lock: dir_lock,
        })
    }

    /// Returns the orders of the segment files of this storage, sorted.
    pub fn load_segment_orders(config: &Config) -> Result<Vec<u64>, io::Error> {
        let entries = fs::read_dir(&config.dir)
            .context(|| format!("list WAL dir '{}'", config.dir))?;

        let mut orders = vec![];
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let fn_str = file_name.to_string_lossy();

            if !fn_str.ends_with(".wal") {
                continue;
            }

            match config.parse_segment_file_name(&fn_str) {
                Ok(order) => orders.push(order),
                Err(err) => {
                    warn!("Ignore invalid WAL file name: '{}': {}", fn_str, err);
                }
            }
        }

        orders.sort();

        for w in orders.windows(2) {
            if w[0] == w[1] {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Duplicated WAL segment order {} in '{}'; \
                        Can not open, fix this error and re-open",
                        format_pad_u64(w[0]),
                        config.dir
                    ),
                ));
            }
        }

        Ok(orders)
    }

    /// Get a reference to the WAL configuration.
    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    /// The first LSN of the segment `order`, `None` if the segment does not
    /// exist or is empty.
    pub fn begin_of_segment(
        &self,
        order: u64,
    ) -> Result<Option<LogSequenceNumber>, io::Error> {
        let inner = self.lock_open("reading begin of segment")?;
        Ok(inner.segment(order).and_then(|s| s.begin()))
    }

    /// Start a new tail segment now.
    ///
    /// Returns `false` if the tail is empty and nothing is done. Refused while
    /// atomic operations are open.
    pub fn append_new_segment(&self) -> Result<bool, io::Error> {
        let mut inner = self.lock_open("appending new segment")?;

        let open = inner.active_operations.len();
        if open > 0 {
            return Err(
                ActiveOperationsPresent::new(open, "appending new segment").into()
            );
        }

        if inner.tail().is_empty() {
            return Ok(false);
        }

        let order = inner.tail().order() + 1;
        inner.rotate_to(order)?;
        self.rotated.notify_all();
        Ok(true)
    }

    /// Make every LSN issued from now on greater than `lsn`.
    ///
    /// Used after restoring data whose LSNs came from another log: a new tail
    /// segment with order `lsn.segment + 1` is started unless the tail is
    /// already past `lsn`.
    pub fn move_lsn_after(&self, lsn: LogSequenceNumber) -> Result<(), io::Error> {
        let mut inner = self.lock_open("moving LSN")?;

        if inner.tail().order() > lsn.segment() {
            return Ok(());
        }

        let open = inner.active_operations.len();
        if open > 0 {
            return Err(ActiveOperationsPresent::new(open, "moving LSN").into());
        }

        inner.rotate_to(lsn.segment() + 1)?;
        self.rotated.notify_all();

        info!("WAL LSN moved after {}", lsn);
        Ok(())
    }

    /// Remove all segments with order smaller than `order`, except the tail
    /// and those protected by a cut-till limit.
    ///
    /// Returns whether any segment was removed.
    pub fn cut_all_segments_smaller_than(
        &self,
        order: u64,
    ) -> Result<bool, io::Error> {
        self.flush()?;

        let mut inner = self.lock_open("cutting segments")?;
        let order = match inner.cut_till_limits.keys().next() {
            Some(limit) => order.min(limit.segment()),
            None => order,
        };
        inner.cut_segments_before(order)
    }

    /// Protect the segment holding `lsn` and all later ones from being cut.
    ///
    /// Limits are reference counted: adding the same LSN twice requires
    /// removing it twice.
    pub fn add_cut_till_limit(&self, lsn: LogSequenceNumber) {
        let mut inner = self.inner.lock().unwrap();
        *inner.cut_till_limits.entry(lsn).or_default() += 1;
    }

    pub fn remove_cut_till_limit(
        &self,
        lsn: LogSequenceNumber,
    ) -> Result<(), io::Error> {
        let mut inner = self.inner.lock().unwrap();

        let Some(count) = inner.cut_till_limits.get_mut(&lsn) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("No cut-till limit at {}", lsn),
            ));
        };

        *count -= 1;
        if *count == 0 {
            inner.cut_till_limits.remove(&lsn);
        }
        Ok(())
    }

    /// The last LSN known to be durable.
    pub fn flushed_lsn(&self) -> Option<LogSequenceNumber> {
        self.context.flushed.get()
    }

    /// Run `event` once the log is durable up to `lsn`, in the thread that
    /// makes it so; or right now if it already is.
    ///
    /// `event` must not call back into the log.
    pub fn add_event_at(
        &self,
        lsn: LogSequenceNumber,
        event: impl FnOnce() + Send + 'static,
    ) {
        self.context.flushed.add_event(lsn, Box::new(event));
    }

    pub fn add_low_disk_space_listener(
        &self,
        listener: impl LowDiskSpaceListener + 'static,
    ) -> ListenerId {
        self.context.low_disk_space_listeners.subscribe(Arc::new(listener))
    }

    /// Returns whether the listener was subscribed.
    pub fn remove_low_disk_space_listener(&self, id: ListenerId) -> bool {
        self.context.low_disk_space_listeners.unsubscribe(id)
    }

    pub fn add_checkpoint_request_listener(
        &self,
        listener: impl CheckpointRequestListener + 'static,
    ) -> ListenerId {
        self.context
            .checkpoint_request_listeners
            .subscribe(Arc::new(listener))
    }

    /// Returns whether the listener was subscribed.
    pub fn remove_checkpoint_request_listener(&self, id: ListenerId) -> bool {
        self.context.checkpoint_request_listeners.unsubscribe(id)
    }

    /// The LSN of the last checkpoint start, as held by the master record.
    pub fn last_checkpoint(&self) -> Option<LogSequenceNumber> {
        let inner = self.inner.lock().unwrap();
        inner.master_record.get()
    }

    /// Total size in bytes of all segments.
    pub fn size(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.log_size()
    }

    /// Order of the tail segment, the one records are appended to.
    pub fn active_segment(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.tail().order()
    }

    /// Orders of all segments before the tail.
    pub fn non_active_segments(&self) -> Vec<u64> {
        let inner = self.inner.lock().unwrap();
        let n = inner.segments.len().saturating_sub(1);
        inner.segments[..n].iter().map(|s| s.order()).collect()
    }

    /// Paths of all segment files, in order.
    pub fn segment_paths(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.segments.iter().map(|s| s.path().to_string()).collect()
    }

    pub fn master_record_path(&self) -> String {
        self.config.master_record_path()
    }

    /// Number of appends that stored pages synchronously because the tail
    /// cached too many of them.
    pub fn cache_overflow_count(&self) -> u64 {
        self.context
            .cache_overflow_count
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Get a reference to the WAL statistics.
    pub fn stat(&self) -> Stat {
        let inner = self.inner.lock().unwrap();

        Stat {
            segments: inner.segments.iter().map(|s| s.stat()).collect(),
            log_size: inner.log_size(),
            flushed_lsn: self.flushed_lsn(),
            last_checkpoint: inner.master_record.get(),
            active_operations: inner.active_operations.len() as u64,
            cache_overflow_count: self.cache_overflow_count(),
        }
    }

    /// Stop the background writer and reject any further operation.
    ///
    /// Without `flush`, records not yet stored are discarded. Closing again
    /// is a no-op.
    pub fn close(&self, flush: bool) -> Result<(), io::Error> {
        let mut inner = self.inner.lock().unwrap();
        let res = inner.close(flush);
        self.rotated.notify_all();
        res
    }

    /// Close the log and remove all of its segment files and the master
    /// record.
    pub fn delete(self) -> Result<(), io::Error> {
        let mut inner = self.inner.lock().unwrap();

        inner.close(false)?;

        for segment in mem::take(&mut inner.segments) {
            segment.delete(false)?;
        }

        let path = inner.master_record.path().to_string();
        fs::remove_file(&path)
            .context(|| format!("remove master record '{}'", path))?;

        info!("WAL in '{}' deleted", self.config.dir);
        Ok(())
    }

    fn lock_open(&self, when: &str) -> Result<MutexGuard<'_, WALInner>, io::Error> {
        let inner = self.inner.lock().unwrap();
        inner.check_open(when)?;
        Ok(inner)
    }

    #[cfg(test)]
    pub(crate) fn with_tail<T>(&self, f: impl FnOnce(&LogSegment) -> T) -> T {
        let inner = self.inner.lock().unwrap();
        f(inner.tail())
    }

    /// Mark the log closed after an I/O failure.
    fn fail(&self, e: &io::Error) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail(e);
        self.rotated.notify_all();
    }
}

impl LogWriter for WriteAheadLog {
    fn log(&self, record: &WALRecord) -> Result<LogSequenceNumber, io::Error> {
        let bytes = record.to_bytes()?;

        let (lsn, request_checkpoint) = {
            let mut inner = self.lock_open("logging")?;

            while inner.active_operations.must_wait(record) {
                inner = self.rotated.wait(inner).unwrap();
                inner.check_open("waiting for segment rotation")?;
            }

            let was_pending = inner.active_operations.rotation_pending();

            let lsn = match inner.append(record, bytes) {
                Ok(lsn) => lsn,
                Err(e) => {
                    // Wake up waiters to let them see the log is closed
                    self.rotated.notify_all();
                    return Err(e);
                }
            };

            if was_pending && !inner.active_operations.rotation_pending() {
                self.rotated.notify_all();
            }

            let request_checkpoint = inner.segments.len() > 1
                && inner.log_size() > self.config.max_log_size();

            (lsn, request_checkpoint)
        };

        if request_checkpoint {
            self.context.notify_checkpoint_request();
        }

        Ok(lsn)
    }

    fn flush(&self) -> Result<(), io::Error> {
        loop {
            let (order, flusher) = {
                let inner = self.lock_open("flushing")?;
                (inner.tail().order(), inner.tail().flusher())
            };

            let Some(flusher) = flusher else {
                return Err(WALClosed::new("flushing").into());
            };

            // Without the lock: appends go on while the worker syncs.
            let res = match flusher.flush() {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    // The tail was rotated, which flushed it: flush the new
                    // tail. Otherwise its writer is gone.
                    let tail = self.lock_open("flushing")?.tail().order();
                    if tail != order {
                        continue;
                    }
                    Err(WALClosed::new(format!(
                        "flushing, writer of segment {} quit",
                        order
                    ))
                    .into())
                }
                Err(e) => Err(e),
            };

            if let Err(e) = &res {
                self.fail(e);
            }
            return res;
        }
    }

    fn cut_till(&self, lsn: LogSequenceNumber) -> Result<bool, io::Error> {
        self.flush()?;

        let mut inner = self.lock_open("cutting segments")?;

        let lsn = match inner.cut_till_limits.keys().next() {
            Some(limit) if *limit < lsn => {
                info!("WAL cut till {} is limited to {}", lsn, limit);
                *limit
            }
            _ => lsn,
        };

        inner.cut_segments_before(lsn.segment())
    }

    fn truncate(&self) -> Result<(), io::Error> {
        self.flush()?;

        let mut inner = self.lock_open("truncating")?;

        let order = inner.tail().order();
        inner.cut_segments_before(order)?;

        info!("WAL truncated, only the tail segment {} is kept", order);
        Ok(())
    }
}

impl LogReader for WriteAheadLog {
    fn begin(&self) -> Result<Option<LogSequenceNumber>, io::Error> {
        let inner = self.lock_open("reading begin")?;
        Ok(inner.segments.iter().find_map(|s| s.begin()))
    }

    fn end(&self) -> Result<Option<LogSequenceNumber>, io::Error> {
        let inner = self.lock_open("reading end")?;
        Ok(inner.segments.iter().rev().find_map(|s| s.end()))
    }

    fn read(
        &self,
        lsn: LogSequenceNumber,
    ) -> Result<Option<WALRecord>, io::Error> {
        let bytes = {
            let mut inner = self.lock_open("reading")?;
            let Some(segment) = inner.segment_mut(lsn.segment()) else {
                return Ok(None);
            };
            segment.read_record(lsn)?
        };

        let Some(bytes) = bytes else {
            return Ok(None);
        };

        let record = WALRecord::from_bytes(&bytes)
            .map_err(|e| RecordDecodeError::new(lsn, e))?;
        Ok(Some(record))
    }

    fn next(
        &self,
        lsn: LogSequenceNumber,
    ) -> Result<Option<LogSequenceNumber>, io::Error> {
        let mut inner = self.lock_open("reading next")?;

        let Some(i) = inner.segment_index(lsn.segment()) else {
            return Ok(None);
        };

        if let Some(next) = inner.segments[i].next_lsn(lsn)? {
            return Ok(Some(next));
        }

        Ok(inner.segments[i + 1..].iter().find_map(|s| s.begin()))
    }
}

impl Drop for WriteAheadLog {
    fn drop(&mut self) {
        if let Err(e) = self.close(true) {
            error!("Failed to close WAL in '{}': {}", self.config.dir, e);
        }
    }
}

impl WALInner {
    fn check_open(&self, when: &str) -> Result<(), io::Error> {
        if self.closed {
            return Err(WALClosed::new(when).into());
        }
        Ok(())
    }

    fn tail(&self) -> &LogSegment {
        // A live log always has its tail segment.
        &self.segments[self.segments.len() - 1]
    }

    fn tail_mut(&mut self) -> &mut LogSegment {
        let n = self.segments.len();
        &mut self.segments[n - 1]
    }

    fn segment_index(&self, order: u64) -> Option<usize> {
        self.segments.binary_search_by_key(&order, |s| s.order()).ok()
    }

    fn segment(&self, order: u64) -> Option<&LogSegment> {
        self.segment_index(order).map(|i| &self.segments[i])
    }

    fn segment_mut(&mut self, order: u64) -> Option<&mut LogSegment> {
        self.segment_index(order).map(|i| &mut self.segments[i])
    }

    fn log_size(&self) -> u64 {
        self.non_active_size + self.tail().filled_up_to()
    }

    /// Append an encoded record to the tail, update the master record and the
    /// open operations, and rotate the tail if it is full.
    fn append(
        &mut self,
        record: &WALRecord,
        bytes: Vec<u8>,
    ) -> Result<LogSequenceNumber, io::Error> {
        let res = self.append_inner(record, bytes);
        if let Err(e) = &res {
            self.fail(e);
        }
        res
    }

    fn append_inner(
        &mut self,
        record: &WALRecord,
        bytes: Vec<u8>,
    ) -> Result<LogSequenceNumber, io::Error> {
        // A new operation must not start in the segment about to be retired.
        if self.active_operations.rotation_pending()
            && self.active_operations.is_empty()
            && matches!(record, WALRecord::AtomicUnitStart(_))
        {
            let order = self.tail().order() + 1;
            self.rotate_to(order)?;
        }

        let lsn = self.tail_mut().log_record(bytes)?;

        self.active_operations.apply(record);

        if record.is_update_master_record() {
            self.master_record.write(lsn)?;
        }

        let max_segment_size = self.context.config.max_segment_size();
        if self.tail().filled_up_to() >= max_segment_size {
            if self.active_operations.can_rotate_after(record) {
                let order = self.tail().order() + 1;
                self.rotate_to(order)?;
            } else if !self.active_operations.rotation_pending() {
                info!(
                    "WAL segment {} is full, rotate after {} open operations end",
                    self.tail().order(),
                    self.active_operations.len()
                );
                self.active_operations.set_rotation_pending(true);
            }
        }

        Ok(lsn)
    }

    /// Retire the tail and start a new one with the given order.
    fn rotate_to(&mut self, order: u64) -> Result<(), io::Error> {
        let tail = self.tail_mut();
        let prev = tail.order();

        tail.stop_background_write(true)?;
        let size = tail.filled_up_to();

        let mut segment = LogSegment::create(self.context.clone(), order)?;
        segment.start_background_write()?;

        self.segments.push(segment);
        self.non_active_size += size;
        self.active_operations.set_rotation_pending(false);

        info!("WAL rotated from segment {} to {}", prev, order);
        Ok(())
    }

    /// Remove the segments before `order`, never the tail, and drop master
    /// record slots pointing into them.
    fn cut_segments_before(&mut self, order: u64) -> Result<bool, io::Error> {
        let mut removed = false;

        while self.segments.len() > 1 && self.segments[0].order() < order {
            let segment = self.segments.remove(0);
            self.non_active_size -= segment.filled_up_to();
            segment.delete(false)?;
            removed = true;
        }

        if removed {
            let segments = &self.segments;
            self.master_record.fix(|lsn| contains_lsn(segments, lsn))?;
        }

        Ok(removed)
    }

    fn fail(&mut self, e: &io::Error) {
        if !self.closed {
            error!("WAL is closed because of an I/O failure: {}", e);
            self.closed = true;
        }
    }

    fn close(&mut self, flush: bool) -> Result<(), io::Error> {
        if !self.closed {
            info!("WAL closing, flush: {}", flush);
        }
        self.closed = true;

        let mut first_err = None;
        for segment in self.segments.iter_mut() {
            if let Err(e) = segment.close(flush) {
                error!("Failed to close WAL segment {}: {}", segment.order(), e);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Whether `lsn` points into the filled part of one of the `segments`.
fn contains_lsn(segments: &[LogSegment], lsn: LogSequenceNumber) -> bool {
    match segments.binary_search_by_key(&lsn.segment(), |s| s.order()) {
        Ok(i) => lsn.position() < segments[i].filled_up_to(),
        Err(_) => false,
    }
}
