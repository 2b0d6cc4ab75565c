use std::io;
use std::mem;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use log::error;

use crate::page::PageLayout;
use crate::segment::pending_record::PendingRecord;
use crate::segment::segment_file::SegmentFile;
use crate::wal::context::WALContext;

/// The part of a segment shared between the coordinator and the segment's
/// background writer.
pub(crate) struct SegmentShared {
    pub(crate) order: u64,
    pub(crate) layout: PageLayout,
    pub(crate) file: SegmentFile,
    pub(crate) context: Arc<WALContext>,

    pending: Mutex<Vec<PendingRecord>>,

    /// Everything before this position is stored in the file.
    written_up_to: AtomicU64,

    /// The first background I/O error. Once set, the segment accepts no more
    /// records.
    failure: Mutex<Option<(io::ErrorKind, String)>>,
}

impl SegmentShared {
    pub(crate) fn new(
        order: u64,
        layout: PageLayout,
        file: SegmentFile,
        context: Arc<WALContext>,
        written_up_to: u64,
    ) -> Self {
        Self {
            order,
            layout,
            file,
            context,
            pending: Mutex::new(Vec::new()),
            written_up_to: AtomicU64::new(written_up_to),
            failure: Mutex::new(None),
        }
    }

    pub(crate) fn push_pending(&self, record: PendingRecord) {
        self.pending.lock().unwrap().push(record);
    }

    pub(crate) fn take_pending(&self) -> Vec<PendingRecord> {
        mem::take(&mut *self.pending.lock().unwrap())
    }

    pub(crate) fn written_up_to(&self) -> u64 {
        self.written_up_to.load(Ordering::Acquire)
    }

    pub(crate) fn set_written_up_to(&self, position: u64) {
        self.written_up_to.store(position, Ordering::Release);
    }

    pub(crate) fn set_failure(&self, e: &io::Error) {
        let mut failure = self.failure.lock().unwrap();
        if failure.is_none() {
            error!(
                "WAL segment {} failed, no more records are accepted: {}",
                self.order, e
            );
            *failure = Some((e.kind(), e.to_string()));
        }
    }

    /// Returns the stored background failure, if any.
    pub(crate) fn check_failure(&self) -> Result<(), io::Error> {
        let failure = self.failure.lock().unwrap();
        match failure.as_ref() {
            None => Ok(()),
            Some((kind, msg)) => Err(io::Error::new(
                *kind,
                format!("WAL segment {} failed earlier: {}", self.order, msg),
            )),
        }
    }
}
