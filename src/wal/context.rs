use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::warn;

use crate::wal::flushed_lsn::FlushedLsn;
use crate::wal::listener::CheckpointRequestListener;
use crate::wal::listener::Listeners;
use crate::wal::listener::LowDiskSpaceInfo;
use crate::wal::listener::LowDiskSpaceListener;
use crate::Config;

/// State shared by the coordinator and the background writers of all
/// segments.
pub(crate) struct WALContext {
    pub(crate) config: Arc<Config>,

    pub(crate) flushed: FlushedLsn,

    pub(crate) low_disk_space_listeners: Listeners<dyn LowDiskSpaceListener>,

    pub(crate) checkpoint_request_listeners:
        Listeners<dyn CheckpointRequestListener>,

    /// Number of appends that had to store pages synchronously because too
    /// many were cached.
    pub(crate) cache_overflow_count: AtomicU64,

    /// Last measured free space of the WAL directory, `u64::MAX` if unknown.
    pub(crate) free_space: AtomicU64,
}

impl WALContext {
    pub(crate) fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            flushed: FlushedLsn::new(None),
            low_disk_space_listeners: Listeners::default(),
            checkpoint_request_listeners: Listeners::default(),
            cache_overflow_count: AtomicU64::new(0),
            free_space: AtomicU64::new(u64::MAX),
        }
    }

    /// Measure the free space of the WAL directory and notify the low disk
    /// space listeners if it is below the limit.
    pub(crate) fn check_free_space(&self) {
        let free_space = match fs2::available_space(&self.config.dir) {
            Ok(x) => x,
            Err(e) => {
                warn!(
                    "Failed to get free space of WAL dir '{}': {}",
                    self.config.dir, e
                );
                return;
            }
        };

        self.free_space.store(free_space, Ordering::Relaxed);

        let limit = self.config.free_space_limit();
        if free_space < limit {
            warn!(
                "Free space of WAL dir '{}' is {} bytes, below the limit {}",
                self.config.dir, free_space, limit
            );

            let info = LowDiskSpaceInfo { free_space, limit };
            for l in self.low_disk_space_listeners.snapshot() {
                l.on_low_disk_space(&info);
            }
        }
    }

    pub(crate) fn notify_checkpoint_request(&self) {
        for l in self.checkpoint_request_listeners.snapshot() {
            l.on_checkpoint_request();
        }
    }
}
