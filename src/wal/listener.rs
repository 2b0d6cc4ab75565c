use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

/// Passed to [`LowDiskSpaceListener`]s when the free space of the WAL
/// directory drops below the configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowDiskSpaceInfo {
    pub free_space: u64,
    pub limit: u64,
}

/// Notified from the background writer after a batch of pages is stored while
/// the disk is short of space.
///
/// It must not call back into the log.
pub trait LowDiskSpaceListener: Send + Sync {
    fn on_low_disk_space(&self, info: &LowDiskSpaceInfo);
}

impl<F> LowDiskSpaceListener for F
where F: Fn(&LowDiskSpaceInfo) + Send + Sync
{
    fn on_low_disk_space(&self, info: &LowDiskSpaceInfo) {
        self(info)
    }
}

/// Notified after an append when the log outgrows its configured size and a
/// checkpoint would allow cutting it.
///
/// Called without any lock held, so it may log records itself.
pub trait CheckpointRequestListener: Send + Sync {
    fn on_checkpoint_request(&self);
}

impl<F> CheckpointRequestListener for F
where F: Fn() + Send + Sync
{
    fn on_checkpoint_request(&self) {
        self()
    }
}

/// Returned by listener registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// A set of subscribed listeners. Notification works on a snapshot so that a
/// listener may subscribe or unsubscribe while being notified.
pub(crate) struct Listeners<L: ?Sized> {
    next_id: AtomicU64,
    items: Mutex<Vec<(ListenerId, Arc<L>)>>,
}

impl<L: ?Sized> Default for Listeners<L> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> Listeners<L> {
    pub(crate) fn subscribe(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.items.lock().unwrap().push((id, listener));
        id
    }

    /// Returns whether the listener was subscribed.
    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut items = self.items.lock().unwrap();
        let len = items.len();
        items.retain(|(x, _)| *x != id);
        items.len() != len
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<L>> {
        let items = self.items.lock().unwrap();
        items.iter().map(|(_, l)| l.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_subscribe_unsubscribe() {
        let listeners = Listeners::<dyn CheckpointRequestListener>::default();

        let called = Arc::new(AtomicU64::new(0));
        let c = called.clone();
        let id1 = listeners.subscribe(Arc::new(move || {
            c.fetch_add(1, Ordering::Relaxed);
        }));
        let c = called.clone();
        let id2 = listeners.subscribe(Arc::new(move || {
            c.fetch_add(10, Ordering::Relaxed);
        }));
        assert_ne!(id1, id2);

        for l in listeners.snapshot() {
            l.on_checkpoint_request();
        }
        assert_eq!(called.load(Ordering::Relaxed), 11);

        assert!(listeners.unsubscribe(id2));
        assert!(!listeners.unsubscribe(id2));

        for l in listeners.snapshot() {
            l.on_checkpoint_request();
        }
        assert_eq!(called.load(Ordering::Relaxed), 12);
    }
}
