use std::collections::BTreeMap;
use std::mem;
use std::sync::Mutex;

use log::debug;

use crate::LogSequenceNumber;

/// A callback run once the log is durable up to a given LSN.
pub type Event = Box<dyn FnOnce() + Send>;

/// The durable high-water mark of the log and the events waiting for it.
pub(crate) struct FlushedLsn {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    lsn: Option<LogSequenceNumber>,
    events: BTreeMap<LogSequenceNumber, Vec<Event>>,
}

impl FlushedLsn {
    pub(crate) fn new(lsn: Option<LogSequenceNumber>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lsn,
                events: BTreeMap::new(),
            }),
        }
    }

    pub(crate) fn get(&self) -> Option<LogSequenceNumber> {
        self.inner.lock().unwrap().lsn
    }

    /// Move the watermark forward to `lsn` and run the events it passed.
    ///
    /// The watermark never moves backward.
    pub(crate) fn advance(&self, lsn: LogSequenceNumber) {
        let due = {
            let mut inner = self.inner.lock().unwrap();
            if inner.lsn >= Some(lsn) {
                return;
            }
            inner.lsn = Some(lsn);

            let after = LogSequenceNumber::new(
                lsn.segment(),
                lsn.position().saturating_add(1),
            );
            let later = inner.events.split_off(&after);
            mem::replace(&mut inner.events, later)
        };

        if !due.is_empty() {
            debug!("flushed up to {}, run {} events", lsn, due.len());
        }

        for event in due.into_values().flatten() {
            event();
        }
    }

    /// Run `event` once the watermark reaches `lsn`; immediately if it
    /// already has.
    pub(crate) fn add_event(&self, lsn: LogSequenceNumber, event: Event) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.lsn < Some(lsn) {
                inner.events.entry(lsn).or_default().push(event);
                return;
            }
        }
        event();
    }

    pub(crate) fn pending_events(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.events.values().map(|v| v.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::FlushedLsn;
    use crate::LogSequenceNumber as Lsn;

    #[test]
    fn test_advance_is_monotonic() {
        let f = FlushedLsn::new(None);
        assert_eq!(f.get(), None);

        f.advance(Lsn::new(0, 100));
        assert_eq!(f.get(), Some(Lsn::new(0, 100)));

        f.advance(Lsn::new(0, 50));
        assert_eq!(f.get(), Some(Lsn::new(0, 100)));

        f.advance(Lsn::new(1, 28));
        assert_eq!(f.get(), Some(Lsn::new(1, 28)));
    }

    #[test]
    fn test_events() {
        let f = FlushedLsn::new(Some(Lsn::new(0, 28)));
        let fired = Arc::new(AtomicU64::new(0));

        let add = |lsn: Lsn, v: u64| {
            let fired = fired.clone();
            f.add_event(
                lsn,
                Box::new(move || {
                    fired.fetch_add(v, Ordering::Relaxed);
                }),
            );
        };

        // Already durable
        add(Lsn::new(0, 28), 1);
        assert_eq!(fired.load(Ordering::Relaxed), 1);

        add(Lsn::new(0, 50), 10);
        add(Lsn::new(0, 60), 100);
        add(Lsn::new(1, 28), 1000);
        assert_eq!(f.pending_events(), 3);

        f.advance(Lsn::new(0, 50));
        assert_eq!(fired.load(Ordering::Relaxed), 11);

        f.advance(Lsn::new(0, 70));
        assert_eq!(fired.load(Ordering::Relaxed), 111);
        assert_eq!(f.pending_events(), 1);
    }
}
