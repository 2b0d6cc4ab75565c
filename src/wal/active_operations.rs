use std::collections::BTreeSet;

use crate::OperationUnitId;
use crate::WALRecord;

/// The atomic operations started but not yet ended, and whether the tail
/// segment is waiting for them to end before it is rotated.
///
/// A segment is only rotated when no operation is open, so that the start and
/// end record of an operation always land in the same segment.
#[derive(Debug, Clone, Default)]
pub(crate) struct ActiveOperations {
    open: BTreeSet<OperationUnitId>,
    rotation_pending: bool,
}

impl ActiveOperations {
    pub(crate) fn len(&self) -> usize {
        self.open.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub(crate) fn rotation_pending(&self) -> bool {
        self.rotation_pending
    }

    pub(crate) fn set_rotation_pending(&mut self, pending: bool) {
        self.rotation_pending = pending;
    }

    /// Whether logging `record` must wait for a pending rotation: it would
    /// open a new operation in the segment about to be retired.
    pub(crate) fn must_wait(&self, record: &WALRecord) -> bool {
        match record {
            WALRecord::AtomicUnitStart(s) => {
                self.rotation_pending
                    && !self.open.is_empty()
                    && !self.open.contains(&s.operation_unit_id)
            }
            _ => false,
        }
    }

    /// Track the operation started or ended by `record`.
    pub(crate) fn apply(&mut self, record: &WALRecord) {
        match record {
            WALRecord::AtomicUnitStart(s) => {
                self.open.insert(s.operation_unit_id);
            }
            WALRecord::AtomicUnitEnd(e) => {
                self.open.remove(&e.operation_unit_id);
            }
            _ => {}
        }
    }

    /// Whether the segment can be rotated right after `record` was applied.
    ///
    /// It is when no operation remains open, and `record` is either the end
    /// of the last one or belongs to no operation at all.
    pub(crate) fn can_rotate_after(&self, record: &WALRecord) -> bool {
        if !self.open.is_empty() {
            return false;
        }

        matches!(record, WALRecord::AtomicUnitEnd(_))
            || record.operation_unit_id().is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::ActiveOperations;
    use crate::record::payloads::AtomicUnitEnd;
    use crate::record::payloads::AtomicUnitStart;
    use crate::OperationUnitId;
    use crate::WALRecord;

    fn start(id: u64) -> WALRecord {
        WALRecord::AtomicUnitStart(AtomicUnitStart {
            operation_unit_id: OperationUnitId(id),
            rollback_supported: true,
            metadata: None,
        })
    }

    fn end(id: u64) -> WALRecord {
        WALRecord::AtomicUnitEnd(AtomicUnitEnd {
            operation_unit_id: OperationUnitId(id),
            rollback: false,
            metadata: BTreeMap::new(),
        })
    }

    #[test]
    fn test_rotate_only_when_all_closed() {
        let mut ops = ActiveOperations::default();

        assert!(ops.can_rotate_after(&WALRecord::NonTxOperationPerformed));

        ops.apply(&start(1));
        ops.apply(&start(2));
        assert_eq!(ops.len(), 2);
        assert!(!ops.can_rotate_after(&start(2)));

        ops.apply(&end(1));
        assert!(!ops.can_rotate_after(&end(1)));

        ops.apply(&end(2));
        assert!(ops.is_empty());
        assert!(ops.can_rotate_after(&end(2)));
    }

    #[test]
    fn test_must_wait() {
        let mut ops = ActiveOperations::default();
        ops.apply(&start(1));

        assert!(!ops.must_wait(&start(2)));

        ops.set_rotation_pending(true);
        assert!(ops.must_wait(&start(2)));
        assert!(!ops.must_wait(&start(1)));
        assert!(!ops.must_wait(&end(1)));
        assert!(!ops.must_wait(&WALRecord::NonTxOperationPerformed));

        // Nothing open: the start record rotates the segment instead.
        ops.apply(&end(1));
        assert!(!ops.must_wait(&start(2)));
    }
}
