//! Define the writing interface of the write-ahead log.
//!
//! The storage engine logs a record before it changes a data page, and groups
//! the records of one atomic operation between a start and an end record. A
//! logged record is not durable until [`LogWriter::flush`] returns or the
//! background sync passes its LSN.

use std::collections::BTreeMap;
use std::io;

use crate::record::payloads::AtomicUnitEnd;
use crate::record::payloads::AtomicUnitStart;
use crate::LogSequenceNumber;
use crate::OperationUnitId;
use crate::WALRecord;

/// Define the writing interface of the write-ahead log.
///
/// Note: [`Self::log`] does not flush. Call [`Self::flush`] explicitly to
/// ensure data is durably persisted.
pub trait LogWriter {
    /// Append a record and return its LSN.
    ///
    /// LSNs of records logged one after another are strictly increasing.
    /// Logging a checkpoint start record also stores its LSN in the master
    /// record.
    ///
    /// While the tail segment waits to be rotated, a record starting a new
    /// atomic operation blocks until the rotation is done.
    fn log(&self, record: &WALRecord) -> Result<LogSequenceNumber, io::Error>;

    /// Log the start record of an atomic operation.
    fn log_atomic_operation_start_record(
        &self,
        rollback_supported: bool,
        operation_unit_id: OperationUnitId,
    ) -> Result<LogSequenceNumber, io::Error> {
        let record = WALRecord::AtomicUnitStart(AtomicUnitStart {
            operation_unit_id,
            rollback_supported,
            metadata: None,
        });
        self.log(&record)
    }

    /// Log the end record of an atomic operation.
    ///
    /// `rollback` tells whether the operation was rolled back instead of
    /// committed.
    fn log_atomic_operation_end_record(
        &self,
        operation_unit_id: OperationUnitId,
        rollback: bool,
        metadata: BTreeMap<String, Vec<u8>>,
    ) -> Result<LogSequenceNumber, io::Error> {
        let record = WALRecord::AtomicUnitEnd(AtomicUnitEnd {
            operation_unit_id,
            rollback,
            metadata,
        });
        self.log(&record)
    }

    /// Block until every record logged so far is stored and synced.
    fn flush(&self) -> Result<(), io::Error>;

    /// Flush, then remove every segment before the one holding `lsn`.
    ///
    /// The tail segment is never removed, and no segment at or after a
    /// cut-till limit is. Returns whether any segment was removed.
    fn cut_till(&self, lsn: LogSequenceNumber) -> Result<bool, io::Error>;

    /// Flush, then remove every segment but the tail.
    fn truncate(&self) -> Result<(), io::Error>;
}
