//! Errors raised by the write-ahead log.
//!
//! Every public operation returns `io::Error`; the domain error is kept as the
//! inner value so that a caller can recover it with
//! `io::Error::get_ref().and_then(|e| e.downcast_ref::<PageBroken>())`.

mod storage_errors;

use std::io;
use std::time::Duration;

pub use storage_errors::InvalidConfig;
pub use storage_errors::InvalidSegmentFileName;

use crate::page::PageDamage;
use crate::LogSequenceNumber;

/// A page failed CRC/magic validation, or its chunk framing is inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Page {page_index} of segment {segment} is broken: {damage}")]
pub struct PageBroken {
    pub segment: u64,
    pub page_index: u64,
    pub damage: PageDamage,
}

impl PageBroken {
    pub fn new(segment: u64, page_index: u64, damage: PageDamage) -> Self {
        Self {
            segment,
            page_index,
            damage,
        }
    }
}

impl From<PageBroken> for io::Error {
    fn from(value: PageBroken) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, value)
    }
}

/// The record type tag is not one of the known record kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Unknown WAL record type: {record_type}")]
pub struct UnknownRecordType {
    pub record_type: u32,
}

impl UnknownRecordType {
    pub fn new(record_type: u32) -> Self {
        Self { record_type }
    }
}

impl From<UnknownRecordType> for io::Error {
    fn from(value: UnknownRecordType) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, value)
    }
}

/// The bytes stored at an LSN can not be interpreted as a record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Failed to decode WAL record at {lsn}: {reason}")]
pub struct RecordDecodeError {
    pub lsn: LogSequenceNumber,
    pub reason: String,
}

impl RecordDecodeError {
    pub fn new(lsn: LogSequenceNumber, reason: impl ToString) -> Self {
        Self {
            lsn,
            reason: reason.to_string(),
        }
    }
}

impl From<RecordDecodeError> for io::Error {
    fn from(value: RecordDecodeError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, value)
    }
}

/// The log is closed, either explicitly or after an unrecoverable I/O
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("WAL is closed when {when}")]
pub struct WALClosed {
    pub when: String,
}

impl WALClosed {
    pub fn new(when: impl ToString) -> Self {
        Self {
            when: when.to_string(),
        }
    }
}

impl From<WALClosed> for io::Error {
    fn from(value: WALClosed) -> Self {
        io::Error::new(io::ErrorKind::Other, value)
    }
}

/// A background worker did not stop within the configured bound.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Background writer of segment {segment} did not stop in {timeout:?}")]
pub struct ShutdownTimeout {
    pub segment: u64,
    pub timeout: Duration,
}

impl ShutdownTimeout {
    pub fn new(segment: u64, timeout: Duration) -> Self {
        Self { segment, timeout }
    }
}

impl From<ShutdownTimeout> for io::Error {
    fn from(value: ShutdownTimeout) -> Self {
        io::Error::new(io::ErrorKind::TimedOut, value)
    }
}

/// An operation that requires no open atomic operation was attempted while
/// some are open.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("{count} atomic operations are still open when {when}")]
pub struct ActiveOperationsPresent {
    pub count: usize,
    pub when: &'static str,
}

impl ActiveOperationsPresent {
    pub fn new(count: usize, when: &'static str) -> Self {
        Self { count, when }
    }
}

impl From<ActiveOperationsPresent> for io::Error {
    fn from(value: ActiveOperationsPresent) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, value)
    }
}

/// Returns the domain error carried by an `io::Error`, if it is of type `E`.
pub fn downcast_ref<E>(e: &io::Error) -> Option<&E>
where E: std::error::Error + 'static {
    e.get_ref().and_then(|inner| inner.downcast_ref::<E>())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::page::PageDamage;

    #[test]
    fn test_page_broken_into_io_error() {
        let e = PageBroken::new(3, 7, PageDamage::BadMagic(0x1234));
        let io_err: io::Error = e.clone().into();

        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(downcast_ref::<PageBroken>(&io_err), Some(&e));
        assert_eq!(
            io_err.to_string(),
            "Page 7 of segment 3 is broken: unknown magic number 0x0000000000001234"
        );
    }

    #[test]
    fn test_shutdown_timeout_kind() {
        let io_err: io::Error =
            ShutdownTimeout::new(1, std::time::Duration::from_millis(5)).into();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);
        assert!(downcast_ref::<WALClosed>(&io_err).is_none());
    }
}
