use std::io;

use crate::LogSequenceNumber;
use crate::WALRecord;

/// Define the reading interface of the write-ahead log.
///
/// Records not yet stored by the background writer are stored before they are
/// read, so that every logged record can be read back at once.
pub trait LogReader {
    /// LSN of the first record in the log.
    fn begin(&self) -> Result<Option<LogSequenceNumber>, io::Error>;

    /// LSN of the last record in the log.
    fn end(&self) -> Result<Option<LogSequenceNumber>, io::Error>;

    /// Read the record at `lsn`.
    ///
    /// Returns `None` if there is no record at `lsn`, e.g., its segment has
    /// been cut.
    fn read(
        &self,
        lsn: LogSequenceNumber,
    ) -> Result<Option<WALRecord>, io::Error>;

    /// LSN of the record following the one at `lsn`, skipping empty segments.
    fn next(
        &self,
        lsn: LogSequenceNumber,
    ) -> Result<Option<LogSequenceNumber>, io::Error>;

    /// Iterate records from the one at `lsn` to the end of the log.
    fn iter_from(&self, lsn: LogSequenceNumber) -> LogIter<'_, Self> {
        LogIter {
            reader: self,
            next: Some(lsn),
            error: None,
        }
    }

    /// Iterate all records in the log.
    fn iter(&self) -> Result<LogIter<'_, Self>, io::Error> {
        let begin = self.begin()?;
        Ok(LogIter {
            reader: self,
            next: begin,
            error: None,
        })
    }
}

/// An iterator over the records of a log, yielding `(lsn, record)` pairs.
///
/// It stops after the first error.
pub struct LogIter<'a, R: ?Sized> {
    reader: &'a R,
    next: Option<LogSequenceNumber>,

    /// An error met when looking for the next record, returned after the
    /// current one.
    error: Option<io::Error>,
}

impl<R> Iterator for LogIter<'_, R>
where R: LogReader + ?Sized
{
    type Item = Result<(LogSequenceNumber, WALRecord), io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.error.take() {
            return Some(Err(e));
        }

        let lsn = self.next.take()?;

        let record = match self.reader.read(lsn) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };

        match LogReader::next(self.reader, lsn) {
            Ok(next) => self.next = next,
            Err(e) => self.error = Some(e),
        }

        Some(Ok((lsn, record)))
    }
}
