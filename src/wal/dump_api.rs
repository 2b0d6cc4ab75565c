use std::io;

use crate::dump_writer;
use crate::LogSequenceNumber;
use crate::WALRecord;

/// A trait for dumping WAL contents in a human-readable format.
pub trait DumpApi {
    /// Writes the WAL contents to a String.
    fn write_to_string(&self) -> Result<String, io::Error> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    /// Writes the WAL contents to the provided writer.
    fn write<W: io::Write>(&self, mut w: W) -> Result<(), io::Error> {
        writeln!(&mut w, "WAL:")?;
        let write_record = |segment, in_segment_record_index, res| {
            dump_writer::write_record_debug(
                &mut w,
                segment,
                in_segment_record_index,
                res,
            )
        };
        self.write_with(write_record)
    }

    /// Writes the WAL contents using a custom record writer function.
    ///
    /// # Arguments
    /// * `write_record` - A function that writes individual log records. It
    ///   takes:
    ///   - `u64`: The order of the segment containing the record
    ///   - `u64`: The index of the record in its segment
    ///   - `Result<(LogSequenceNumber, WALRecord), io::Error>`: The record or
    ///     the error reading it
    ///
    /// # Returns
    /// - `Ok(())` if writing succeeds
    /// - `Err(io::Error)` if the user provided callback returns an error
    fn write_with<D>(&self, write_record: D) -> Result<(), io::Error>
    where D: FnMut(
            u64,
            u64,
            Result<(LogSequenceNumber, WALRecord), io::Error>,
        ) -> Result<(), io::Error>;
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    struct MockDump {
        records: Vec<Result<(LogSequenceNumber, WALRecord), String>>,
    }

    impl DumpApi for MockDump {
        fn write_with<D>(&self, mut write_record: D) -> Result<(), io::Error>
        where D: FnMut(
                u64,
                u64,
                Result<(LogSequenceNumber, WALRecord), io::Error>,
            ) -> Result<(), io::Error> {
            let mut prev = None;
            let mut index = 0;
            for r in self.records.iter() {
                let segment = match r {
                    Ok((lsn, _)) => lsn.segment(),
                    Err(_) => prev.unwrap_or_default(),
                };
                if prev != Some(segment) {
                    index = 0;
                }
                prev = Some(segment);

                let res = r
                    .clone()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e));
                write_record(segment, index, res)?;
                index += 1;
            }
            Ok(())
        }
    }

    #[test]
    fn test_write_to_string() -> Result<(), io::Error> {
        let dump = MockDump {
            records: vec![
                Ok((
                    LogSequenceNumber::new(0, 28),
                    WALRecord::NonTxOperationPerformed,
                )),
                Ok((LogSequenceNumber::new(0, 51), WALRecord::CheckpointEnd)),
                Ok((
                    LogSequenceNumber::new(2, 28),
                    WALRecord::FuzzyCheckpointEnd,
                )),
                Err("broken".to_string()),
            ],
        };

        let got = dump.write_to_string()?;
        let want = "\
WAL:
Segment(00_000_000_000_000_000_000)
  R-00000: LSN(0, 000_000_028): NonTxOperationPerformed
  R-00001: LSN(0, 000_000_051): CheckpointEnd
Segment(00_000_000_000_000_000_002)
  R-00000: LSN(2, 000_000_028): FuzzyCheckpointEnd
  Error: broken
";
        assert_eq!(want, got);
        Ok(())
    }

    #[test]
    fn test_write_with_custom_writer() -> Result<(), io::Error> {
        let dump = MockDump {
            records: vec![Ok((
                LogSequenceNumber::new(1, 28),
                WALRecord::CheckpointEnd,
            ))],
        };

        let mut custom_output = Vec::new();
        dump.write_with(|segment, index, res| {
            if let Ok((lsn, rec)) = res {
                writeln!(
                    &mut custom_output,
                    "custom: {} {} {} {:?}",
                    segment,
                    index,
                    lsn.position(),
                    rec
                )?;
            }
            Ok(())
        })?;

        let output = String::from_utf8(custom_output).unwrap();
        assert_eq!("custom: 1 0 28 CheckpointEnd\n", output);
        Ok(())
    }
}
