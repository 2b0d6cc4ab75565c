use std::io;

use crate::num::format_pad_u64;
use crate::LogSequenceNumber;
use crate::WALRecord;

/// Write one record per line, with a header line before the first record of
/// each segment:
///
/// ```text
/// Segment(00_000_000_000_000_000_001)
///   R-00000: LSN(1, 000_000_028): NonTxOperationPerformed
/// ```
pub fn write_record_debug<W: io::Write>(
    w: &mut W,
    segment: u64,
    record_index: u64,
    res: Result<(LogSequenceNumber, WALRecord), io::Error>,
) -> Result<(), io::Error> {
    if record_index == 0 {
        writeln!(w, "Segment({})", format_pad_u64(segment))?;
    }

    match res {
        Ok((lsn, rec)) => {
            writeln!(w, "  R-{record_index:05}: {}: {:?}", lsn, rec)?;
        }
        Err(io_err) => {
            writeln!(w, "  Error: {}", io_err)?;
        }
    }
    Ok(())
}
