use std::fmt;
use std::fmt::Formatter;

use crate::num::format_pad9_u64;
use crate::LogSequenceNumber;
use crate::PageFormat;

/// Statistics of a write-ahead log: its segments, size, and durability
/// watermarks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Every live segment, in order; the last one is the active tail.
    pub segments: Vec<SegmentStat>,
    /// Total size of all segments in bytes
    pub log_size: u64,
    /// The last record known to be durable
    pub flushed_lsn: Option<LogSequenceNumber>,
    /// The LSN held by the master record
    pub last_checkpoint: Option<LogSequenceNumber>,
    /// Number of atomic operations started and not yet ended
    pub active_operations: u64,
    /// Number of appends that stored pages synchronously
    pub cache_overflow_count: u64,
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let lb = if f.alternate() { "\n" } else { "" };
        let idt = if f.alternate() { "  " } else { "" };
        write!(
            f,
            "Stat{{{lb} segments: [{lb}{idt}{}{lb} ],{lb} \
            log_size: {},{lb} \
            flushed_lsn: {},{lb} \
            last_checkpoint: {},{lb} \
            active_operations: {},{lb} \
            cache_overflow_count: {}{lb}\
            }}",
            self.segments
                .iter()
                .map(|c| format!("{}", c))
                .collect::<Vec<String>>()
                .join(&format!(",{lb}{idt}")),
            format_pad9_u64(self.log_size),
            display_lsn(self.flushed_lsn),
            display_lsn(self.last_checkpoint),
            self.active_operations,
            self.cache_overflow_count,
        )
    }
}

/// Statistics of a single segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentStat {
    /// Order of the segment, part of its file name
    pub order: u64,
    /// Page format the segment is written in
    pub format: PageFormat,
    /// End of the last record, including records not yet stored
    pub filled_up_to: u64,
    pub begin: Option<LogSequenceNumber>,
    pub end: Option<LogSequenceNumber>,
    /// Whether this is the tail segment accepting records
    pub writable: bool,
}

impl fmt::Display for SegmentStat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SegmentStat({}){{{}, filled_up_to: {}, [{}, {}]{}}}",
            self.order,
            self.format,
            format_pad9_u64(self.filled_up_to),
            display_lsn(self.begin),
            display_lsn(self.end),
            if self.writable { ", writable" } else { "" },
        )
    }
}

fn display_lsn(lsn: Option<LogSequenceNumber>) -> String {
    match lsn {
        Some(lsn) => lsn.to_string(),
        None => "None".to_string(),
    }
}
