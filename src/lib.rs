//! Paged WAL:
//! A paginated write-ahead log for a page-based storage engine.
//!
//! ## Features
//!
//! - Records of any size, split into CRC-protected fixed-size pages
//! - Log sequence numbers (LSN) that address a record by segment and position
//! - Background page writes and periodic sync, with a durable LSN watermark
//! - Segment rotation that never splits an atomic operation across segments
//! - Crash recovery that cuts a segment at its last intact record
//! - A redundant master record holding the LSN of the last checkpoint
//!
//! ## Example
//!
//! ```rust
//! # use std::collections::BTreeMap;
//! # use std::sync::Arc;
//! use paged_wal::api::log_reader::LogReader;
//! use paged_wal::api::log_writer::LogWriter;
//! use paged_wal::{Config, OperationUnitId, WALRecord, WriteAheadLog};
//!
//! let temp_dir = tempfile::tempdir().unwrap();
//! let config = Arc::new(Config {
//!     dir: temp_dir.path().to_str().unwrap().to_string(),
//!     ..Default::default()
//! });
//! let wal = WriteAheadLog::open(config).unwrap();
//!
//! // Log an atomic operation
//! let op = OperationUnitId::generate();
//! let start = wal.log_atomic_operation_start_record(true, op).unwrap();
//! wal.log(&WALRecord::NonTxOperationPerformed).unwrap();
//! wal.log_atomic_operation_end_record(op, false, BTreeMap::new()).unwrap();
//!
//! // Make it durable
//! wal.flush().unwrap();
//! assert!(wal.flushed_lsn() > Some(start));
//!
//! // Read it back
//! let records = wal.iter().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
//! assert_eq!(records.len(), 3);
//! assert_eq!(records[0].0, start);
//! ```

mod config;
mod lsn;
mod record;
mod segment;
mod wal;

pub(crate) mod file_lock;
pub(crate) mod num;

pub use codeq;

pub mod api;
pub mod dump_writer;
pub mod errors;
pub mod page;

pub use config::Config;
pub use lsn::LogSequenceNumber;
pub use page::PageFormat;
pub use record::operation_unit_id::OperationUnitId;
pub use record::page_changes::PageChange;
pub use record::page_changes::PageChanges;
pub use record::payloads::AtomicUnitEnd;
pub use record::payloads::AtomicUnitStart;
pub use record::payloads::CheckpointStart;
pub use record::payloads::ClusterState;
pub use record::payloads::DirtyPage;
pub use record::payloads::PageUpdate;
pub use record::WALRecord;
pub use wal::dump::Dump;
pub use wal::dump_api::DumpApi;
pub use wal::flushed_lsn::Event;
pub use wal::listener::CheckpointRequestListener;
pub use wal::listener::ListenerId;
pub use wal::listener::LowDiskSpaceInfo;
pub use wal::listener::LowDiskSpaceListener;
pub use wal::stat::SegmentStat;
pub use wal::stat::Stat;
pub use wal::write_ahead_log::WriteAheadLog;

#[cfg(test)]
mod tests;
