//! Reading and writing interfaces of the write-ahead log.

pub mod log_reader;
pub mod log_writer;
