pub(crate) mod active_operations;
pub(crate) mod context;
pub mod dump;
pub mod dump_api;
pub(crate) mod flushed_lsn;
pub mod listener;
pub(crate) mod master_record;
pub mod stat;
pub(crate) mod write_ahead_log;
