use std::io;
use std::sync::mpsc::SyncSender;

/// Receives the result of a blocking request to the background writer.
pub(crate) type Done = SyncSender<Result<(), io::Error>>;

pub(crate) enum WriteRequest {
    /// Store all pending records now.
    Write { done: Done },

    /// Store all pending records and sync the file.
    Flush { done: Done },

    /// Quit the writer, optionally flushing first.
    Shutdown { flush: bool, done: Done },
}
