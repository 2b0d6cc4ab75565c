use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use fs2::FileExt;
use log::info;

use crate::Config;

/// Exclusive lock on a WAL directory, so that only one process writes a
/// storage at a time.
#[derive(Debug)]
pub(crate) struct FileLock {
    config: Arc<Config>,
    f: File,
}

impl FileLock {
    pub(crate) fn new(config: Arc<Config>) -> Result<Self, io::Error> {
        let path = config.lock_path();

        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        f.try_lock_exclusive().map_err(|e| {
            io::Error::new(
                io::ErrorKind::WouldBlock,
                format!(
                    "WAL '{}' in '{}' is already locked by another process, \
                    shutdown other process to continue; \
                    error:({})",
                    config.storage_name(),
                    config.dir,
                    e
                ),
            )
        })?;

        info!("WAL directory lock acquired: {}", path);

        Ok(Self { config, f })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.f.unlock();
        info!("WAL directory lock released: {}", self.config.lock_path());
    }
}
