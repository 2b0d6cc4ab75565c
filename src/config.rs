use std::format;
use std::time::Duration;

use crate::errors::InvalidConfig;
use crate::errors::InvalidSegmentFileName;
use crate::page::PageFormat;
use crate::page::MIN_RECORD_SIZE;

/// Configuration for the write-ahead log.
///
/// Optional parameters are `Option<T>` in this struct, and default values is
/// evaluated when a getter method is called.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Directory holding the segment files and the master record.
    pub dir: String,

    /// Prefix of every file name: `<storage_name>.<order>.wal`,
    /// `<storage_name>.wmr`.
    pub storage_name: Option<String>,

    /// Size of a WAL page in bytes.
    pub page_size: Option<usize>,

    /// Maximum number of written but not yet stored pages. Exceeding it makes
    /// the appending thread write them out itself.
    pub max_pages_cache_size: Option<usize>,

    /// Size in bytes after which the tail segment is rotated.
    pub max_segment_size: Option<u64>,

    /// Total log size in bytes after which checkpoint-request listeners are
    /// notified.
    pub max_log_size: Option<u64>,

    /// Interval of the background sync, in milliseconds. `0` disables it.
    pub commit_delay_ms: Option<u64>,

    /// Interval of the background write, in microseconds.
    pub write_interval_us: Option<u64>,

    /// Whether to fsync when the background sync runs.
    pub sync_on_page_flush: Option<bool>,

    /// Free disk space in bytes under which low-disk-space listeners are
    /// notified.
    pub free_space_limit: Option<u64>,

    /// How long to wait for a background writer to stop, in milliseconds.
    pub shutdown_timeout_ms: Option<u64>,
}

impl Config {
    /// Creates a new Config with the specified directory and default values for
    /// other fields
    pub fn new(dir: impl ToString) -> Self {
        Self {
            dir: dir.to_string(),
            ..Default::default()
        }
    }

    /// Returns the storage name (defaults to "storage")
    pub fn storage_name(&self) -> &str {
        self.storage_name.as_deref().unwrap_or("storage")
    }

    /// Returns the page size (defaults to 64KB)
    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or(64 * 1024)
    }

    /// Returns the max number of unstored pages (defaults to 1024)
    pub fn max_pages_cache_size(&self) -> usize {
        self.max_pages_cache_size.unwrap_or(1024)
    }

    /// Returns the segment rotation size (defaults to 128MB)
    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size.unwrap_or(128 * 1024 * 1024)
    }

    /// Returns the checkpoint-request log size (defaults to 4GB)
    pub fn max_log_size(&self) -> u64 {
        self.max_log_size.unwrap_or(4 * 1024 * 1024 * 1024)
    }

    /// Returns the background sync interval (defaults to 1 second)
    pub fn commit_delay(&self) -> Duration {
        Duration::from_millis(self.commit_delay_ms.unwrap_or(1_000))
    }

    /// Returns the background write interval (defaults to 500 microseconds)
    pub fn write_interval(&self) -> Duration {
        Duration::from_micros(self.write_interval_us.unwrap_or(500))
    }

    /// Returns whether to fsync on background sync (defaults to true)
    pub fn sync_on_page_flush(&self) -> bool {
        self.sync_on_page_flush.unwrap_or(true)
    }

    /// Returns the low-disk-space threshold (defaults to 256MB)
    pub fn free_space_limit(&self) -> u64 {
        self.free_space_limit.unwrap_or(256 * 1024 * 1024)
    }

    /// Returns the background writer shutdown bound (defaults to 10 seconds)
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms.unwrap_or(10_000))
    }

    /// Check that the settings describe a usable log.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.dir.is_empty() {
            return Err(InvalidConfig::new("dir", "must not be empty"));
        }

        let name = self.storage_name();
        if name.is_empty() || name.contains('.') || name.contains('/') {
            return Err(InvalidConfig::new(
                "storage_name",
                format!("'{}' must be non-empty without '.' or '/'", name),
            ));
        }

        let page_size = self.page_size();
        let min = PageFormat::CURRENT.records_offset() + MIN_RECORD_SIZE * 4;
        if page_size < min || page_size as u64 > u32::MAX as u64 {
            return Err(InvalidConfig::new(
                "page_size",
                format!("{} is not in [{}, {}]", page_size, min, u32::MAX),
            ));
        }

        if self.max_segment_size() < page_size as u64 {
            return Err(InvalidConfig::new(
                "max_segment_size",
                format!(
                    "{} is smaller than page size {}",
                    self.max_segment_size(),
                    page_size
                ),
            ));
        }

        Ok(())
    }

    /// Returns the full path of the segment file with the given order.
    pub fn segment_path(&self, order: u64) -> String {
        format!("{}/{}", self.dir, self.segment_file_name(order))
    }

    /// The file name format is "<storage_name>.<order>.wal"
    pub(crate) fn segment_file_name(&self, order: u64) -> String {
        format!("{}.{}.wal", self.storage_name(), order)
    }

    /// Returns the full path of the master record file.
    pub fn master_record_path(&self) -> String {
        format!("{}/{}.wmr", self.dir, self.storage_name())
    }

    /// Returns the full path of the directory lock file.
    pub fn lock_path(&self) -> String {
        format!("{}/{}.lock", self.dir, self.storage_name())
    }

    /// Parses a segment file name and returns the segment order.
    ///
    /// The storage name must match exactly: the segment is opened by the path
    /// built from `storage_name`.
    ///
    /// # Returns
    /// * `Ok(u64)` - The segment order if parsing succeeds
    /// * `Err(InvalidSegmentFileName)` - If the file name format is invalid
    pub(crate) fn parse_segment_file_name(
        &self,
        file_name: &str,
    ) -> Result<u64, InvalidSegmentFileName> {
        let without_suffix =
            file_name.strip_suffix(".wal").ok_or_else(|| {
                InvalidSegmentFileName::new(file_name, "has no '.wal' suffix")
            })?;

        let (name, order) =
            without_suffix.rsplit_once('.').ok_or_else(|| {
                InvalidSegmentFileName::new(file_name, "has no '.<order>' part")
            })?;

        if name != self.storage_name() {
            return Err(InvalidSegmentFileName::new(
                file_name,
                format!("does not belong to storage '{}'", self.storage_name()),
            ));
        }

        if order.is_empty() || !order.chars().all(|c| c.is_ascii_digit()) {
            return Err(InvalidSegmentFileName::new(
                file_name,
                "order is not a decimal number",
            ));
        }

        order.parse::<u64>().map_err(|e| {
            InvalidSegmentFileName::new(
                file_name,
                format!("cannot parse as u64: {}", e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn test_parse_segment_file_name() {
        let config = Config {
            dir: "/tmp/x".to_string(),
            storage_name: Some("db".to_string()),
            ..Default::default()
        };

        assert_eq!(config.parse_segment_file_name("db.0.wal"), Ok(0));
        assert_eq!(config.parse_segment_file_name("db.12.wal"), Ok(12));

        assert!(config.parse_segment_file_name("DB.7.wal").is_err());
        assert!(config.parse_segment_file_name("db.wmr").is_err());
        assert!(config.parse_segment_file_name("db.12.wall").is_err());
        assert!(config.parse_segment_file_name("db.wal").is_err());
        assert!(config.parse_segment_file_name("other.1.wal").is_err());
        assert!(config.parse_segment_file_name("db.-1.wal").is_err());
        assert!(config.parse_segment_file_name("db..wal").is_err());
        assert!(config
            .parse_segment_file_name("db.99999999999999999999999.wal")
            .is_err());
    }

    #[test]
    fn test_file_paths() {
        let config = Config::new("/tmp/x");

        assert_eq!(config.segment_path(3), "/tmp/x/storage.3.wal");
        assert_eq!(config.master_record_path(), "/tmp/x/storage.wmr");
        assert_eq!(config.lock_path(), "/tmp/x/storage.lock");
        assert_eq!(config.parse_segment_file_name("storage.3.wal"), Ok(3));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::new("/tmp/x");
        assert!(config.validate().is_ok());

        config.page_size = Some(32);
        assert_eq!(config.validate().unwrap_err().field, "page_size");

        config.page_size = Some(128);
        config.max_segment_size = Some(64);
        assert_eq!(config.validate().unwrap_err().field, "max_segment_size");

        config.max_segment_size = None;
        config.storage_name = Some("a.b".to_string());
        assert_eq!(config.validate().unwrap_err().field, "storage_name");
    }
}
