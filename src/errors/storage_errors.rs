use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Invalid WAL segment file name: {bad_file_name}: {reason}")]
pub struct InvalidSegmentFileName {
    pub bad_file_name: String,
    pub reason: String,
}

impl InvalidSegmentFileName {
    pub fn new(bad_file_name: impl ToString, reason: impl ToString) -> Self {
        Self {
            bad_file_name: bad_file_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<InvalidSegmentFileName> for io::Error {
    fn from(value: InvalidSegmentFileName) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Invalid config {field}: {reason}")]
pub struct InvalidConfig {
    pub field: &'static str,
    pub reason: String,
}

impl InvalidConfig {
    pub fn new(field: &'static str, reason: impl ToString) -> Self {
        Self {
            field,
            reason: reason.to_string(),
        }
    }
}

impl From<InvalidConfig> for io::Error {
    fn from(value: InvalidConfig) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, value)
    }
}
