use std::fmt;

/// Binary format version of a WAL page, identified by the magic number.
///
/// Both versions share the leading `crc | magic | free_space` header. `V2`
/// appends the position of the last record that ends on the page and the
/// in-page offset where it ends, which lets crash recovery cut the log at an
/// exact record boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageFormat {
    V1,
    V2,
}

impl PageFormat {
    /// The format every newly created segment is written in.
    pub const CURRENT: PageFormat = PageFormat::V2;

    pub const CRC_OFFSET: usize = 0;
    pub const MAGIC_OFFSET: usize = 4;
    pub const FREE_SPACE_OFFSET: usize = 12;

    /// "WALPAGE1"
    const MAGIC_V1: u64 = 0x5741_4C50_4147_4531;
    /// "WALPAGE2"
    const MAGIC_V2: u64 = 0x5741_4C50_4147_4532;

    pub fn magic(&self) -> u64 {
        match self {
            PageFormat::V1 => Self::MAGIC_V1,
            PageFormat::V2 => Self::MAGIC_V2,
        }
    }

    pub fn from_magic(magic: u64) -> Option<Self> {
        match magic {
            Self::MAGIC_V1 => Some(PageFormat::V1),
            Self::MAGIC_V2 => Some(PageFormat::V2),
            _ => None,
        }
    }

    /// In-page offset where the first record chunk starts.
    pub fn records_offset(&self) -> usize {
        match self {
            PageFormat::V1 => 16,
            PageFormat::V2 => 28,
        }
    }

    /// Offset of the `i64` position of the last record ending on this page.
    pub fn last_stored_lsn_offset(&self) -> Option<usize> {
        match self {
            PageFormat::V1 => None,
            PageFormat::V2 => Some(16),
        }
    }

    /// Offset of the `i32` in-page end of the last record ending on this
    /// page.
    pub fn end_of_last_record_offset(&self) -> Option<usize> {
        match self {
            PageFormat::V1 => None,
            PageFormat::V2 => Some(24),
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageFormat::V1 => write!(f, "v1"),
            PageFormat::V2 => write!(f, "v2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PageFormat;

    #[test]
    fn test_magic_round_trip() {
        for fmt in [PageFormat::V1, PageFormat::V2] {
            assert_eq!(PageFormat::from_magic(fmt.magic()), Some(fmt));
        }
        assert_eq!(PageFormat::from_magic(0), None);
        assert_ne!(PageFormat::V1.magic(), PageFormat::V2.magic());
    }

    #[test]
    fn test_header_layout() {
        assert_eq!(PageFormat::V1.records_offset(), 16);
        assert_eq!(PageFormat::V1.last_stored_lsn_offset(), None);

        assert_eq!(PageFormat::V2.last_stored_lsn_offset(), Some(16));
        assert_eq!(PageFormat::V2.end_of_last_record_offset(), Some(24));
        assert_eq!(PageFormat::V2.records_offset(), 28);
    }
}
