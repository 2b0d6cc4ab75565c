pub(crate) mod codec;
pub(crate) mod operation_unit_id;
pub(crate) mod page_changes;
pub(crate) mod payloads;

use std::io;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use codeq::config::Crc32fast;
use codeq::ChecksumReader;
use codeq::ChecksumWriter;
use codeq::Decode;
use codeq::Encode;

use self::codec::decode_bool;
use self::codec::decode_bytes;
use self::codec::decode_string;
use self::codec::encode_bool;
use self::codec::encode_bytes;
use self::codec::encode_string;
use self::codec::encode_u64;
use self::payloads::decode_dirty_pages;
use self::payloads::encode_dirty_pages;
use crate::errors::UnknownRecordType;
use crate::record::payloads::AtomicUnitEnd;
use crate::record::payloads::AtomicUnitStart;
use crate::record::payloads::CheckpointStart;
use crate::record::payloads::ClusterState;
use crate::record::payloads::DirtyPage;
use crate::record::payloads::PageUpdate;
use crate::OperationUnitId;

/// Checksum of an encoded record.
pub type Checksum = Crc32fast;

/// WALRecord represents the kinds of records the storage engine writes to the
/// write-ahead log.
///
/// The LSN of a record is assigned when it is logged and is returned alongside
/// it; it is not part of the encoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WALRecord {
    /// Byte-range diffs of a data page, for redo.
    UpdatePage(PageUpdate),

    /// Opens an atomic operation.
    AtomicUnitStart(AtomicUnitStart),

    /// Closes an atomic operation.
    AtomicUnitEnd(AtomicUnitEnd),

    FileCreated {
        operation_unit_id: OperationUnitId,
        file_id: u64,
        file_name: String,
    },

    FileDeleted {
        operation_unit_id: OperationUnitId,
        file_id: u64,
    },

    FileTruncated {
        operation_unit_id: OperationUnitId,
        file_id: u64,
    },

    /// Start of a fuzzy checkpoint; its LSN is stored in the master record.
    FuzzyCheckpointStart(CheckpointStart),

    FuzzyCheckpointEnd,

    /// Start of a full checkpoint; its LSN is stored in the master record.
    FullCheckpointStart(CheckpointStart),

    CheckpointEnd,

    /// Pages not yet stored in their data file when a checkpoint starts.
    DirtyPages(Vec<DirtyPage>),

    ClusterState(ClusterState),

    /// A page was taken from or returned to the free list of a file.
    FreePageChange {
        operation_unit_id: OperationUnitId,
        file_id: u64,
        page_index: u64,
        free: bool,
    },

    /// Opaque change description for consumers downstream of the log.
    HighLevelTransactionChange {
        operation_unit_id: OperationUnitId,
        data: Vec<u8>,
    },

    /// Marks that an operation outside of any atomic operation changed data.
    NonTxOperationPerformed,
}

impl WALRecord {
    /// Returns the numeric type identifier for this record
    /// Used during encoding and decoding.
    pub fn record_type(&self) -> u32 {
        match self {
            WALRecord::UpdatePage(_) => 0,
            WALRecord::AtomicUnitStart(_) => 1,
            WALRecord::AtomicUnitEnd(_) => 2,
            WALRecord::FileCreated { .. } => 3,
            WALRecord::FileDeleted { .. } => 4,
            WALRecord::FileTruncated { .. } => 5,
            WALRecord::FuzzyCheckpointStart(_) => 6,
            WALRecord::FuzzyCheckpointEnd => 7,
            WALRecord::FullCheckpointStart(_) => 8,
            WALRecord::CheckpointEnd => 9,
            WALRecord::DirtyPages(_) => 10,
            WALRecord::ClusterState(_) => 11,
            WALRecord::FreePageChange { .. } => 12,
            WALRecord::HighLevelTransactionChange { .. } => 13,
            WALRecord::NonTxOperationPerformed => 14,
        }
    }

    /// The atomic operation this record belongs to, if any.
    pub fn operation_unit_id(&self) -> Option<OperationUnitId> {
        match self {
            WALRecord::UpdatePage(u) => Some(u.operation_unit_id),
            WALRecord::AtomicUnitStart(s) => Some(s.operation_unit_id),
            WALRecord::AtomicUnitEnd(e) => Some(e.operation_unit_id),
            WALRecord::FileCreated {
                operation_unit_id, ..
            }
            | WALRecord::FileDeleted {
                operation_unit_id, ..
            }
            | WALRecord::FileTruncated {
                operation_unit_id, ..
            }
            | WALRecord::FreePageChange {
                operation_unit_id, ..
            }
            | WALRecord::HighLevelTransactionChange {
                operation_unit_id, ..
            } => Some(*operation_unit_id),
            WALRecord::FuzzyCheckpointStart(_)
            | WALRecord::FuzzyCheckpointEnd
            | WALRecord::FullCheckpointStart(_)
            | WALRecord::CheckpointEnd
            | WALRecord::DirtyPages(_)
            | WALRecord::ClusterState(_)
            | WALRecord::NonTxOperationPerformed => None,
        }
    }

    /// Whether the LSN of this record is stored in the master record when it
    /// is logged.
    pub fn is_update_master_record(&self) -> bool {
        matches!(
            self,
            WALRecord::FuzzyCheckpointStart(_) | WALRecord::FullCheckpointStart(_)
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, io::Error> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode a record that must occupy all of `buf`.
    pub fn from_bytes(mut buf: &[u8]) -> Result<Self, io::Error> {
        let rec = Self::decode(&mut buf)?;
        if !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} trailing bytes after WALRecord", buf.len()),
            ));
        }
        Ok(rec)
    }
}

/// Implements encoding for WALRecord
/// Each record is encoded as:
/// - 4 bytes: record type
/// - variable bytes: record payload
/// - 8 bytes: checksum
impl codeq::Encode for WALRecord {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        let mut n = 0;
        let mut cw = ChecksumWriter::<Checksum, _>::new(&mut w);

        // record type
        {
            let typ = self.record_type();
            cw.write_u32::<BigEndian>(typ)?;
            n += 4;
        }

        // record payload
        n += match self {
            WALRecord::UpdatePage(u) => u.encode(&mut cw)?,
            WALRecord::AtomicUnitStart(s) => s.encode(&mut cw)?,
            WALRecord::AtomicUnitEnd(e) => e.encode(&mut cw)?,
            WALRecord::FileCreated {
                operation_unit_id,
                file_id,
                file_name,
            } => {
                operation_unit_id.encode(&mut cw)?
                    + encode_u64(&mut cw, *file_id)?
                    + encode_string(&mut cw, file_name)?
            }
            WALRecord::FileDeleted {
                operation_unit_id,
                file_id,
            }
            | WALRecord::FileTruncated {
                operation_unit_id,
                file_id,
            } => {
                operation_unit_id.encode(&mut cw)?
                    + encode_u64(&mut cw, *file_id)?
            }
            WALRecord::FuzzyCheckpointStart(c) => c.encode(&mut cw)?,
            WALRecord::FuzzyCheckpointEnd => 0,
            WALRecord::FullCheckpointStart(c) => c.encode(&mut cw)?,
            WALRecord::CheckpointEnd => 0,
            WALRecord::DirtyPages(pages) => encode_dirty_pages(&mut cw, pages)?,
            WALRecord::ClusterState(s) => s.encode(&mut cw)?,
            WALRecord::FreePageChange {
                operation_unit_id,
                file_id,
                page_index,
                free,
            } => {
                operation_unit_id.encode(&mut cw)?
                    + encode_u64(&mut cw, *file_id)?
                    + encode_u64(&mut cw, *page_index)?
                    + encode_bool(&mut cw, *free)?
            }
            WALRecord::HighLevelTransactionChange {
                operation_unit_id,
                data,
            } => {
                operation_unit_id.encode(&mut cw)?
                    + encode_bytes(&mut cw, data)?
            }
            WALRecord::NonTxOperationPerformed => 0,
        };

        // checksum
        n += cw.write_checksum()?;

        Ok(n)
    }
}

/// Implements decoding for WALRecord
/// Reads the record type, payload, and verifies the checksum
impl codeq::Decode for WALRecord {
    fn decode<R: io::Read>(r: R) -> Result<Self, io::Error> {
        let mut cr = ChecksumReader::<Checksum, _>::new(r);

        let record_type = cr.read_u32::<BigEndian>()?;

        let rec = match record_type {
            0 => Self::UpdatePage(PageUpdate::decode(&mut cr)?),
            1 => Self::AtomicUnitStart(AtomicUnitStart::decode(&mut cr)?),
            2 => Self::AtomicUnitEnd(AtomicUnitEnd::decode(&mut cr)?),
            3 => Self::FileCreated {
                operation_unit_id: OperationUnitId::decode(&mut cr)?,
                file_id: cr.read_u64::<BigEndian>()?,
                file_name: decode_string(&mut cr)?,
            },
            4 => Self::FileDeleted {
                operation_unit_id: OperationUnitId::decode(&mut cr)?,
                file_id: cr.read_u64::<BigEndian>()?,
            },
            5 => Self::FileTruncated {
                operation_unit_id: OperationUnitId::decode(&mut cr)?,
                file_id: cr.read_u64::<BigEndian>()?,
            },
            6 => Self::FuzzyCheckpointStart(CheckpointStart::decode(&mut cr)?),
            7 => Self::FuzzyCheckpointEnd,
            8 => Self::FullCheckpointStart(CheckpointStart::decode(&mut cr)?),
            9 => Self::CheckpointEnd,
            10 => Self::DirtyPages(decode_dirty_pages(&mut cr)?),
            11 => Self::ClusterState(ClusterState::decode(&mut cr)?),
            12 => Self::FreePageChange {
                operation_unit_id: OperationUnitId::decode(&mut cr)?,
                file_id: cr.read_u64::<BigEndian>()?,
                page_index: cr.read_u64::<BigEndian>()?,
                free: decode_bool(&mut cr)?,
            },
            13 => Self::HighLevelTransactionChange {
                operation_unit_id: OperationUnitId::decode(&mut cr)?,
                data: decode_bytes(&mut cr)?,
            },
            14 => Self::NonTxOperationPerformed,

            _ => {
                return Err(UnknownRecordType::new(record_type).into());
            }
        };

        cr.verify_checksum(|| "WALRecord::decode()")?;

        Ok(rec)
    }
}
