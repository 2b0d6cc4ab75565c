//! Payloads of the record kinds that carry more than a couple of fields.

use std::collections::BTreeMap;
use std::io;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use codeq::Decode;
use codeq::Encode;

use crate::record::codec::decode_bool;
use crate::record::codec::decode_metadata;
use crate::record::codec::decode_option_bytes;
use crate::record::codec::decode_option_lsn;
use crate::record::codec::encode_bool;
use crate::record::codec::encode_metadata;
use crate::record::codec::encode_option_bytes;
use crate::record::codec::encode_option_lsn;
use crate::record::codec::encode_u64;
use crate::LogSequenceNumber;
use crate::OperationUnitId;
use crate::PageChanges;

/// Redo information of one page of a data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUpdate {
    pub operation_unit_id: OperationUnitId,
    pub file_id: u64,
    pub page_index: u64,
    pub changes: PageChanges,
}

impl Encode for PageUpdate {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        let mut n = self.operation_unit_id.encode(&mut w)?;
        n += encode_u64(&mut w, self.file_id)?;
        n += encode_u64(&mut w, self.page_index)?;
        n += self.changes.encode(&mut w)?;
        Ok(n)
    }
}

impl Decode for PageUpdate {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        Ok(Self {
            operation_unit_id: OperationUnitId::decode(&mut r)?,
            file_id: r.read_u64::<BigEndian>()?,
            page_index: r.read_u64::<BigEndian>()?,
            changes: PageChanges::decode(&mut r)?,
        })
    }
}

/// Opens an atomic operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicUnitStart {
    pub operation_unit_id: OperationUnitId,
    pub rollback_supported: bool,
    pub metadata: Option<Vec<u8>>,
}

impl Encode for AtomicUnitStart {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        let mut n = self.operation_unit_id.encode(&mut w)?;
        n += encode_bool(&mut w, self.rollback_supported)?;
        n += encode_option_bytes(&mut w, self.metadata.as_deref())?;
        Ok(n)
    }
}

impl Decode for AtomicUnitStart {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        Ok(Self {
            operation_unit_id: OperationUnitId::decode(&mut r)?,
            rollback_supported: decode_bool(&mut r)?,
            metadata: decode_option_bytes(&mut r)?,
        })
    }
}

/// Closes an atomic operation, either committing or rolling back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicUnitEnd {
    pub operation_unit_id: OperationUnitId,
    pub rollback: bool,
    pub metadata: BTreeMap<String, Vec<u8>>,
}

impl Encode for AtomicUnitEnd {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        let mut n = self.operation_unit_id.encode(&mut w)?;
        n += encode_bool(&mut w, self.rollback)?;
        n += encode_metadata(&mut w, &self.metadata)?;
        Ok(n)
    }
}

impl Decode for AtomicUnitEnd {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        Ok(Self {
            operation_unit_id: OperationUnitId::decode(&mut r)?,
            rollback: decode_bool(&mut r)?,
            metadata: decode_metadata(&mut r)?,
        })
    }
}

/// Start of a fuzzy or full checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointStart {
    pub previous_checkpoint: Option<LogSequenceNumber>,
    pub metadata: Option<Vec<u8>>,
}

impl Encode for CheckpointStart {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        let mut n = encode_option_lsn(&mut w, self.previous_checkpoint)?;
        n += encode_option_bytes(&mut w, self.metadata.as_deref())?;
        Ok(n)
    }
}

impl Decode for CheckpointStart {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        Ok(Self {
            previous_checkpoint: decode_option_lsn(&mut r)?,
            metadata: decode_option_bytes(&mut r)?,
        })
    }
}

/// A page modified in memory but not yet stored in its data file, with the
/// LSN of the first change since it was last stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyPage {
    pub file_id: u64,
    pub page_index: u64,
    pub lsn: LogSequenceNumber,
}

impl Encode for DirtyPage {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        let mut n = encode_u64(&mut w, self.file_id)?;
        n += encode_u64(&mut w, self.page_index)?;
        n += self.lsn.encode(&mut w)?;
        Ok(n)
    }
}

impl Decode for DirtyPage {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        Ok(Self {
            file_id: r.read_u64::<BigEndian>()?,
            page_index: r.read_u64::<BigEndian>()?,
            lsn: LogSequenceNumber::decode(&mut r)?,
        })
    }
}

pub(crate) fn encode_dirty_pages<W: io::Write>(
    mut w: W,
    pages: &[DirtyPage],
) -> Result<usize, io::Error> {
    w.write_u32::<BigEndian>(pages.len() as u32)?;
    let mut n = 4;
    for p in pages {
        n += p.encode(&mut w)?;
    }
    Ok(n)
}

pub(crate) fn decode_dirty_pages<R: io::Read>(
    mut r: R,
) -> Result<Vec<DirtyPage>, io::Error> {
    let count = r.read_u32::<BigEndian>()?;
    let mut pages = Vec::new();
    for _ in 0..count {
        pages.push(DirtyPage::decode(&mut r)?);
    }
    Ok(pages)
}

/// Snapshot of the bookkeeping of one cluster (a logical data file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterState {
    pub cluster_id: u32,
    pub size: u64,
    pub records_size: u64,
}

impl Encode for ClusterState {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        w.write_u32::<BigEndian>(self.cluster_id)?;
        let mut n = 4;
        n += encode_u64(&mut w, self.size)?;
        n += encode_u64(&mut w, self.records_size)?;
        Ok(n)
    }
}

impl Decode for ClusterState {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        Ok(Self {
            cluster_id: r.read_u32::<BigEndian>()?,
            size: r.read_u64::<BigEndian>()?,
            records_size: r.read_u64::<BigEndian>()?,
        })
    }
}
