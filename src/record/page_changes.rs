use std::io;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

use crate::record::codec::decode_bytes;
use crate::record::codec::encode_bytes;

/// Replace the bytes of a page starting at `offset` with `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChange {
    pub offset: u32,
    pub data: Vec<u8>,
}

/// Byte-range diffs of one page, applied in order during redo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageChanges {
    changes: Vec<PageChange>,
}

impl PageChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, offset: u32, data: impl Into<Vec<u8>>) {
        self.changes.push(PageChange {
            offset,
            data: data.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageChange> {
        self.changes.iter()
    }

    /// Replay the changes onto a page image.
    ///
    /// Nothing is written if any change does not fit in `page`.
    pub fn apply_to(&self, page: &mut [u8]) -> Result<(), io::Error> {
        for c in &self.changes {
            let end = c.offset as usize + c.data.len();
            if end > page.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "page change [{}, {}) exceeds page size {}",
                        c.offset,
                        end,
                        page.len()
                    ),
                ));
            }
        }

        for c in &self.changes {
            let start = c.offset as usize;
            page[start..start + c.data.len()].copy_from_slice(&c.data);
        }
        Ok(())
    }
}

impl FromIterator<(u32, Vec<u8>)> for PageChanges {
    fn from_iter<I: IntoIterator<Item = (u32, Vec<u8>)>>(iter: I) -> Self {
        Self {
            changes: iter
                .into_iter()
                .map(|(offset, data)| PageChange { offset, data })
                .collect(),
        }
    }
}

impl codeq::Encode for PageChanges {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        w.write_u32::<BigEndian>(self.changes.len() as u32)?;
        let mut n = 4;
        for c in &self.changes {
            w.write_u32::<BigEndian>(c.offset)?;
            n += 4;
            n += encode_bytes(&mut w, &c.data)?;
        }
        Ok(n)
    }
}

impl codeq::Decode for PageChanges {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        let count = r.read_u32::<BigEndian>()?;
        let mut changes = Vec::new();
        for _ in 0..count {
            let offset = r.read_u32::<BigEndian>()?;
            let data = decode_bytes(&mut r)?;
            changes.push(PageChange { offset, data });
        }
        Ok(Self { changes })
    }
}
