use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::FileExt;

use byteorder::BigEndian;
use byteorder::ByteOrder;
use codeq::error_context_ext::ErrorContextExt;
use log::info;
use log::warn;

use crate::LogSequenceNumber;

/// Size of one slot: `crc u32 | segment u64 | position u64`.
const SLOT_SIZE: usize = 4 + LogSequenceNumber::ENCODED_SIZE;

/// The persisted LSN of the last checkpoint, file `<storage_name>.wmr`.
///
/// The file holds two CRC-protected slots written alternately, so that a torn
/// write of one slot leaves the other one intact.
pub(crate) struct MasterRecord {
    path: String,
    f: File,
    slots: [Option<LogSequenceNumber>; 2],

    /// Slot to write next.
    next_slot: usize,
}

impl MasterRecord {
    /// Open or create the master record file and load both slots.
    ///
    /// A corrupt slot is rewritten from the other one.
    pub(crate) fn open(path: impl ToString) -> Result<Self, io::Error> {
        let path = path.to_string();

        let f = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .context(|| format!("open master record '{}'", path))?;

        let len = f.metadata()?.len() as usize;
        let mut buf = vec![0u8; len.min(SLOT_SIZE * 2)];
        f.read_exact_at(&mut buf, 0)
            .context(|| format!("read master record '{}'", path))?;

        let mut corrupt = [false; 2];
        let mut slots = [None; 2];
        for (i, slot) in slots.iter_mut().enumerate() {
            let start = i * SLOT_SIZE;
            let Some(bytes) = buf.get(start..start + SLOT_SIZE) else {
                continue;
            };
            match decode_slot(bytes) {
                Ok(lsn) => *slot = lsn,
                Err(reason) => {
                    warn!(
                        "Master record '{}' slot {} is corrupt: {}",
                        path, i, reason
                    );
                    corrupt[i] = true;
                }
            }
        }

        let next_slot = match (slots[0], slots[1]) {
            (Some(a), Some(b)) if b > a => 0,
            (Some(_), _) => 1,
            _ => 0,
        };

        let mut mr = Self {
            path,
            f,
            slots,
            next_slot,
        };

        for i in 0..2 {
            if corrupt[i] {
                let other = mr.slots[1 - i];
                mr.write_slot(i, other)?;
                info!(
                    "Master record '{}' slot {} rewritten: {:?}",
                    mr.path, i, other
                );
            }
        }
        if corrupt.iter().any(|x| *x) {
            mr.f.sync_data()?;
        }

        Ok(mr)
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    /// The LSN of the last checkpoint: the greater of the valid slots.
    pub(crate) fn get(&self) -> Option<LogSequenceNumber> {
        self.slots[0].max(self.slots[1])
    }

    /// Write `lsn` into the slot not holding the current value.
    pub(crate) fn write(&mut self, lsn: LogSequenceNumber) -> Result<(), io::Error> {
        let i = self.next_slot;
        self.write_slot(i, Some(lsn))?;
        self.f
            .sync_data()
            .context(|| format!("sync master record '{}'", self.path))?;
        self.next_slot = 1 - i;
        Ok(())
    }

    /// Drop slots whose LSN is no longer in the log, as told by `exists`.
    ///
    /// The surviving slot is copied into both; if none survives the file is
    /// emptied.
    pub(crate) fn fix(
        &mut self,
        exists: impl Fn(LogSequenceNumber) -> bool,
    ) -> Result<(), io::Error> {
        let valid = self.slots.map(|s| s.filter(|lsn| exists(*lsn)));
        if valid == self.slots {
            return Ok(());
        }

        match valid[0].max(valid[1]) {
            Some(lsn) => {
                self.write_slot(0, Some(lsn))?;
                self.write_slot(1, Some(lsn))?;
                self.next_slot = 0;
            }
            None => {
                self.f.set_len(0)?;
                self.slots = [None; 2];
                self.next_slot = 0;
            }
        }

        self.f
            .sync_data()
            .context(|| format!("sync master record '{}'", self.path))?;

        info!("Master record '{}' fixed: {:?}", self.path, self.get());
        Ok(())
    }

    fn write_slot(
        &mut self,
        i: usize,
        lsn: Option<LogSequenceNumber>,
    ) -> Result<(), io::Error> {
        let bytes = match lsn {
            Some(lsn) => encode_slot(lsn),
            None => [0u8; SLOT_SIZE],
        };

        self.f
            .write_all_at(&bytes, (i * SLOT_SIZE) as u64)
            .context(|| format!("write master record '{}' slot {}", self.path, i))?;
        self.slots[i] = lsn;
        Ok(())
    }
}

fn encode_slot(lsn: LogSequenceNumber) -> [u8; SLOT_SIZE] {
    let mut buf = [0u8; SLOT_SIZE];
    let lsn_bytes = lsn.to_bytes();
    BigEndian::write_u32(&mut buf[..4], crc32fast::hash(&lsn_bytes));
    buf[4..].copy_from_slice(&lsn_bytes);
    buf
}

/// An all-zero slot is empty.
fn decode_slot(buf: &[u8]) -> Result<Option<LogSequenceNumber>, String> {
    if buf.iter().all(|b| *b == 0) {
        return Ok(None);
    }

    let stored = BigEndian::read_u32(&buf[..4]);
    let actual = crc32fast::hash(&buf[4..]);
    if stored != actual {
        return Err(format!(
            "checksum mismatch: stored {:08x}, actual {:08x}",
            stored, actual
        ));
    }

    let segment = BigEndian::read_u64(&buf[4..12]);
    let position = BigEndian::read_u64(&buf[12..20]);
    Ok(Some(LogSequenceNumber::new(segment, position)))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io;
    use std::os::unix::fs::FileExt;

    use super::MasterRecord;
    use super::SLOT_SIZE;
    use crate::LogSequenceNumber as Lsn;

    #[test]
    fn test_master_record_alternate_slots() -> Result<(), io::Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("x.wmr").to_str().unwrap().to_string();

        {
            let mut mr = MasterRecord::open(&path)?;
            assert_eq!(mr.get(), None);

            mr.write(Lsn::new(0, 28))?;
            mr.write(Lsn::new(1, 100))?;
            assert_eq!(mr.get(), Some(Lsn::new(1, 100)));
            assert_eq!(mr.slots, [Some(Lsn::new(0, 28)), Some(Lsn::new(1, 100))]);
        }

        assert_eq!(fs::metadata(&path)?.len(), (SLOT_SIZE * 2) as u64);

        {
            let mut mr = MasterRecord::open(&path)?;
            assert_eq!(mr.get(), Some(Lsn::new(1, 100)));

            // The older slot is overwritten.
            mr.write(Lsn::new(2, 28))?;
            assert_eq!(mr.slots, [Some(Lsn::new(2, 28)), Some(Lsn::new(1, 100))]);
        }

        Ok(())
    }

    #[test]
    fn test_master_record_corrupt_slot() -> Result<(), io::Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("x.wmr").to_str().unwrap().to_string();

        {
            let mut mr = MasterRecord::open(&path)?;
            mr.write(Lsn::new(0, 28))?;
            mr.write(Lsn::new(0, 500))?;
        }

        // Damage the newer slot
        {
            let f = fs::OpenOptions::new().write(true).open(&path)?;
            f.write_all_at(&[0xff], (SLOT_SIZE + 10) as u64)?;
        }

        {
            let mr = MasterRecord::open(&path)?;
            assert_eq!(mr.get(), Some(Lsn::new(0, 28)));
            assert_eq!(mr.slots, [Some(Lsn::new(0, 28)), Some(Lsn::new(0, 28))]);
        }

        Ok(())
    }

    #[test]
    fn test_master_record_fix() -> Result<(), io::Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("x.wmr").to_str().unwrap().to_string();

        let mut mr = MasterRecord::open(&path)?;
        mr.write(Lsn::new(0, 28))?;
        mr.write(Lsn::new(2, 28))?;

        mr.fix(|lsn| lsn.segment() >= 1)?;
        assert_eq!(mr.slots, [Some(Lsn::new(2, 28)), Some(Lsn::new(2, 28))]);

        mr.fix(|lsn| lsn.segment() >= 3)?;
        assert_eq!(mr.get(), None);
        assert_eq!(fs::metadata(&path)?.len(), 0);

        let mr = MasterRecord::open(&path)?;
        assert_eq!(mr.get(), None);

        Ok(())
    }
}
