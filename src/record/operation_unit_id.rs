use std::fmt;
use std::io;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::OnceLock;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

/// Groups all records of one atomic operation. The operation is open between
/// its start and end record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationUnitId(pub u64);

impl OperationUnitId {
    /// Returns an id not returned before by this process.
    ///
    /// Ids are seeded with the wall clock at first use so that a restarted
    /// process does not reuse the ids found in the log.
    pub fn generate() -> Self {
        static SEED: OnceLock<u64> = OnceLock::new();
        static NEXT: AtomicU64 = AtomicU64::new(0);

        let seed = *SEED.get_or_init(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default()
        });

        Self(seed.wrapping_add(NEXT.fetch_add(1, Ordering::Relaxed)))
    }
}

impl fmt::Display for OperationUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{:016x}", self.0)
    }
}

impl codeq::Encode for OperationUnitId {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        w.write_u64::<BigEndian>(self.0)?;
        Ok(8)
    }
}

impl codeq::Decode for OperationUnitId {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        Ok(Self(r.read_u64::<BigEndian>()?))
    }
}
