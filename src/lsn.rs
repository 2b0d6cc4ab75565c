use std::fmt;
use std::io;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

use crate::num::format_pad9_u64;

/// Address of a record in the log: the segment `order` and the byte position
/// of the record's first chunk in that segment file.
///
/// Ordered by segment then position.
#[derive(Debug, Clone, Copy, Default)]
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogSequenceNumber {
    segment: u64,
    position: u64,
}

impl LogSequenceNumber {
    pub const BEGIN: LogSequenceNumber = LogSequenceNumber::new(0, 0);

    /// Size of the encoded form: segment and position as big-endian u64.
    pub const ENCODED_SIZE: usize = 16;

    pub const fn new(segment: u64, position: u64) -> Self {
        Self { segment, position }
    }

    pub fn segment(&self) -> u64 {
        self.segment
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn to_bytes(self) -> [u8; Self::ENCODED_SIZE] {
        let mut b = [0u8; Self::ENCODED_SIZE];
        b[..8].copy_from_slice(&self.segment.to_be_bytes());
        b[8..].copy_from_slice(&self.position.to_be_bytes());
        b
    }
}

impl fmt::Display for LogSequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LSN({}, {})", self.segment, format_pad9_u64(self.position))
    }
}

impl codeq::Encode for LogSequenceNumber {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        w.write_u64::<BigEndian>(self.segment)?;
        w.write_u64::<BigEndian>(self.position)?;
        Ok(Self::ENCODED_SIZE)
    }
}

impl codeq::Decode for LogSequenceNumber {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        let segment = r.read_u64::<BigEndian>()?;
        let position = r.read_u64::<BigEndian>()?;
        Ok(Self::new(segment, position))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use codeq::Decode;
    use codeq::Encode;

    use super::LogSequenceNumber as Lsn;

    #[test]
    fn test_lsn_order() {
        assert!(Lsn::BEGIN < Lsn::new(0, 1));
        assert!(Lsn::new(0, 1_000_000) < Lsn::new(1, 0));
        assert!(Lsn::new(2, 5) > Lsn::new(2, 4));
        assert_eq!(Lsn::new(2, 5), Lsn::new(2, 5));
        assert_eq!(Lsn::default(), Lsn::BEGIN);

        let mut v = vec![Lsn::new(1, 9), Lsn::new(0, 30), Lsn::new(1, 2)];
        v.sort();
        assert_eq!(v, vec![Lsn::new(0, 30), Lsn::new(1, 2), Lsn::new(1, 9)]);
    }

    #[test]
    fn test_lsn_codec() -> Result<(), io::Error> {
        let lsn = Lsn::new(3, 0x0102);

        let mut buf = Vec::new();
        let n = lsn.encode(&mut buf)?;
        assert_eq!(n, 16);
        assert_eq!(buf, vec![
            0, 0, 0, 0, 0, 0, 0, 3, //
            0, 0, 0, 0, 0, 0, 1, 2, //
        ]);
        assert_eq!(buf, lsn.to_bytes().to_vec());

        let got = Lsn::decode(&buf[..])?;
        assert_eq!(got, lsn);

        Ok(())
    }

    #[test]
    fn test_lsn_display() {
        assert_eq!(Lsn::new(3, 1024).to_string(), "LSN(3, 000_001_024)");
    }
}
