//! Field codecs shared by the record payloads. All integers are big-endian;
//! variable length fields are prefixed with a `u32` length.

use std::collections::BTreeMap;
use std::io;
use std::io::Read;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;
use codeq::Decode;
use codeq::Encode;

use crate::LogSequenceNumber;

pub(crate) fn encode_u64<W: io::Write>(
    mut w: W,
    v: u64,
) -> Result<usize, io::Error> {
    w.write_u64::<BigEndian>(v)?;
    Ok(8)
}

pub(crate) fn encode_bool<W: io::Write>(
    mut w: W,
    v: bool,
) -> Result<usize, io::Error> {
    w.write_u8(v as u8)?;
    Ok(1)
}

pub(crate) fn decode_bool<R: io::Read>(mut r: R) -> Result<bool, io::Error> {
    match r.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        x => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid bool byte: {}", x),
        )),
    }
}

pub(crate) fn encode_bytes<W: io::Write>(
    mut w: W,
    b: &[u8],
) -> Result<usize, io::Error> {
    w.write_u32::<BigEndian>(b.len() as u32)?;
    w.write_all(b)?;
    Ok(4 + b.len())
}

pub(crate) fn decode_bytes<R: io::Read>(mut r: R) -> Result<Vec<u8>, io::Error> {
    let len = r.read_u32::<BigEndian>()? as usize;

    // Do not trust the length before the checksum is verified: read what is
    // there instead of allocating `len` upfront.
    let mut buf = Vec::new();
    (&mut r).take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expect {} bytes, got {}", len, buf.len()),
        ));
    }
    Ok(buf)
}

pub(crate) fn encode_string<W: io::Write>(
    w: W,
    s: &str,
) -> Result<usize, io::Error> {
    encode_bytes(w, s.as_bytes())
}

pub(crate) fn decode_string<R: io::Read>(r: R) -> Result<String, io::Error> {
    let b = decode_bytes(r)?;
    String::from_utf8(b).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub(crate) fn encode_option_bytes<W: io::Write>(
    mut w: W,
    b: Option<&[u8]>,
) -> Result<usize, io::Error> {
    match b {
        None => encode_bool(&mut w, false),
        Some(b) => Ok(encode_bool(&mut w, true)? + encode_bytes(&mut w, b)?),
    }
}

pub(crate) fn decode_option_bytes<R: io::Read>(
    mut r: R,
) -> Result<Option<Vec<u8>>, io::Error> {
    if decode_bool(&mut r)? {
        Ok(Some(decode_bytes(&mut r)?))
    } else {
        Ok(None)
    }
}

pub(crate) fn encode_option_lsn<W: io::Write>(
    mut w: W,
    lsn: Option<LogSequenceNumber>,
) -> Result<usize, io::Error> {
    match lsn {
        None => encode_bool(&mut w, false),
        Some(lsn) => Ok(encode_bool(&mut w, true)? + lsn.encode(&mut w)?),
    }
}

pub(crate) fn decode_option_lsn<R: io::Read>(
    mut r: R,
) -> Result<Option<LogSequenceNumber>, io::Error> {
    if decode_bool(&mut r)? {
        Ok(Some(LogSequenceNumber::decode(&mut r)?))
    } else {
        Ok(None)
    }
}

pub(crate) fn encode_metadata<W: io::Write>(
    mut w: W,
    metadata: &BTreeMap<String, Vec<u8>>,
) -> Result<usize, io::Error> {
    w.write_u32::<BigEndian>(metadata.len() as u32)?;
    let mut n = 4;
    for (k, v) in metadata {
        n += encode_string(&mut w, k)?;
        n += encode_bytes(&mut w, v)?;
    }
    Ok(n)
}

pub(crate) fn decode_metadata<R: io::Read>(
    mut r: R,
) -> Result<BTreeMap<String, Vec<u8>>, io::Error> {
    let count = r.read_u32::<BigEndian>()?;
    let mut metadata = BTreeMap::new();
    for _ in 0..count {
        let k = decode_string(&mut r)?;
        let v = decode_bytes(&mut r)?;
        metadata.insert(k, v);
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io;

    use super::*;

    #[test]
    fn test_bytes_codec() -> Result<(), io::Error> {
        let mut buf = Vec::new();
        let n = encode_bytes(&mut buf, b"ab")?;
        assert_eq!(n, 6);
        assert_eq!(buf, vec![0, 0, 0, 2, b'a', b'b']);
        assert_eq!(decode_bytes(&buf[..])?, b"ab".to_vec());

        // Length exceeds the available bytes
        let err = decode_bytes(&[0u8, 0, 0, 9, 1][..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        Ok(())
    }

    #[test]
    fn test_bool_codec() -> Result<(), io::Error> {
        assert!(decode_bool(&[1u8][..])?);
        assert!(!decode_bool(&[0u8][..])?);
        assert_eq!(
            decode_bool(&[2u8][..]).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
        Ok(())
    }

    #[test]
    fn test_metadata_codec() -> Result<(), io::Error> {
        let mut m = BTreeMap::new();
        m.insert("k".to_string(), vec![9u8]);

        let mut buf = Vec::new();
        let n = encode_metadata(&mut buf, &m)?;
        assert_eq!(n, buf.len());
        assert_eq!(buf, vec![
            0, 0, 0, 1, // count
            0, 0, 0, 1, b'k', // key
            0, 0, 0, 1, 9, // value
        ]);
        assert_eq!(decode_metadata(&buf[..])?, m);
        Ok(())
    }
}
