use bitflags::bitflags;
use bytes_io::ByteStream;

use crate::error::{Error, Result};

const MAGIC: [u8; 2] = [0x1F, 0x8B];
const METHOD_DEFLATE: u32 = 8;

bitflags! {
    pub struct Flags: u8 {
        const FTEXT = 0x01;
        const FHCRC = 0x02;
        const FEXTRA = 0x04;
        const FNAME = 0x08;
        const FCOMMENT = 0x10;
    }
}

#[derive(Debug, Clone, Default)]
pub struct GzipHeader {
    pub filename: Option<String>,
    pub comment: Option<String>,
    /// Raw FEXTRA bytes (RFC 1952 §2.3.1.1), surfaced rather than just
    /// skipped so callers can recover application-specific extra fields.
    pub extra_field: Option<Vec<u8>>,
}

impl GzipHeader {
    pub fn parse(stream: &mut ByteStream) -> Result<Self> {
        let magic = stream.read_bytes(2)?;
        if magic != MAGIC {
            return Err(Error::Structural(format!("bad gzip magic {magic:02x?}")));
        }

        let method = stream.read_number(1)?;
        if method != METHOD_DEFLATE {
            return Err(Error::Structural(format!("unsupported gzip compression method {method}, only DEFLATE (8) is supported")));
        }

        let flags = Flags::from_bits_truncate(stream.read_number(1)? as u8);

        stream.skip(4)?; // mtime
        stream.skip(1)?; // xfl
        stream.skip(1)?; // os

        let extra_field = if flags.contains(Flags::FEXTRA) {
            let xlen = stream.read_number(2)? as usize;
            Some(stream.read_bytes(xlen)?)
        } else {
            None
        };

        let filename = if flags.contains(Flags::FNAME) { Some(stream.read_cstring()?) } else { None };
        let comment = if flags.contains(Flags::FCOMMENT) { Some(stream.read_cstring()?) } else { None };

        if flags.contains(Flags::FHCRC) {
            stream.skip(2)?;
        }

        Ok(Self { filename, comment, extra_field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_header(flags: Flags, filename: Option<&str>) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.push(8);
        buf.push(flags.bits());
        buf.extend_from_slice(&[0, 0, 0, 0]); // mtime
        buf.push(0); // xfl
        buf.push(0xFF); // os: unknown
        if let Some(name) = filename {
            buf.extend_from_slice(name.as_bytes());
            buf.push(0);
        }
        buf
    }

    #[test]
    fn parses_header_with_filename() {
        let bytes = minimal_header(Flags::FNAME, Some("readme.txt"));
        let mut stream = ByteStream::new(bytes);

        let header = GzipHeader::parse(&mut stream).unwrap();
        assert_eq!(header.filename.as_deref(), Some("readme.txt"));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut stream = ByteStream::new(vec![0x00, 0x00, 8, 0, 0, 0, 0, 0, 0, 0]);
        assert!(GzipHeader::parse(&mut stream).is_err());
    }

    #[test]
    fn rejects_unsupported_method() {
        let mut buf = MAGIC.to_vec();
        buf.push(9); // not DEFLATE
        buf.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0]);
        let mut stream = ByteStream::new(buf);
        assert!(GzipHeader::parse(&mut stream).is_err());
    }
}
