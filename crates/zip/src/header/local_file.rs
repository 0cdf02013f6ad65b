use bytes_io::ByteStream;

use crate::error::{Error, Result};

pub(crate) const LOCAL_FILE_SIG: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
pub(crate) const CENTRAL_DIR_SIG: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];
pub(crate) const ARCHIVE_EXTRA_DATA_SIG: [u8; 4] = [0x50, 0x4B, 0x06, 0x08];
pub(crate) const DATA_DESCRIPTOR_SIG: [u8; 4] = [0x50, 0x4B, 0x07, 0x08];

const NEXT_RECORD_SIGNATURES: [[u8; 4]; 3] = [LOCAL_FILE_SIG, ARCHIVE_EXTRA_DATA_SIG, CENTRAL_DIR_SIG];

/// Fields read straight off a local file header (APPNOTE §4.3.7), plus
/// whatever the data-descriptor recovery (if any) supplied afterward.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub gp_flag: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub filename: String,
    pub extra_field: Vec<u8>,
}

impl LocalFileHeader {
    pub fn has_data_descriptor(&self) -> bool {
        self.gp_flag & 0x0008 != 0
    }

    pub fn parse(stream: &mut ByteStream) -> Result<Self> {
        let sig = stream.read_bytes(4)?;
        if sig != LOCAL_FILE_SIG {
            return Err(Error::Structural(format!("expected local file header signature, got {sig:02x?}")));
        }

        let version_needed = stream.read_number(2)? as u16;
        let gp_flag = stream.read_number(2)? as u16;
        let compression_method = stream.read_number(2)? as u16;
        let last_mod_time = stream.read_number(2)? as u16;
        let last_mod_date = stream.read_number(2)? as u16;
        let crc32 = stream.read_number(4)?;
        let compressed_size = stream.read_number(4)?;
        let uncompressed_size = stream.read_number(4)?;
        let filename_len = stream.read_number(2)? as usize;
        let extra_len = stream.read_number(2)? as usize;

        let filename = String::from_utf8(stream.read_bytes(filename_len)?)?;
        let extra_field = stream.read_bytes(extra_len)?;

        Ok(Self {
            version_needed,
            gp_flag,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            filename,
            extra_field,
        })
    }
}

/// Recovered trailer for a local file whose header sets general-purpose
/// flag bit 3 (sizes unknown at header-write time).
#[derive(Debug)]
pub(crate) struct RecoveredDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub payload: Vec<u8>,
}

/// Scans forward from the stream's current position for the next local
/// file, archive-extra-data, or central-directory signature, then
/// inspects the 12 or 16 bytes immediately preceding it to recover the
/// true CRC and sizes (APPNOTE §4.3.9).
pub(crate) fn recover_data_descriptor(stream: &mut ByteStream) -> Result<RecoveredDescriptor> {
    let scanned = scan_forward(stream, &NEXT_RECORD_SIGNATURES)?;

    let (descriptor_len, tail) = if scanned >= 16 {
        let candidate = stream.peek_bytes(scanned)?;
        let tail16 = &candidate[scanned - 16..];

        if tail16[0..4] == DATA_DESCRIPTOR_SIG {
            let compressed_size = u32::from_le_bytes(tail16[8..12].try_into().unwrap());
            if compressed_size as usize == scanned - 16 {
                (16usize, tail16.to_vec())
            } else {
                recover_unsigned(&candidate, scanned)?
            }
        } else {
            recover_unsigned(&candidate, scanned)?
        }
    } else {
        let candidate = stream.peek_bytes(scanned)?;
        recover_unsigned(&candidate, scanned)?
    };

    let payload_len = scanned - descriptor_len;
    let payload = stream.read_bytes(payload_len)?;
    stream.skip(descriptor_len)?;

    let (crc_off, size_off) = if descriptor_len == 16 { (4, 8) } else { (0, 4) };

    Ok(RecoveredDescriptor {
        crc32: u32::from_le_bytes(tail[crc_off..crc_off + 4].try_into().unwrap()),
        compressed_size: u32::from_le_bytes(tail[size_off..size_off + 4].try_into().unwrap()),
        uncompressed_size: u32::from_le_bytes(tail[size_off + 4..size_off + 8].try_into().unwrap()),
        payload,
    })
}

fn recover_unsigned(candidate: &[u8], scanned: usize) -> Result<(usize, Vec<u8>)> {
    if scanned < 12 {
        return Err(Error::Structural("data descriptor recovery found a record too close to start".into()));
    }

    let tail12 = &candidate[scanned - 12..];
    let compressed_size = u32::from_le_bytes(tail12[4..8].try_into().unwrap());

    if compressed_size as usize != scanned - 12 {
        return Err(Error::Structural("data descriptor recovery: compressed size does not match scanned distance".into()));
    }

    Ok((12, tail12.to_vec()))
}

/// Finds the offset (from the stream's current cursor) of the first
/// 4-byte window matching one of `needles`. Returns a stream overrun if
/// the buffered bytes run out before a match is found, so the archive
/// decoder can retry once more input is pushed.
fn scan_forward(stream: &ByteStream, needles: &[[u8; 4]]) -> Result<usize> {
    let remaining = stream.bytes_remaining();

    if remaining < 4 {
        return Err(bytes_io::Error::Overrun { needed: 4 - remaining }.into());
    }

    for start in 0..=remaining - 4 {
        let window = [
            stream.peek_byte(start).expect("within remaining"),
            stream.peek_byte(start + 1).expect("within remaining"),
            stream.peek_byte(start + 2).expect("within remaining"),
            stream.peek_byte(start + 3).expect("within remaining"),
        ];

        if needles.contains(&window) {
            return Ok(start);
        }
    }

    Err(bytes_io::Error::Overrun { needed: 1 }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_le_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn push_le_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn parses_local_file_header() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&LOCAL_FILE_SIG);
        push_le_u16(&mut buf, 20); // version needed
        push_le_u16(&mut buf, 0); // gp flag
        push_le_u16(&mut buf, 0); // method: store
        push_le_u16(&mut buf, 0); // mod time
        push_le_u16(&mut buf, 0); // mod date
        push_le_u32(&mut buf, 0xDEADBEEF); // crc
        push_le_u32(&mut buf, 5); // compressed size
        push_le_u32(&mut buf, 5); // uncompressed size
        push_le_u16(&mut buf, 5); // filename len
        push_le_u16(&mut buf, 0); // extra len
        buf.extend_from_slice(b"a.txt");

        let mut stream = ByteStream::new(buf);
        let header = LocalFileHeader::parse(&mut stream).unwrap();

        assert_eq!(header.filename, "a.txt");
        assert_eq!(header.compressed_size, 5);
        assert!(!header.has_data_descriptor());
    }

    #[test]
    fn data_descriptor_flag_bit() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&LOCAL_FILE_SIG);
        push_le_u16(&mut buf, 20);
        push_le_u16(&mut buf, 0x0008);
        push_le_u16(&mut buf, 0);
        push_le_u16(&mut buf, 0);
        push_le_u16(&mut buf, 0);
        push_le_u32(&mut buf, 0);
        push_le_u32(&mut buf, 0);
        push_le_u32(&mut buf, 0);
        push_le_u16(&mut buf, 1);
        push_le_u16(&mut buf, 0);
        buf.push(b'x');

        let mut stream = ByteStream::new(buf);
        let header = LocalFileHeader::parse(&mut stream).unwrap();
        assert!(header.has_data_descriptor());
    }

    #[test]
    fn recovers_16_byte_signed_descriptor() {
        let payload = b"XYXYXYX".to_vec();
        let mut trailer = Vec::new();
        trailer.extend_from_slice(&DATA_DESCRIPTOR_SIG);
        push_le_u32(&mut trailer, 0xCAFEBABEu32);
        push_le_u32(&mut trailer, payload.len() as u32);
        push_le_u32(&mut trailer, payload.len() as u32);

        let mut buf = payload.clone();
        buf.extend_from_slice(&trailer);
        buf.extend_from_slice(&CENTRAL_DIR_SIG);

        let mut stream = ByteStream::new(buf);
        let recovered = recover_data_descriptor(&mut stream).unwrap();

        assert_eq!(recovered.payload, payload);
        assert_eq!(recovered.crc32, 0xCAFEBABE);
        assert_eq!(recovered.compressed_size as usize, payload.len());

        assert_eq!(stream.peek_bytes(4).unwrap(), CENTRAL_DIR_SIG);
    }

    #[test]
    fn recovers_12_byte_unsigned_descriptor() {
        let payload = b"hello world".to_vec();
        let mut trailer = Vec::new();
        push_le_u32(&mut trailer, 0x11223344u32);
        push_le_u32(&mut trailer, payload.len() as u32);
        push_le_u32(&mut trailer, payload.len() as u32);

        let mut buf = payload.clone();
        buf.extend_from_slice(&trailer);
        buf.extend_from_slice(&LOCAL_FILE_SIG);

        let mut stream = ByteStream::new(buf);
        let recovered = recover_data_descriptor(&mut stream).unwrap();

        assert_eq!(recovered.payload, payload);
        assert_eq!(recovered.crc32, 0x11223344);
    }

    #[test]
    fn scan_forward_signals_overrun_when_no_match_buffered() {
        let mut stream = ByteStream::new(b"not a signature here".to_vec());
        let err = recover_data_descriptor(&mut stream).unwrap_err();
        assert!(err.is_overrun());
    }
}
