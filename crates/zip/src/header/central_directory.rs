use bytes_io::ByteStream;

use crate::error::{Error, Result};
use crate::header::local_file::CENTRAL_DIR_SIG;

pub(crate) const END_OF_CENTRAL_DIR_SIG: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

/// One entry from the central directory (APPNOTE §4.3.12). The decoder
/// only reads through these during the postlude; the per-file data
/// already came from the local-file loop.
#[derive(Debug, Clone)]
pub struct CentralDirectoryEntry {
    pub filename: String,
    pub comment: String,
}

impl CentralDirectoryEntry {
    pub fn parse(stream: &mut ByteStream) -> Result<Self> {
        let sig = stream.read_bytes(4)?;
        if sig != CENTRAL_DIR_SIG {
            return Err(Error::Structural(format!("expected central directory signature, got {sig:02x?}")));
        }

        stream.skip(2)?; // version made by
        stream.skip(2)?; // version needed
        stream.skip(2)?; // gp flag
        stream.skip(2)?; // compression method
        stream.skip(2)?; // last mod time
        stream.skip(2)?; // last mod date
        stream.skip(4)?; // crc-32
        stream.skip(4)?; // compressed size
        stream.skip(4)?; // uncompressed size
        let filename_len = stream.read_number(2)? as usize;
        let extra_len = stream.read_number(2)? as usize;
        let comment_len = stream.read_number(2)? as usize;
        stream.skip(2)?; // disk number start
        stream.skip(2)?; // internal attrs
        stream.skip(4)?; // external attrs
        stream.skip(4)?; // relative offset of local header

        let filename = String::from_utf8(stream.read_bytes(filename_len)?)?;
        stream.skip(extra_len)?;
        let comment = String::from_utf8(stream.read_bytes(comment_len)?)?;

        Ok(Self { filename, comment })
    }
}

/// The end-of-central-directory record (APPNOTE §4.3.16). The only field
/// the decoder's `finish` event needs is the archive comment.
#[derive(Debug, Clone, Default)]
pub struct EndOfCentralDirectory {
    pub total_entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub comment: String,
}

impl EndOfCentralDirectory {
    /// A minimal well-formed record for an empty, commentless archive tail.
    #[cfg(test)]
    pub fn default_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&END_OF_CENTRAL_DIR_SIG);
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf
    }

    pub fn parse(stream: &mut ByteStream) -> Result<Self> {
        let sig = stream.read_bytes(4)?;
        if sig != END_OF_CENTRAL_DIR_SIG {
            return Err(Error::Structural(format!("expected end-of-central-directory signature, got {sig:02x?}")));
        }

        stream.skip(2)?; // disk number
        stream.skip(2)?; // disk where central directory starts
        stream.skip(2)?; // record count on this disk
        let total_entries = stream.read_number(2)? as u16;
        let central_directory_size = stream.read_number(4)?;
        let central_directory_offset = stream.read_number(4)?;
        let comment_len = stream.read_number(2)? as usize;
        let comment = String::from_utf8(stream.read_bytes(comment_len)?)?;

        Ok(Self { total_entries, central_directory_size, central_directory_offset, comment })
    }
}
