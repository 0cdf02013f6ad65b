use archive_events::{CompressEvent, EncodeEventSink, EncodeFinishEvent};
use bytes_io::ByteBuffer;
use tracing::debug;

use crate::compression::CompressionMethod;
use crate::error::{Error, Result};

const LOCAL_FILE_SIG: u32 = 0x0403_4B50;
const CENTRAL_DIR_SIG: u32 = 0x0201_4B50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4B50;

const LOCAL_HEADER_FIXED_LEN: u32 = 30;
const CENTRAL_HEADER_FIXED_LEN: u32 = 46;
const END_OF_CENTRAL_DIR_LEN: u32 = 22;

fn dos_date_time(last_mod_time_ms: i64) -> (u16, u16) {
    // Epoch-seconds arithmetic good enough to place a file in the DOS
    // date/time range; timezone is treated as UTC, matching the source's
    // behavior of deriving these fields straight from `Date`.
    let total_seconds = (last_mod_time_ms / 1000).max(0);
    let days = total_seconds / 86_400;
    let seconds_of_day = total_seconds % 86_400;

    let hour = seconds_of_day / 3600;
    let minute = (seconds_of_day % 3600) / 60;
    let second = seconds_of_day % 60;
    let dos_time = ((hour as u16) << 11) | ((minute as u16) << 5) | ((second / 2) as u16);

    // Civil-from-days (Howard Hinnant's algorithm), days since 1970-01-01.
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u16;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u16;
    let year = (if month <= 2 { y + 1 } else { y }) as i64;

    let dos_year = ((year - 1980).max(0) as u16) << 9;
    let dos_date = dos_year | (month << 5) | day;

    (dos_date, dos_time)
}

struct PendingEntry {
    filename: String,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    local_header_offset: u32,
    dos_date: u16,
    dos_time: u16,
}

/// Accepts `(filename, last_mod_time_ms, bytes)` triples one at a time and
/// produces a well-formed ZIP archive in chunks (§4.I). The compression
/// method is fixed at construction and applies to every file.
pub struct ZipEncoder {
    method: CompressionMethod,
    events: EncodeEventSink,
    offset: u32,
    entries: Vec<PendingEntry>,
}

impl ZipEncoder {
    pub fn new(method: CompressionMethod, events: EncodeEventSink) -> Self {
        Self { method, events, offset: 0, entries: Vec::new() }
    }

    /// Encodes one file's local header and payload, emitting a `compress`
    /// event with the bytes written, and returns those bytes so the
    /// caller can append them to the running output.
    pub fn add_file(&mut self, filename: &str, last_mod_time_ms: i64, bytes: &[u8]) -> Result<Vec<u8>> {
        let crc32 = crc32_checksum::crc32(bytes);
        let (dos_date, dos_time) = dos_date_time(last_mod_time_ms);

        let compressed = match self.method {
            CompressionMethod::Store => bytes.to_vec(),
            CompressionMethod::Deflate => {
                return Err(Error::Structural("DEFLATE-compressed ZIP encoding requires a host-provided raw-DEFLATE encoder, which this build does not have".into()))
            }
        };

        let mut out = ByteBuffer::new(LOCAL_HEADER_FIXED_LEN as usize + filename.len() + compressed.len());
        out.write_number(LOCAL_FILE_SIG, 4)?;
        out.write_number(20, 2)?; // version needed
        out.write_number(0, 2)?; // gp flag: no data descriptor, comment in header
        out.write_number(u16::from(self.method) as u32, 2)?;
        out.write_number(dos_time as u32, 2)?;
        out.write_number(dos_date as u32, 2)?;
        out.write_number(crc32, 4)?;
        out.write_number(compressed.len() as u32, 4)?;
        out.write_number(bytes.len() as u32, 4)?;
        out.write_number(filename.len() as u32, 2)?;
        out.write_number(0, 2)?; // extra field length
        out.insert_bytes(filename.as_bytes())?;
        out.insert_bytes(&compressed)?;

        let local_header_offset = self.offset;
        self.offset += out.len() as u32;

        self.entries.push(PendingEntry {
            filename: filename.to_string(),
            crc32,
            compressed_size: compressed.len() as u32,
            uncompressed_size: bytes.len() as u32,
            local_header_offset,
            dos_date,
            dos_time,
        });

        let chunk = out.get_data();
        self.events.emit_compress(CompressEvent { filename: filename.to_string(), chunk: chunk.clone() });

        debug!(filename, len = chunk.len(), "zip: wrote local file entry");

        Ok(chunk)
    }

    /// Writes the central directory and end-of-central-directory record;
    /// call once, after the last file has been added via `add_file`.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        let mut central_directory = Vec::new();

        for entry in &self.entries {
            let mut header = ByteBuffer::new(CENTRAL_HEADER_FIXED_LEN as usize + entry.filename.len());
            header.write_number(CENTRAL_DIR_SIG, 4)?;
            header.write_number(20, 2)?; // version made by
            header.write_number(20, 2)?; // version needed
            header.write_number(0, 2)?; // gp flag
            header.write_number(u16::from(self.method) as u32, 2)?;
            header.write_number(entry.dos_time as u32, 2)?;
            header.write_number(entry.dos_date as u32, 2)?;
            header.write_number(entry.crc32, 4)?;
            header.write_number(entry.compressed_size, 4)?;
            header.write_number(entry.uncompressed_size, 4)?;
            header.write_number(entry.filename.len() as u32, 2)?;
            header.write_number(0, 2)?; // extra field length
            header.write_number(0, 2)?; // comment length
            header.write_number(0, 2)?; // disk number start
            header.write_number(0, 2)?; // internal attrs
            header.write_number(0, 4)?; // external attrs
            header.write_number(entry.local_header_offset, 4)?;
            header.insert_bytes(entry.filename.as_bytes())?;

            central_directory.extend_from_slice(&header.get_data());
        }

        let central_directory_offset = self.offset;
        let central_directory_size = central_directory.len() as u32;

        let mut eocd = ByteBuffer::new(END_OF_CENTRAL_DIR_LEN as usize);
        eocd.write_number(END_OF_CENTRAL_DIR_SIG, 4)?;
        eocd.write_number(0, 2)?; // disk number
        eocd.write_number(0, 2)?; // disk where central directory starts
        eocd.write_number(self.entries.len() as u32, 2)?;
        eocd.write_number(self.entries.len() as u32, 2)?;
        eocd.write_number(central_directory_size, 4)?;
        eocd.write_number(central_directory_offset, 4)?;
        eocd.write_number(0, 2)?; // comment length

        let mut out = central_directory;
        out.extend_from_slice(&eocd.get_data());

        let total_bytes_written = self.offset as u64 + out.len() as u64;
        self.events.emit_finish(EncodeFinishEvent { total_bytes_written });

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_store_mode_three_files() {
        let files: Vec<(&str, i64, &[u8])> =
            vec![("a.txt", 1_700_000_000_000, b"alpha"), ("b.csv", 1_700_000_100_000, b"1,2,3"), ("c.json", 1_700_000_200_000, b"{}")];

        let mut encoder = ZipEncoder::new(CompressionMethod::Store, EncodeEventSink::new());
        let mut archive = Vec::new();

        for (name, t, bytes) in &files {
            archive.extend(encoder.add_file(name, *t, bytes).unwrap());
        }
        archive.extend(encoder.finish().unwrap());

        let extracted = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let extracted_clone = extracted.clone();

        let mut decoder = crate::UnzipDecoder::new(
            archive_events::DecodeEventSink::new()
                .on_extract(move |e: &archive_events::UnarchiveExtractEvent| extracted_clone.borrow_mut().push(e.file.clone())),
        );
        decoder.push(archive);

        let extracted = extracted.borrow();
        assert_eq!(extracted.len(), 3);
        for (i, (name, _, bytes)) in files.iter().enumerate() {
            assert_eq!(extracted[i].filename, *name);
            assert_eq!(extracted[i].file_data, *bytes);
        }
    }

    #[test]
    fn dos_date_time_roundtrips_to_a_plausible_range() {
        let (date, time) = dos_date_time(1_700_000_000_000);
        assert!(date > 0);
        let _ = time;
    }
}
