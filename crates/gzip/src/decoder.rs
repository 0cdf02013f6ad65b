use archive_events::{
    DecodeEventSink, DecoderState, UnarchivedFile, UnarchiveExtractEvent, UnarchiveFinishEvent, UnarchiveFinishMetadata,
    UnarchiveProgressEvent, UnarchiveStartEvent,
};
use bytes_io::ByteStream;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::header::GzipHeader;

const TRAILER_LEN: usize = 8;

/// GZIP (RFC 1952) has no internal record framing past its fixed header —
/// the compressed payload runs to end of stream — so unlike ZIP/TAR there
/// is no natural per-record suspension point mid-payload. The header is
/// still parsed incrementally (waiting if the caller pushed a short first
/// chunk); the payload is only decoded once the caller calls `finish()`
/// to signal that the whole member has been pushed.
pub struct GunzipDecoder {
    stream: ByteStream,
    state: DecoderState,
    events: DecodeEventSink,
    stopped: bool,
    header: Option<GzipHeader>,
}

impl GunzipDecoder {
    pub fn new(events: DecodeEventSink) -> Self {
        Self { stream: ByteStream::empty(), state: DecoderState::NotStarted, events, stopped: false, header: None }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn push(&mut self, data: Vec<u8>) {
        if self.stopped {
            return;
        }

        self.stream.push(data);
        self.try_parse_header();
    }

    fn try_parse_header(&mut self) {
        if self.header.is_some() || self.stopped || self.state == DecoderState::Finished {
            return;
        }

        if self.state == DecoderState::NotStarted {
            self.events.emit_start(UnarchiveStartEvent::default());
            self.state = DecoderState::Unarchiving;
            self.events.emit_progress(UnarchiveProgressEvent::default());
        }

        let checkpoint = self.stream.tee();

        match GzipHeader::parse(&mut self.stream) {
            Ok(header) => {
                debug!(filename = ?header.filename, "gunzip: header parsed");
                self.header = Some(header);
            }
            Err(e) if e.is_overrun() => {
                trace!("gunzip: header incomplete, waiting for more bytes");
                self.stream = checkpoint;
                self.state = DecoderState::Waiting;
            }
            Err(e) => {
                warn!(error = %e, "gunzip: structural error in header");
                self.events.emit_error(e.to_string());
                self.state = DecoderState::Finished;
                self.stopped = true;
            }
        }
    }

    /// Signals that all input has been pushed; decodes the payload and
    /// emits `extract` followed by `finish`.
    pub fn finish(&mut self) {
        if self.stopped || self.state == DecoderState::Finished {
            return;
        }

        if self.header.is_none() {
            self.try_parse_header();
        }

        match self.decode_payload() {
            Ok(file) => {
                self.events.emit_progress(UnarchiveProgressEvent {
                    current_filename: file.filename.clone(),
                    current_file_number: 1,
                    current_bytes_unarchived_in_file: file.file_data.len() as u64,
                    current_bytes_unarchived: file.file_data.len() as u64,
                    total_uncompressed_bytes_in_archive: file.file_data.len() as u64,
                    total_files_in_archive: 1,
                    total_compressed_bytes_read: self.stream.bytes_consumed(),
                });
                self.events.emit_extract(UnarchiveExtractEvent { file });
                self.state = DecoderState::Finished;

                let extra_field = self.header.as_ref().and_then(|h| h.extra_field.clone());
                self.events.emit_finish(UnarchiveFinishEvent {
                    metadata: UnarchiveFinishMetadata { comment: None, extra_field },
                });
            }
            Err(e) => {
                warn!(error = %e, "gunzip: failed to decode payload");
                self.events.emit_error(e.to_string());
                self.state = DecoderState::Finished;
                self.stopped = true;
            }
        }
    }

    fn decode_payload(&mut self) -> Result<UnarchivedFile> {
        let header = self.header.clone().ok_or_else(|| Error::Structural("gunzip: header never completed".into()))?;

        let remaining = self.stream.bytes_remaining();
        if remaining < TRAILER_LEN {
            return Err(bytes_io::Error::Overrun { needed: TRAILER_LEN - remaining }.into());
        }

        let compressed_len = remaining - TRAILER_LEN;
        let compressed = self.stream.read_bytes(compressed_len)?;
        let trailer = self.stream.read_bytes(TRAILER_LEN)?;

        let expected_crc = u32::from_le_bytes(trailer[0..4].try_into().unwrap());
        let expected_isize = u32::from_le_bytes(trailer[4..8].try_into().unwrap());

        let decompressed = inflate_rfc1951::inflate(&compressed, Some(expected_isize as usize))?;

        let actual_crc = crc32_checksum::crc32(&decompressed);
        if actual_crc != expected_crc {
            self.events.emit_info(format!(
                "gunzip: CRC-32 mismatch (expected {expected_crc:#010x}, got {actual_crc:#010x})"
            ));
        }

        Ok(UnarchivedFile { filename: header.filename.unwrap_or_default(), file_data: decompressed, info: header.comment })
    }
}

impl Default for GunzipDecoder {
    fn default() -> Self {
        Self::new(DecodeEventSink::new())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// A fixed-Huffman DEFLATE block, hand-assembled the same way
    /// inflate-rfc1951's own tests build fixed blocks: MSB-first per
    /// Huffman code, regardless of the buffer's own byte-packing direction.
    fn deflate_literal_block(bytes: &[u8]) -> Vec<u8> {
        use bytes_io::{BitBuffer, BitDirection};

        fn write_fixed_literal(writer: &mut BitBuffer, symbol: u16) {
            let (code, len): (u32, u32) = match symbol {
                0..=143 => (0b0011_0000 + symbol as u32, 8),
                144..=255 => (0b1_1001_0000 + (symbol as u32 - 144), 9),
                256..=279 => (symbol as u32 - 256, 7),
                280..=287 => (0b1100_0000 + (symbol as u32 - 280), 8),
                _ => unreachable!(),
            };

            for i in (0..len).rev() {
                writer.write_bits((code >> i) & 1, 1).unwrap();
            }
        }

        let mut writer = BitBuffer::new(4096, BitDirection::Ltm);
        writer.write_bits(1, 1).unwrap(); // BFINAL
        writer.write_bits(1, 2).unwrap(); // BTYPE = fixed

        for &byte in bytes {
            write_fixed_literal(&mut writer, byte as u16);
        }

        write_fixed_literal(&mut writer, 256); // end of block

        writer.get_data()
    }

    #[test]
    fn decodes_a_single_member_with_filename() {
        let payload = deflate_literal_block(b"hi");

        let mut archive = Vec::new();
        archive.extend_from_slice(&[0x1F, 0x8B, 8, 0x08]); // magic, method, FNAME
        archive.extend_from_slice(&[0, 0, 0, 0]); // mtime
        archive.push(0); // xfl
        archive.push(0xFF); // os
        archive.extend_from_slice(b"greeting.txt\0");
        archive.extend_from_slice(&payload);
        archive.extend_from_slice(&crc32_checksum::crc32(b"hi").to_le_bytes());
        archive.extend_from_slice(&2u32.to_le_bytes());

        let extracted = Rc::new(RefCell::new(None));
        let extracted_clone = extracted.clone();

        let events = DecodeEventSink::new()
            .on_extract(move |e: &archive_events::UnarchiveExtractEvent| *extracted_clone.borrow_mut() = Some(e.file.clone()));

        let mut decoder = GunzipDecoder::new(events);
        decoder.push(archive);
        decoder.finish();

        assert_eq!(decoder.state(), DecoderState::Finished);
        let file = extracted.borrow();
        let file = file.as_ref().unwrap();
        assert_eq!(file.filename, "greeting.txt");
        assert_eq!(file.file_data, b"hi");
    }

    #[test]
    fn surfaces_fextra_bytes_on_finish() {
        let payload = deflate_literal_block(b"x");

        let mut archive = Vec::new();
        archive.extend_from_slice(&[0x1F, 0x8B, 8, 0x04]); // magic, method, FEXTRA
        archive.extend_from_slice(&[0, 0, 0, 0]); // mtime
        archive.push(0); // xfl
        archive.push(0xFF); // os
        archive.extend_from_slice(&3u16.to_le_bytes()); // xlen
        archive.extend_from_slice(&[1, 2, 3]);
        archive.extend_from_slice(&payload);
        archive.extend_from_slice(&crc32_checksum::crc32(b"x").to_le_bytes());
        archive.extend_from_slice(&1u32.to_le_bytes());

        let extra = Rc::new(RefCell::new(None));
        let extra_clone = extra.clone();

        let events = DecodeEventSink::new()
            .on_finish(move |e: &archive_events::UnarchiveFinishEvent| *extra_clone.borrow_mut() = e.metadata.extra_field.clone());

        let mut decoder = GunzipDecoder::new(events);
        decoder.push(archive);
        decoder.finish();

        assert_eq!(*extra.borrow(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn waits_when_header_arrives_in_pieces() {
        let mut decoder = GunzipDecoder::new(DecodeEventSink::new());
        decoder.push(vec![0x1F, 0x8B, 8]);
        assert_eq!(decoder.state(), DecoderState::Waiting);
    }
}
