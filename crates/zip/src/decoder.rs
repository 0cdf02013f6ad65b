use archive_events::{
    DecodeEventSink, DecoderState, UnarchivedFile, UnarchiveExtractEvent, UnarchiveFinishEvent, UnarchiveFinishMetadata,
    UnarchiveProgressEvent, UnarchiveStartEvent,
};
use bytes_io::ByteStream;
use tracing::{debug, trace, warn};

use crate::compression::CompressionMethod;
use crate::error::{Error, Result};
use crate::header::central_directory::{CentralDirectoryEntry, EndOfCentralDirectory};
use crate::header::local_file::{recover_data_descriptor, LocalFileHeader, ARCHIVE_EXTRA_DATA_SIG, CENTRAL_DIR_SIG, LOCAL_FILE_SIG};

const DIGITAL_SIGNATURE_SIG: [u8; 4] = [0x50, 0x4B, 0x05, 0x05];

enum EntryOutcome {
    NoMoreEntries,
    Skipped,
    Extracted(UnarchivedFile),
}

/// Pushes bytes in, pulls typed events out: the ZIP half of §4.H's state
/// machine (`NOT_STARTED -> UNARCHIVING <-> WAITING -> FINISHED`).
pub struct UnzipDecoder {
    stream: ByteStream,
    state: DecoderState,
    events: DecodeEventSink,
    stopped: bool,

    file_number: u32,
    bytes_unarchived: u64,
    compressed_bytes_read: u64,
}

impl UnzipDecoder {
    pub fn new(events: DecodeEventSink) -> Self {
        Self {
            stream: ByteStream::empty(),
            state: DecoderState::NotStarted,
            events,
            stopped: false,
            file_number: 0,
            bytes_unarchived: 0,
            compressed_bytes_read: 0,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Feeds the next chunk of archive bytes and drives the decoder as
    /// far as it will go before needing more input.
    pub fn push(&mut self, data: Vec<u8>) {
        if self.stopped {
            return;
        }

        self.stream.push(data);
        self.drive();
    }

    fn drive(&mut self) {
        loop {
            if self.stopped {
                return;
            }

            match self.state {
                DecoderState::NotStarted => {
                    self.events.emit_start(UnarchiveStartEvent::default());
                    self.state = DecoderState::Unarchiving;
                    self.events.emit_progress(UnarchiveProgressEvent::default());
                }
                DecoderState::Unarchiving => {
                    let checkpoint = self.stream.tee();

                    match self.try_next_entry() {
                        Ok(EntryOutcome::Extracted(file)) => {
                            self.file_number += 1;
                            self.bytes_unarchived += file.file_data.len() as u64;

                            self.events.emit_progress(UnarchiveProgressEvent {
                                current_filename: file.filename.clone(),
                                current_file_number: self.file_number,
                                current_bytes_unarchived_in_file: file.file_data.len() as u64,
                                current_bytes_unarchived: self.bytes_unarchived,
                                total_uncompressed_bytes_in_archive: 0,
                                total_files_in_archive: 0,
                                total_compressed_bytes_read: self.compressed_bytes_read,
                            });

                            self.events.emit_extract(UnarchiveExtractEvent { file });
                        }
                        Ok(EntryOutcome::Skipped) => {}
                        Ok(EntryOutcome::NoMoreEntries) => {
                            let metadata = self.run_postlude();
                            self.state = DecoderState::Finished;
                            self.events.emit_finish(UnarchiveFinishEvent { metadata });
                            return;
                        }
                        Err(e) if e.is_overrun() => {
                            trace!("unzip: overrun mid-entry, rolling back to checkpoint");
                            self.stream = checkpoint;
                            self.state = DecoderState::Waiting;
                            return;
                        }
                        Err(e) => {
                            warn!(error = %e, "unzip: structural error");
                            self.events.emit_error(e.to_string());
                            self.state = DecoderState::Finished;
                            self.stopped = true;
                            return;
                        }
                    }
                }
                DecoderState::Waiting | DecoderState::Finished => return,
            }
        }
    }

    fn try_next_entry(&mut self) -> Result<EntryOutcome> {
        let remaining = self.stream.bytes_remaining();
        if remaining < 4 {
            return Err(bytes_io::Error::Overrun { needed: 4 - remaining }.into());
        }

        if self.stream.peek_bytes(4)? != LOCAL_FILE_SIG {
            return Ok(EntryOutcome::NoMoreEntries);
        }

        let header = LocalFileHeader::parse(&mut self.stream)?;

        let (crc32, compressed_size, uncompressed_size, raw_payload) = if header.has_data_descriptor() {
            let recovered = recover_data_descriptor(&mut self.stream)?;
            (recovered.crc32, recovered.compressed_size, recovered.uncompressed_size, recovered.payload)
        } else {
            let payload = self.stream.read_bytes(header.compressed_size as usize)?;
            (header.crc32, header.compressed_size, header.uncompressed_size, payload)
        };

        self.compressed_bytes_read += compressed_size as u64;
        let _ = crc32; // recovered/trusted, not re-validated by default (Open Question iii)

        let file_data = match CompressionMethod::try_from(header.compression_method) {
            Ok(CompressionMethod::Store) => raw_payload,
            Ok(CompressionMethod::Deflate) => inflate_rfc1951::inflate(&raw_payload, Some(uncompressed_size as usize))?,
            Err(_) => {
                self.events.emit_info(format!(
                    "{}: unsupported compression method {}, skipping",
                    header.filename, header.compression_method
                ));
                return Ok(EntryOutcome::Skipped);
            }
        };

        debug!(filename = %header.filename, len = file_data.len(), "unzip: extracted entry");

        if file_data.is_empty() || header.filename.is_empty() {
            return Ok(EntryOutcome::Skipped);
        }

        Ok(EntryOutcome::Extracted(UnarchivedFile { filename: header.filename, file_data, info: None }))
    }

    /// Best-effort: a ZIP archive ends as soon as its last local file does,
    /// so failing to parse the central directory (e.g. because the caller
    /// never pushed it) is not an error, just a `finish` with no comment.
    fn run_postlude(&mut self) -> UnarchiveFinishMetadata {
        let checkpoint = self.stream.tee();

        match self.try_postlude() {
            Ok(metadata) => metadata,
            Err(e) => {
                trace!(error = %e, "unzip: postlude unavailable, finishing without archive metadata");
                self.stream = checkpoint;
                UnarchiveFinishMetadata::default()
            }
        }
    }

    fn try_postlude(&mut self) -> Result<UnarchiveFinishMetadata> {
        if self.stream.bytes_remaining() >= 4 && self.stream.peek_bytes(4)? == ARCHIVE_EXTRA_DATA_SIG {
            self.stream.skip(4)?;
            let len = self.stream.read_number(4)? as usize;
            self.stream.skip(len)?;
        }

        while self.stream.bytes_remaining() >= 4 && self.stream.peek_bytes(4)? == CENTRAL_DIR_SIG {
            CentralDirectoryEntry::parse(&mut self.stream)?;
        }

        if self.stream.bytes_remaining() >= 4 && self.stream.peek_bytes(4)? == DIGITAL_SIGNATURE_SIG {
            self.stream.skip(4)?;
            let len = self.stream.read_number(2)? as usize;
            self.stream.skip(len)?;
        }

        let eocd = EndOfCentralDirectory::parse(&mut self.stream)?;

        Ok(UnarchiveFinishMetadata { comment: Some(eocd.comment), extra_field: None })
    }
}

impl Default for UnzipDecoder {
    fn default() -> Self {
        Self::new(DecodeEventSink::new())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn store_entry(filename: &str, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&LOCAL_FILE_SIG);
        buf.extend_from_slice(&20u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // store
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&crc32_checksum::crc32(data).to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(filename.len() as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(filename.as_bytes());
        buf.extend_from_slice(data);
        buf
    }

    #[test]
    fn decodes_single_store_entry_and_finishes() {
        let mut archive = store_entry("a.txt", b"hello world");
        archive.extend_from_slice(&EndOfCentralDirectory::default_bytes());

        let extracted = Rc::new(RefCell::new(Vec::new()));
        let extracted_clone = extracted.clone();
        let finished = Rc::new(RefCell::new(false));
        let finished_clone = finished.clone();

        let events = DecodeEventSink::new()
            .on_extract(move |e: &archive_events::UnarchiveExtractEvent| {
                extracted_clone.borrow_mut().push(e.file.filename.clone());
            })
            .on_finish(move |_| *finished_clone.borrow_mut() = true);

        let mut decoder = UnzipDecoder::new(events);
        decoder.push(archive);

        assert_eq!(decoder.state(), DecoderState::Finished);
        assert_eq!(*extracted.borrow(), vec!["a.txt".to_string()]);
        assert!(*finished.borrow());
    }

    #[test]
    fn waits_when_entry_is_split_across_pushes() {
        let archive = store_entry("b.txt", b"split me");

        let mut decoder = UnzipDecoder::new(DecodeEventSink::new());
        decoder.push(archive[..10].to_vec());
        assert_eq!(decoder.state(), DecoderState::Waiting);

        decoder.push(archive[10..].to_vec());
        decoder.push(EndOfCentralDirectory::default_bytes());
        assert_eq!(decoder.state(), DecoderState::Finished);
    }
}
