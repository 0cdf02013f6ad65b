use archive_events::{
    DecodeEventSink, DecoderState, UnarchivedFile, UnarchiveExtractEvent, UnarchiveFinishEvent, UnarchiveProgressEvent, UnarchiveStartEvent,
};
use bytes_io::ByteStream;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::header::{padding_for, TarHeader, TypeFlag};

enum EntryOutcome {
    EndOfArchive,
    Skipped,
    Extracted(UnarchivedFile),
}

/// Pushes bytes in, pulls typed events out: the USTAR analogue of the ZIP
/// decoder's state machine (§4.J), minus data-descriptor recovery and the
/// central-directory postlude — TAR has neither.
pub struct UntarDecoder {
    stream: ByteStream,
    state: DecoderState,
    events: DecodeEventSink,
    stopped: bool,

    file_number: u32,
    bytes_unarchived: u64,
}

impl UntarDecoder {
    pub fn new(events: DecodeEventSink) -> Self {
        Self {
            stream: ByteStream::empty(),
            state: DecoderState::NotStarted,
            events,
            stopped: false,
            file_number: 0,
            bytes_unarchived: 0,
        }
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
                                total_compressed_bytes_read: self.stream.bytes_consumed(),
                            });

                            self.events.emit_extract(UnarchiveExtractEvent { file });
                        }
                        Ok(EntryOutcome::Skipped) => {}
                        Ok(EntryOutcome::EndOfArchive) => {
                            self.state = DecoderState::Finished;
                            self.events.emit_finish(UnarchiveFinishEvent::default());
                            return;
                        }
                        Err(e) if e.is_overrun() => {
                            trace!("untar: overrun mid-entry, rolling back to checkpoint");
                            self.stream = checkpoint;
                            self.state = DecoderState::Waiting;
                            return;
                        }
                        Err(e) => {
                            warn!(error = %e, "untar: structural error");
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
        let header = match TarHeader::parse(&mut self.stream)? {
            None => return Ok(EntryOutcome::EndOfArchive),
            Some(header) => header,
        };

        match header.typeflag {
            TypeFlag::RegularFile => {
                let payload = self.stream.read_bytes(header.size as usize)?;
                self.stream.skip(padding_for(header.size))?;

                debug!(filename = %header.filename, len = payload.len(), "untar: extracted entry");

                Ok(EntryOutcome::Extracted(UnarchivedFile { filename: header.filename, file_data: payload, info: None }))
            }
            TypeFlag::Directory => {
                self.events.emit_info(format!("{}: directory entry", header.filename));
                Ok(EntryOutcome::Skipped)
            }
            TypeFlag::Other(flag) => {
                self.stream.read_bytes(header.size as usize)?;
                self.stream.skip(padding_for(header.size))?;

                self.events.emit_info(format!("{}: unsupported typeflag {:#04x}, skipping", header.filename, flag));
                Ok(EntryOutcome::Skipped)
            }
        }
    }
}

impl Default for UntarDecoder {
    fn default() -> Self {
        Self::new(DecodeEventSink::new())
    }
}
