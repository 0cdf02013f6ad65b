//! Format-agnostic entry point: sniffs a buffer's archive format and hands
//! it off to the matching decoder. Re-exports each sub-crate's public API
//! so downstream callers can depend on just this crate.

#![allow(dead_code)]

pub use archive_events as events;
pub use gzip_archiver as gzip;
pub use image_parsers as image;
pub use inflate_rfc1951 as inflate;
pub use tar_archiver as tar;
pub use type_sniffer as sniffer;
pub use zip_archiver as zip;

use archive_events::DecodeEventSink;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not identify an archive format from the input")]
    UnrecognizedFormat,

    #[error(transparent)]
    Zip(#[from] zip_archiver::Error),

    #[error(transparent)]
    Tar(#[from] tar_archiver::Error),

    #[error(transparent)]
    Gzip(#[from] gzip_archiver::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Dispatches pushed bytes to whichever decoder matches the sniffed
/// container format. Format detection happens once, from the first
/// pushed chunk; TAR has no magic number, so it is the fallback when the
/// sniffer recognizes neither ZIP nor GZIP.
pub enum Archiver {
    Sniffing { events: DecodeEventSink, buffered: Vec<u8> },
    Zip(zip_archiver::UnzipDecoder),
    Tar(tar_archiver::UntarDecoder),
    Gzip(gzip_archiver::GunzipDecoder),
}

impl Archiver {
    pub fn new(events: DecodeEventSink) -> Self {
        Archiver::Sniffing { events, buffered: Vec::new() }
    }

    pub fn push(&mut self, data: Vec<u8>) {
        if let Archiver::Sniffing { buffered, .. } = self {
            buffered.extend_from_slice(&data);

            // Twelve bytes covers every builtin signature pattern's fixed prefix.
            if buffered.len() < 12 {
                return;
            }

            let Archiver::Sniffing { events, buffered } = std::mem::replace(self, Archiver::Sniffing { events: DecodeEventSink::new(), buffered: Vec::new() }) else {
                unreachable!()
            };

            *self = Self::dispatch(events, buffered);
        }

        match self {
            Archiver::Sniffing { .. } => {}
            Archiver::Zip(d) => d.push(data),
            Archiver::Tar(d) => d.push(data),
            Archiver::Gzip(d) => d.push(data),
        }
    }

    fn dispatch(events: DecodeEventSink, buffered: Vec<u8>) -> Self {
        match type_sniffer::sniff(&buffered) {
            Some("application/zip") => {
                let mut decoder = zip_archiver::UnzipDecoder::new(events);
                decoder.push(buffered);
                Archiver::Zip(decoder)
            }
            Some("application/gzip") => {
                let mut decoder = gzip_archiver::GunzipDecoder::new(events);
                decoder.push(buffered);
                Archiver::Gzip(decoder)
            }
            _ => {
                let mut decoder = tar_archiver::UntarDecoder::new(events);
                decoder.push(buffered);
                Archiver::Tar(decoder)
            }
        }
    }

    /// GZIP has no internal record framing, so the caller must signal end
    /// of input explicitly; ZIP/TAR decoders detect their own end markers
    /// and ignore this call once finished.
    pub fn finish(&mut self) {
        if let Archiver::Gzip(d) = self {
            d.finish();
        }
    }

    pub fn stop(&mut self) {
        match self {
            Archiver::Sniffing { .. } => {}
            Archiver::Zip(d) => d.stop(),
            Archiver::Tar(d) => d.stop(),
            Archiver::Gzip(d) => d.stop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use archive_events::UnarchiveExtractEvent;

    use super::*;

    #[test]
    fn dispatches_to_tar_when_no_magic_number_matches() {
        // A single all-zero 512-byte block is a valid (empty) TAR archive.
        let archive = vec![0u8; 1024];

        let extracted = Rc::new(RefCell::new(false));
        let extracted_clone = extracted.clone();
        let events = DecodeEventSink::new().on_finish(move |_: &archive_events::UnarchiveFinishEvent| *extracted_clone.borrow_mut() = true);

        let mut archiver = Archiver::new(events);
        archiver.push(archive);

        assert!(matches!(archiver, Archiver::Tar(_)));
        assert!(*extracted.borrow());
    }

    #[test]
    fn dispatches_to_gzip_on_magic_number() {
        let archive = vec![0x1F, 0x8B, 8, 0, 0, 0, 0, 0, 0, 0xFF, 0, 0];

        let seen = Rc::new(RefCell::new(false));
        let seen_clone = seen.clone();
        let events = DecodeEventSink::new().on_extract(move |_: &UnarchiveExtractEvent| *seen_clone.borrow_mut() = true);

        let mut archiver = Archiver::new(events);
        archiver.push(archive);

        assert!(matches!(archiver, Archiver::Gzip(_)));
    }
}
