//! Typed event payloads and callback-slot event sinks shared by the
//! ZIP/TAR/GZIP archive decoders and the ZIP encoder.
//!
//! The source toolkit dispatches events through a DOM-style
//! `EventTarget` with weakly-typed event names; per the redesign notes
//! this is re-architected as one typed callback slot per event kind
//! (`on_start`, `on_progress`, `on_extract`, `on_finish`, `on_info`,
//! `on_error`, `on_compress`) instead.

#![allow(dead_code)]

use std::fmt;

/// Lifecycle state shared by every archive decoder (§4.H's state machine,
/// reused verbatim by Untar and Gunzip per spec §4.J/§4.K).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    NotStarted,
    Unarchiving,
    /// A record was only partially available; waiting on the next `push`.
    Waiting,
    Finished,
}

/// A single extracted file, the uniform record shared by every archive
/// decoder's `extract` event (spec.md §9's base-class unification target).
#[derive(Debug, Clone)]
pub struct UnarchivedFile {
    pub filename: String,
    pub file_data: Vec<u8>,
    /// Free-form extra info a specific format wants to surface (e.g. the
    /// TAR typeflag, or a ZIP file comment).
    pub info: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UnarchiveStartEvent {
    pub source_filename: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UnarchiveProgressEvent {
    pub current_filename: String,
    pub current_file_number: u32,
    pub current_bytes_unarchived_in_file: u64,
    pub current_bytes_unarchived: u64,
    pub total_uncompressed_bytes_in_archive: u64,
    pub total_files_in_archive: u32,
    pub total_compressed_bytes_read: u64,
}

#[derive(Debug, Clone)]
pub struct UnarchiveExtractEvent {
    pub file: UnarchivedFile,
}

#[derive(Debug, Clone, Default)]
pub struct UnarchiveFinishMetadata {
    pub comment: Option<String>,
    /// Format-specific extra bytes a caller may want (e.g. GZIP's FEXTRA
    /// field). Unused by ZIP/TAR.
    pub extra_field: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct UnarchiveFinishEvent {
    pub metadata: UnarchiveFinishMetadata,
}

#[derive(Debug, Clone)]
pub struct UnarchiveInfoEvent {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct UnarchiveErrorEvent {
    pub message: String,
}

/// One callback slot per decode event kind. Unset slots are silently
/// skipped — the core never requires a listener to be present.
#[derive(Default)]
pub struct DecodeEventSink {
    pub on_start: Option<Box<dyn FnMut(&UnarchiveStartEvent)>>,
    pub on_progress: Option<Box<dyn FnMut(&UnarchiveProgressEvent)>>,
    pub on_extract: Option<Box<dyn FnMut(&UnarchiveExtractEvent)>>,
    pub on_finish: Option<Box<dyn FnMut(&UnarchiveFinishEvent)>>,
    pub on_info: Option<Box<dyn FnMut(&UnarchiveInfoEvent)>>,
    pub on_error: Option<Box<dyn FnMut(&UnarchiveErrorEvent)>>,
}

impl fmt::Debug for DecodeEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeEventSink")
            .field("on_start", &self.on_start.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_extract", &self.on_extract.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .field("on_info", &self.on_info.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl DecodeEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, f: impl FnMut(&UnarchiveStartEvent) + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(&UnarchiveProgressEvent) + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_extract(mut self, f: impl FnMut(&UnarchiveExtractEvent) + 'static) -> Self {
        self.on_extract = Some(Box::new(f));
        self
    }

    pub fn on_finish(mut self, f: impl FnMut(&UnarchiveFinishEvent) + 'static) -> Self {
        self.on_finish = Some(Box::new(f));
        self
    }

    pub fn on_info(mut self, f: impl FnMut(&UnarchiveInfoEvent) + 'static) -> Self {
        self.on_info = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&UnarchiveErrorEvent) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn emit_start(&mut self, event: UnarchiveStartEvent) {
        if let Some(cb) = &mut self.on_start {
            cb(&event);
        }
    }

    pub fn emit_progress(&mut self, event: UnarchiveProgressEvent) {
        if let Some(cb) = &mut self.on_progress {
            cb(&event);
        }
    }

    pub fn emit_extract(&mut self, event: UnarchiveExtractEvent) {
        if let Some(cb) = &mut self.on_extract {
            cb(&event);
        }
    }

    pub fn emit_finish(&mut self, event: UnarchiveFinishEvent) {
        if let Some(cb) = &mut self.on_finish {
            cb(&event);
        }
    }

    pub fn emit_info(&mut self, message: impl Into<String>) {
        if let Some(cb) = &mut self.on_info {
            cb(&UnarchiveInfoEvent { message: message.into() });
        }
    }

    pub fn emit_error(&mut self, message: impl Into<String>) {
        if let Some(cb) = &mut self.on_error {
            cb(&UnarchiveErrorEvent { message: message.into() });
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressEvent {
    pub filename: String,
    pub chunk: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct EncodeFinishEvent {
    pub total_bytes_written: u64,
}

/// One callback slot per ZIP-encoder event kind (§4.I: `compress`, `finish`).
#[derive(Default)]
pub struct EncodeEventSink {
    pub on_compress: Option<Box<dyn FnMut(&CompressEvent)>>,
    pub on_finish: Option<Box<dyn FnMut(&EncodeFinishEvent)>>,
}

impl fmt::Debug for EncodeEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodeEventSink")
            .field("on_compress", &self.on_compress.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

impl EncodeEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_compress(mut self, f: impl FnMut(&CompressEvent) + 'static) -> Self {
        self.on_compress = Some(Box::new(f));
        self
    }

    pub fn on_finish(mut self, f: impl FnMut(&EncodeFinishEvent) + 'static) -> Self {
        self.on_finish = Some(Box::new(f));
        self
    }

    pub fn emit_compress(&mut self, event: CompressEvent) {
        if let Some(cb) = &mut self.on_compress {
            cb(&event);
        }
    }

    pub fn emit_finish(&mut self, event: EncodeFinishEvent) {
        if let Some(cb) = &mut self.on_finish {
            cb(&event);
        }
    }
}
