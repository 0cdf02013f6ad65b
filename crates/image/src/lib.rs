//! Event-driven parsers for the raster container formats: PNG, GIF and
//! JPEG. Each parser validates its own container grammar (chunk/block/
//! marker framing, structural ordering) and reports strongly typed events
//! through a per-format callback-slot sink; none of them decode pixels.

#![allow(dead_code)]

mod error;
mod gif;
mod jpeg;
mod png;

pub use error::{Error, Result};
pub use gif::{
    GifApplicationExtension, GifEventSink, GifGraphicControl, GifImage, GifImageDescriptor, GifLogicalScreen, GifParser,
    GifPlainTextExtension,
};
pub use jpeg::{
    ExifIfdEntry, JpegAppSegment, JpegComponent, JpegEventSink, JpegHuffmanTable, JpegParser, JpegQuantizationTable, JpegScan,
    JpegStartOfFrame,
};
pub use png::{ColorType, PngAncillary, PngChunk, PngEventSink, PngImageHeader, PngParser};
