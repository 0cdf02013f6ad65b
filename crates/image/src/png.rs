use bytes_io::{ByteStream, Endianness};
use tracing::{debug, warn};

use crate::error::{Error, Result};

const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorType {
    Grayscale,
    Rgb,
    Indexed,
    GrayscaleAlpha,
    RgbAlpha,
}

impl ColorType {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(ColorType::Grayscale),
            2 => Ok(ColorType::Rgb),
            3 => Ok(ColorType::Indexed),
            4 => Ok(ColorType::GrayscaleAlpha),
            6 => Ok(ColorType::RgbAlpha),
            other => Err(Error::Structural(format!("invalid PNG color type {other}"))),
        }
    }

    fn allows_trns(self) -> bool {
        matches!(self, ColorType::Grayscale | ColorType::Rgb | ColorType::Indexed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PngImageHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: ColorType,
    pub interlace: u8,
}

#[derive(Debug, Clone)]
pub struct PngChunk {
    pub chunk_type: [u8; 4],
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum PngAncillary {
    Gamma(u32),
    SignificantBits(Vec<u8>),
    Transparency(Vec<u8>),
    Background(Vec<u8>),
    Chromaticities([u32; 8]),
    TextualData { keyword: String, text: String },
    /// `text` is `None` if the zlib stream failed to decompress; the raw
    /// bytes are still reported via `on_unknown_chunk`-style callers that
    /// only need the keyword.
    CompressedText { keyword: String, text: Option<String> },
    InternationalText { keyword: String, text: String },
    PhysicalDimensions { pixels_per_unit_x: u32, pixels_per_unit_y: u32, unit_specifier: u8 },
    ModificationTime { year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8 },
    Exif(Vec<u8>),
    Histogram(Vec<u8>),
    SuggestedPalette(Vec<u8>),
}

#[derive(Default)]
pub struct PngEventSink {
    pub on_header: Option<Box<dyn FnMut(&PngImageHeader)>>,
    pub on_palette: Option<Box<dyn FnMut(&[u8])>>,
    pub on_image_data: Option<Box<dyn FnMut(&[u8])>>,
    pub on_ancillary: Option<Box<dyn FnMut(&PngAncillary)>>,
    pub on_unknown_chunk: Option<Box<dyn FnMut(&PngChunk)>>,
    pub on_end: Option<Box<dyn FnMut()>>,
    pub on_error: Option<Box<dyn FnMut(&str)>>,
}

impl PngEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_header(mut self, f: impl FnMut(&PngImageHeader) + 'static) -> Self {
        self.on_header = Some(Box::new(f));
        self
    }

    pub fn on_palette(mut self, f: impl FnMut(&[u8]) + 'static) -> Self {
        self.on_palette = Some(Box::new(f));
        self
    }

    pub fn on_image_data(mut self, f: impl FnMut(&[u8]) + 'static) -> Self {
        self.on_image_data = Some(Box::new(f));
        self
    }

    pub fn on_ancillary(mut self, f: impl FnMut(&PngAncillary) + 'static) -> Self {
        self.on_ancillary = Some(Box::new(f));
        self
    }

    pub fn on_end(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }
}

/// Drives the PNG chunk grammar over a complete in-memory buffer, tracking
/// enough state across chunks to validate color-type-dependent chunks
/// (e.g. `tRNS` length depends on `IHDR` color type; `PLTE` must precede
/// any chunk whose meaning depends on the palette).
pub struct PngParser {
    stream: ByteStream,
    events: PngEventSink,
    header: Option<PngImageHeader>,
    seen_palette: bool,
    ended: bool,
}

impl PngParser {
    pub fn new(data: Vec<u8>, events: PngEventSink) -> Self {
        let mut stream = ByteStream::new(data);
        stream.set_endianness(Endianness::Big);
        Self { stream, events, header: None, seen_palette: false, ended: false }
    }

    pub fn run(&mut self) -> Result<()> {
        let sig = self.stream.read_bytes(8)?;
        if sig != SIGNATURE {
            let message = "not a PNG file: bad signature".to_string();
            self.emit_error(&message);
            return Err(Error::Structural(message));
        }

        loop {
            if self.ended {
                return Ok(());
            }

            if let Err(e) = self.read_chunk() {
                warn!(error = %e, "png: failed to parse chunk");
                self.emit_error(&e.to_string());
                return Err(e);
            }
        }
    }

    fn emit_error(&mut self, message: &str) {
        if let Some(cb) = &mut self.events.on_error {
            cb(message);
        }
    }

    fn read_chunk(&mut self) -> Result<()> {
        let length = self.stream.read_number(4)? as usize;
        let chunk_type_bytes = self.stream.read_bytes(4)?;
        let data = self.stream.read_bytes(length)?;
        let stored_crc = self.stream.read_number(4)?;

        let mut crc_input = chunk_type_bytes.clone();
        crc_input.extend_from_slice(&data);
        let computed_crc = crc32_checksum::crc32(&crc_input);

        if computed_crc != stored_crc {
            return Err(Error::Structural(format!("chunk CRC mismatch for {:?}", String::from_utf8_lossy(&chunk_type_bytes))));
        }

        let chunk_type: [u8; 4] = chunk_type_bytes.try_into().expect("read_bytes(4) guarantees length 4");

        if self.header.is_none() && &chunk_type != b"IHDR" {
            return Err(Error::Structural("first chunk after signature must be IHDR".into()));
        }

        match &chunk_type {
            b"IHDR" => self.handle_ihdr(&data)?,
            b"PLTE" => self.handle_plte(&data)?,
            b"IDAT" => {
                if let Some(cb) = &mut self.events.on_image_data {
                    cb(&data);
                }
            }
            b"IEND" => {
                self.ended = true;
                if let Some(cb) = &mut self.events.on_end {
                    cb();
                }
            }
            b"tRNS" => self.handle_trns(&data)?,
            b"gAMA" => self.handle_ancillary(PngAncillary::Gamma(u32::from_be_bytes(data[..4].try_into().map_err(|_| bad_len("gAMA"))?))),
            b"sBIT" => self.handle_ancillary(PngAncillary::SignificantBits(data)),
            b"bKGD" => self.handle_ancillary(PngAncillary::Background(data)),
            b"cHRM" => self.handle_chrm(&data)?,
            b"tEXt" => self.handle_text(&data)?,
            b"zTXt" => self.handle_ztxt(&data)?,
            b"iTXt" => self.handle_itxt(&data)?,
            b"pHYs" => self.handle_phys(&data)?,
            b"tIME" => self.handle_time(&data)?,
            b"eXIf" => self.handle_ancillary(PngAncillary::Exif(data)),
            b"hIST" => self.handle_ancillary(PngAncillary::Histogram(data)),
            b"sPLT" => self.handle_ancillary(PngAncillary::SuggestedPalette(data)),
            _ => {
                if let Some(cb) = &mut self.events.on_unknown_chunk {
                    cb(&PngChunk { chunk_type, data });
                }
            }
        }

        Ok(())
    }

    fn handle_ihdr(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != 13 {
            return Err(bad_len("IHDR"));
        }

        let width = u32::from_be_bytes(data[0..4].try_into().unwrap());
        let height = u32::from_be_bytes(data[4..8].try_into().unwrap());
        let bit_depth = data[8];
        let color_type = ColorType::from_byte(data[9])?;
        let compression = data[10];
        let filter = data[11];
        let interlace = data[12];

        if compression != 0 {
            return Err(Error::Structural(format!("unsupported IHDR compression method {compression}")));
        }
        if filter != 0 {
            return Err(Error::Structural(format!("unsupported IHDR filter method {filter}")));
        }

        let header = PngImageHeader { width, height, bit_depth, color_type, interlace };
        debug!(width, height, ?color_type, "png: parsed IHDR");
        if let Some(cb) = &mut self.events.on_header {
            cb(&header);
        }
        self.header = Some(header);

        Ok(())
    }

    fn handle_plte(&mut self, data: &[u8]) -> Result<()> {
        if data.len() % 3 != 0 {
            return Err(Error::Structural("PLTE length must be a multiple of 3".into()));
        }

        self.seen_palette = true;
        if let Some(cb) = &mut self.events.on_palette {
            cb(data);
        }

        Ok(())
    }

    fn handle_trns(&mut self, data: &[u8]) -> Result<()> {
        let header = self.header.ok_or_else(|| Error::Structural("tRNS before IHDR".into()))?;

        if !header.color_type.allows_trns() {
            return Err(Error::Structural("tRNS not allowed for this color type".into()));
        }

        if header.color_type == ColorType::Indexed && !self.seen_palette {
            return Err(Error::Structural("tRNS for indexed color requires a preceding PLTE".into()));
        }

        self.handle_ancillary(PngAncillary::Transparency(data.to_vec()));
        Ok(())
    }

    fn handle_chrm(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != 32 {
            return Err(bad_len("cHRM"));
        }

        let mut values = [0u32; 8];
        for (i, slot) in values.iter_mut().enumerate() {
            *slot = u32::from_be_bytes(data[i * 4..i * 4 + 4].try_into().unwrap());
        }

        self.handle_ancillary(PngAncillary::Chromaticities(values));
        Ok(())
    }

    fn handle_text(&mut self, data: &[u8]) -> Result<()> {
        let nul = data.iter().position(|&b| b == 0).ok_or_else(|| bad_len("tEXt"))?;
        let keyword = String::from_utf8_lossy(&data[..nul]).into_owned();
        let text = String::from_utf8_lossy(&data[nul + 1..]).into_owned();

        self.handle_ancillary(PngAncillary::TextualData { keyword, text });
        Ok(())
    }

    fn handle_ztxt(&mut self, data: &[u8]) -> Result<()> {
        let nul = data.iter().position(|&b| b == 0).ok_or_else(|| bad_len("zTXt"))?;
        let keyword = String::from_utf8_lossy(&data[..nul]).into_owned();
        // byte after the keyword's NUL is the compression method (always 0 / zlib); the rest is the zlib stream.
        let text = inflate_zlib_text(&data[nul + 2..]);

        self.handle_ancillary(PngAncillary::CompressedText { keyword, text });
        Ok(())
    }

    fn handle_itxt(&mut self, data: &[u8]) -> Result<()> {
        let nul = data.iter().position(|&b| b == 0).ok_or_else(|| bad_len("iTXt"))?;
        let keyword = String::from_utf8_lossy(&data[..nul]).into_owned();
        let rest = &data[nul + 1..];

        if rest.len() < 2 {
            return Err(bad_len("iTXt"));
        }

        let compressed = rest[0] != 0;
        let mut cursor = 2; // compression flag + compression method
        let lang_end = rest[cursor..].iter().position(|&b| b == 0).ok_or_else(|| bad_len("iTXt"))? + cursor;
        cursor = lang_end + 1;
        let translated_end = rest[cursor..].iter().position(|&b| b == 0).ok_or_else(|| bad_len("iTXt"))? + cursor;
        cursor = translated_end + 1;

        let text = if compressed {
            inflate_zlib_text(&rest[cursor..]).unwrap_or_default()
        } else {
            String::from_utf8_lossy(&rest[cursor..]).into_owned()
        };

        self.handle_ancillary(PngAncillary::InternationalText { keyword, text });
        Ok(())
    }

    fn handle_phys(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != 9 {
            return Err(bad_len("pHYs"));
        }

        self.handle_ancillary(PngAncillary::PhysicalDimensions {
            pixels_per_unit_x: u32::from_be_bytes(data[0..4].try_into().unwrap()),
            pixels_per_unit_y: u32::from_be_bytes(data[4..8].try_into().unwrap()),
            unit_specifier: data[8],
        });

        Ok(())
    }

    fn handle_time(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != 7 {
            return Err(bad_len("tIME"));
        }

        self.handle_ancillary(PngAncillary::ModificationTime {
            year: u16::from_be_bytes(data[0..2].try_into().unwrap()),
            month: data[2],
            day: data[3],
            hour: data[4],
            minute: data[5],
            second: data[6],
        });

        Ok(())
    }

    fn handle_ancillary(&mut self, event: PngAncillary) {
        if let Some(cb) = &mut self.events.on_ancillary {
            cb(&event);
        }
    }
}

fn bad_len(chunk: &str) -> Error {
    Error::Structural(format!("{chunk} chunk has an invalid length"))
}

/// Strips the 2-byte zlib header and 4-byte trailing Adler-32 (RFC 1950)
/// around a PNG text chunk's compressed payload and inflates the raw
/// DEFLATE stream in between. Returns `None` on any failure rather than
/// propagating it, since malformed compressed text shouldn't abort an
/// otherwise-valid PNG.
fn inflate_zlib_text(zlib_stream: &[u8]) -> Option<String> {
    let raw = zlib_stream.get(2..zlib_stream.len().checked_sub(4)?)?;
    let decompressed = inflate_rfc1951::inflate(raw, None).ok()?;
    Some(String::from_utf8_lossy(&decompressed).into_owned())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Wraps a fixed-Huffman DEFLATE block (built the same way
    /// inflate-rfc1951's own tests do) in a minimal zlib (RFC 1950)
    /// header/trailer pair, for exercising zTXt/iTXt decompression.
    fn zlib_wrap(bytes: &[u8]) -> Vec<u8> {
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
        writer.write_bits(1, 1).unwrap();
        writer.write_bits(1, 2).unwrap();
        for &byte in bytes {
            write_fixed_literal(&mut writer, byte as u16);
        }
        write_fixed_literal(&mut writer, 256);

        let mut stream = vec![0x78, 0x01]; // zlib header: CMF/FLG for a default-compression deflate stream
        stream.extend(writer.get_data());
        stream.extend_from_slice(&[0, 0, 0, 0]); // Adler-32 trailer, unchecked by inflate_zlib_text
        stream
    }

    fn chunk(chunk_type: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
        buf.extend_from_slice(chunk_type);
        buf.extend_from_slice(data);

        let mut crc_input = chunk_type.to_vec();
        crc_input.extend_from_slice(data);
        buf.extend_from_slice(&crc32_checksum::crc32(&crc_input).to_be_bytes());

        buf
    }

    fn minimal_png(extra_chunks: Vec<Vec<u8>>) -> Vec<u8> {
        let mut buf = SIGNATURE.to_vec();

        let mut ihdr_data = Vec::new();
        ihdr_data.extend_from_slice(&1u32.to_be_bytes());
        ihdr_data.extend_from_slice(&1u32.to_be_bytes());
        ihdr_data.push(8); // bit depth
        ihdr_data.push(2); // color type: RGB
        ihdr_data.push(0); // compression
        ihdr_data.push(0); // filter
        ihdr_data.push(0); // interlace
        buf.extend(chunk(b"IHDR", &ihdr_data));

        for c in extra_chunks {
            buf.extend(c);
        }

        buf.extend(chunk(b"IEND", &[]));
        buf
    }

    #[test]
    fn parses_minimal_png_header_and_end() {
        let data = minimal_png(vec![]);

        let header_seen = Rc::new(RefCell::new(None));
        let header_clone = header_seen.clone();
        let ended = Rc::new(RefCell::new(false));
        let ended_clone = ended.clone();

        let events = PngEventSink::new()
            .on_header(move |h: &PngImageHeader| *header_clone.borrow_mut() = Some(*h))
            .on_end(move || *ended_clone.borrow_mut() = true);

        let mut parser = PngParser::new(data, events);
        parser.run().unwrap();

        assert_eq!(header_seen.borrow().unwrap().width, 1);
        assert!(*ended.borrow());
    }

    #[test]
    fn rejects_bad_signature() {
        let mut parser = PngParser::new(vec![0u8; 20], PngEventSink::new());
        assert!(parser.run().is_err());
    }

    #[test]
    fn rejects_chunk_crc_mismatch() {
        let mut data = minimal_png(vec![]);
        let last = data.len() - 1;
        data[last] ^= 0xFF;

        let mut parser = PngParser::new(data, PngEventSink::new());
        assert!(parser.run().is_err());
    }

    #[test]
    fn trns_without_palette_on_indexed_color_is_rejected() {
        let mut buf = SIGNATURE.to_vec();
        let mut ihdr_data = vec![0u8; 13];
        ihdr_data[0..4].copy_from_slice(&1u32.to_be_bytes());
        ihdr_data[4..8].copy_from_slice(&1u32.to_be_bytes());
        ihdr_data[8] = 8;
        ihdr_data[9] = 3; // indexed color, no PLTE provided
        buf.extend(chunk(b"IHDR", &ihdr_data));
        buf.extend(chunk(b"tRNS", &[0, 1, 2]));

        let mut parser = PngParser::new(buf, PngEventSink::new());
        assert!(parser.run().is_err());
    }

    #[test]
    fn text_chunk_splits_keyword_and_value() {
        let mut text_data = b"Author\0Jane Doe".to_vec();
        let data = minimal_png(vec![chunk(b"tEXt", &text_data)]);
        text_data.clear();

        let seen = Rc::new(RefCell::new(None));
        let seen_clone = seen.clone();

        let events = PngEventSink::new().on_ancillary(move |a: &PngAncillary| {
            if let PngAncillary::TextualData { keyword, text } = a {
                *seen_clone.borrow_mut() = Some((keyword.clone(), text.clone()));
            }
        });

        let mut parser = PngParser::new(data, events);
        parser.run().unwrap();

        assert_eq!(*seen.borrow(), Some(("Author".to_string(), "Jane Doe".to_string())));
    }

    #[test]
    fn ztxt_chunk_is_decompressed() {
        let mut ztxt_data = b"Comment\0\0".to_vec(); // keyword, NUL, compression method 0
        ztxt_data.extend(zlib_wrap(b"hello png"));
        let data = minimal_png(vec![chunk(b"zTXt", &ztxt_data)]);

        let seen = Rc::new(RefCell::new(None));
        let seen_clone = seen.clone();

        let events = PngEventSink::new().on_ancillary(move |a: &PngAncillary| {
            if let PngAncillary::CompressedText { keyword, text } = a {
                *seen_clone.borrow_mut() = Some((keyword.clone(), text.clone()));
            }
        });

        let mut parser = PngParser::new(data, events);
        parser.run().unwrap();

        assert_eq!(*seen.borrow(), Some(("Comment".to_string(), Some("hello png".to_string()))));
    }
}
