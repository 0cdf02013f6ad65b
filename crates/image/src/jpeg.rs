use bytes_io::{ByteStream, Endianness};
use tracing::{debug, warn};

use crate::error::{Error, Result};

const MARKER_PREFIX: u8 = 0xFF;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DHT: u8 = 0xC4;
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;

fn is_sof_marker(marker: u8) -> bool {
    // SOF0..SOF15 excluding DHT(C4), JPG(C8), DAC(CC) which share the 0xC_ range.
    matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF)
}

#[derive(Debug, Clone, Copy)]
pub struct JpegComponent {
    pub id: u8,
    pub horizontal_sampling: u8,
    pub vertical_sampling: u8,
    pub quantization_table_id: u8,
}

#[derive(Debug, Clone)]
pub struct JpegStartOfFrame {
    pub marker: u8,
    pub precision: u8,
    pub height: u16,
    pub width: u16,
    pub components: Vec<JpegComponent>,
}

#[derive(Debug, Clone)]
pub struct JpegQuantizationTable {
    pub table_id: u8,
    pub precision: u8,
    pub values: Vec<u16>,
}

#[derive(Debug, Clone)]
pub struct JpegHuffmanTable {
    pub table_class: u8,
    pub table_id: u8,
    pub code_lengths: [u8; 16],
    pub values: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct JpegScan {
    pub component_selectors: Vec<(u8, u8)>,
    pub entropy_coded_data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct JpegAppSegment {
    pub marker: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ExifIfdEntry {
    pub tag: u16,
    pub format: u16,
    pub count: u32,
    pub value_offset: u32,
}

#[derive(Default)]
pub struct JpegEventSink {
    pub on_app_segment: Option<Box<dyn FnMut(&JpegAppSegment)>>,
    pub on_exif: Option<Box<dyn FnMut(&[ExifIfdEntry])>>,
    pub on_quantization_table: Option<Box<dyn FnMut(&JpegQuantizationTable)>>,
    pub on_huffman_table: Option<Box<dyn FnMut(&JpegHuffmanTable)>>,
    pub on_start_of_frame: Option<Box<dyn FnMut(&JpegStartOfFrame)>>,
    pub on_scan: Option<Box<dyn FnMut(&JpegScan)>>,
    pub on_end: Option<Box<dyn FnMut()>>,
    pub on_error: Option<Box<dyn FnMut(&str)>>,
}

impl JpegEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_app_segment(mut self, f: impl FnMut(&JpegAppSegment) + 'static) -> Self {
        self.on_app_segment = Some(Box::new(f));
        self
    }

    pub fn on_exif(mut self, f: impl FnMut(&[ExifIfdEntry]) + 'static) -> Self {
        self.on_exif = Some(Box::new(f));
        self
    }

    pub fn on_quantization_table(mut self, f: impl FnMut(&JpegQuantizationTable) + 'static) -> Self {
        self.on_quantization_table = Some(Box::new(f));
        self
    }

    pub fn on_huffman_table(mut self, f: impl FnMut(&JpegHuffmanTable) + 'static) -> Self {
        self.on_huffman_table = Some(Box::new(f));
        self
    }

    pub fn on_start_of_frame(mut self, f: impl FnMut(&JpegStartOfFrame) + 'static) -> Self {
        self.on_start_of_frame = Some(Box::new(f));
        self
    }

    pub fn on_scan(mut self, f: impl FnMut(&JpegScan) + 'static) -> Self {
        self.on_scan = Some(Box::new(f));
        self
    }

    pub fn on_end(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }
}

/// Drives the JFIF marker grammar. Entropy-coded scan data is read up to
/// (but not past) the next marker, un-stuffing `FF 00` byte pairs as it
/// goes per the ITU T.81 byte-stuffing rule; actual Huffman/DCT decoding of
/// that data is out of scope.
pub struct JpegParser {
    stream: ByteStream,
    events: JpegEventSink,
    quantization_tables: [Option<JpegQuantizationTable>; 4],
    huffman_tables: [Option<JpegHuffmanTable>; 8],
}

impl JpegParser {
    pub fn new(data: Vec<u8>, events: JpegEventSink) -> Self {
        let mut stream = ByteStream::new(data);
        stream.set_endianness(Endianness::Big);
        Self { stream, events, quantization_tables: [None, None, None, None], huffman_tables: [None, None, None, None, None, None, None, None] }
    }

    /// The most recently parsed DQT table for a given table id (0-3), kept
    /// on the parser so a caller that also wants entropy-decoded MCU data
    /// can reapply the tables without re-reading the marker stream.
    pub fn quantization_table(&self, table_id: u8) -> Option<&JpegQuantizationTable> {
        self.quantization_tables.get(table_id as usize)?.as_ref()
    }

    /// The most recently parsed DHT table for a given (class, id) pair.
    /// DC tables occupy slots 0-3, AC tables slots 4-7.
    pub fn huffman_table(&self, table_class: u8, table_id: u8) -> Option<&JpegHuffmanTable> {
        let slot = (table_class as usize) * 4 + table_id as usize;
        self.huffman_tables.get(slot)?.as_ref()
    }

    pub fn run(&mut self) -> Result<()> {
        if let Err(e) = self.run_inner() {
            warn!(error = %e, "jpeg: failed to parse");
            if let Some(cb) = &mut self.events.on_error {
                cb(&e.to_string());
            }
            return Err(e);
        }
        Ok(())
    }

    fn run_inner(&mut self) -> Result<()> {
        self.expect_marker(SOI)?;

        loop {
            let marker = self.read_marker()?;
            match marker {
                EOI => {
                    if let Some(cb) = &mut self.events.on_end {
                        cb();
                    }
                    return Ok(());
                }
                APP0 | APP1 => self.parse_app_segment(marker)?,
                DQT => self.parse_dqt()?,
                DHT => self.parse_dht()?,
                SOS => {
                    self.parse_sos()?;
                    // entropy-coded data precedes the next real marker; SOS handling reads past it.
                }
                m if is_sof_marker(m) => self.parse_sof(m)?,
                _ => self.skip_segment()?,
            }
        }
    }

    fn expect_marker(&mut self, expected: u8) -> Result<()> {
        let marker = self.read_marker()?;
        if marker != expected {
            return Err(Error::Structural(format!("expected marker {expected:#04x}, got {marker:#04x}")));
        }
        Ok(())
    }

    fn read_marker(&mut self) -> Result<u8> {
        loop {
            let prefix = self.stream.read_bytes(1)?[0];
            if prefix != MARKER_PREFIX {
                return Err(Error::Structural("expected 0xFF marker prefix".into()));
            }
            let marker = self.stream.read_bytes(1)?[0];
            if marker != 0x00 && marker != MARKER_PREFIX {
                return Ok(marker);
            }
            // 0xFF00 inside a marker stream or fill bytes (0xFFFF) — keep scanning.
        }
    }

    fn read_segment_payload(&mut self) -> Result<Vec<u8>> {
        let length = self.stream.read_number(2)? as usize;
        if length < 2 {
            return Err(Error::Structural("segment length must be at least 2".into()));
        }
        Ok(self.stream.read_bytes(length - 2)?)
    }

    fn skip_segment(&mut self) -> Result<()> {
        self.read_segment_payload()?;
        Ok(())
    }

    fn parse_app_segment(&mut self, marker: u8) -> Result<()> {
        let data = self.read_segment_payload()?;

        if marker == APP1 && data.starts_with(b"Exif\0\0") {
            let entries = parse_exif_ifd(&data[6..]);
            if let Some(cb) = &mut self.events.on_exif {
                cb(&entries);
            }
        }

        if let Some(cb) = &mut self.events.on_app_segment {
            cb(&JpegAppSegment { marker, data });
        }

        Ok(())
    }

    fn parse_dqt(&mut self) -> Result<()> {
        let data = self.read_segment_payload()?;
        let mut cursor = 0;

        while cursor < data.len() {
            let pq_tq = data[cursor];
            cursor += 1;
            let precision = pq_tq >> 4;
            let table_id = pq_tq & 0x0F;

            let entry_size = if precision == 0 { 1 } else { 2 };
            let mut values = Vec::with_capacity(64);
            for _ in 0..64 {
                if entry_size == 1 {
                    values.push(*data.get(cursor).ok_or_else(|| Error::Structural("truncated DQT table".into()))? as u16);
                    cursor += 1;
                } else {
                    let hi = *data.get(cursor).ok_or_else(|| Error::Structural("truncated DQT table".into()))?;
                    let lo = *data.get(cursor + 1).ok_or_else(|| Error::Structural("truncated DQT table".into()))?;
                    values.push(u16::from_be_bytes([hi, lo]));
                    cursor += 2;
                }
            }

            let table = JpegQuantizationTable { table_id, precision, values };

            if let Some(slot) = self.quantization_tables.get_mut(table_id as usize) {
                *slot = Some(table.clone());
            }

            if let Some(cb) = &mut self.events.on_quantization_table {
                cb(&table);
            }
        }

        Ok(())
    }

    fn parse_dht(&mut self) -> Result<()> {
        let data = self.read_segment_payload()?;
        let mut cursor = 0;

        while cursor < data.len() {
            let tc_th = *data.get(cursor).ok_or_else(|| Error::Structural("truncated DHT table".into()))?;
            cursor += 1;
            let table_class = tc_th >> 4;
            let table_id = tc_th & 0x0F;

            let mut code_lengths = [0u8; 16];
            let slice = data.get(cursor..cursor + 16).ok_or_else(|| Error::Structural("truncated DHT code length table".into()))?;
            code_lengths.copy_from_slice(slice);
            cursor += 16;

            let total_values: usize = code_lengths.iter().map(|&b| b as usize).sum();
            let values = data
                .get(cursor..cursor + total_values)
                .ok_or_else(|| Error::Structural("truncated DHT value table".into()))?
                .to_vec();
            cursor += total_values;

            let table = JpegHuffmanTable { table_class, table_id, code_lengths, values };
            let slot_index = (table_class as usize) * 4 + table_id as usize;

            if let Some(slot) = self.huffman_tables.get_mut(slot_index) {
                *slot = Some(table.clone());
            }

            if let Some(cb) = &mut self.events.on_huffman_table {
                cb(&table);
            }
        }

        Ok(())
    }

    fn parse_sof(&mut self, marker: u8) -> Result<()> {
        let data = self.read_segment_payload()?;
        if data.len() < 6 {
            return Err(Error::Structural("truncated SOF segment".into()));
        }

        let precision = data[0];
        let height = u16::from_be_bytes([data[1], data[2]]);
        let width = u16::from_be_bytes([data[3], data[4]]);
        let component_count = data[5] as usize;

        let expected_len = 6 + component_count * 3;
        if data.len() != expected_len {
            return Err(Error::Structural("SOF component count does not match segment length".into()));
        }

        let mut components = Vec::with_capacity(component_count);
        for i in 0..component_count {
            let base = 6 + i * 3;
            components.push(JpegComponent {
                id: data[base],
                horizontal_sampling: data[base + 1] >> 4,
                vertical_sampling: data[base + 1] & 0x0F,
                quantization_table_id: data[base + 2],
            });
        }

        debug!(marker = %format!("{marker:#04x}"), width, height, components = component_count, "jpeg: parsed start of frame");
        if let Some(cb) = &mut self.events.on_start_of_frame {
            cb(&JpegStartOfFrame { marker, precision, height, width, components });
        }

        Ok(())
    }

    fn parse_sos(&mut self) -> Result<()> {
        let data = self.read_segment_payload()?;
        if data.is_empty() {
            return Err(Error::Structural("truncated SOS segment".into()));
        }

        let component_count = data[0] as usize;
        if data.len() < 1 + component_count * 2 + 3 {
            return Err(Error::Structural("SOS segment shorter than its component count implies".into()));
        }

        let mut component_selectors = Vec::with_capacity(component_count);
        for i in 0..component_count {
            let base = 1 + i * 2;
            component_selectors.push((data[base], data[base + 1]));
        }

        let entropy_coded_data = self.read_entropy_coded_data()?;

        if let Some(cb) = &mut self.events.on_scan {
            cb(&JpegScan { component_selectors, entropy_coded_data });
        }

        Ok(())
    }

    /// Reads raw entropy-coded bytes up to (not including) the next real
    /// marker, removing `FF 00` stuffing and passing restart markers
    /// (`FFD0`..`FFD7`) through as literal bytes of the scan. Uses
    /// peek-ahead so the terminating marker itself is left unconsumed for
    /// the main loop's next `read_marker` call.
    fn read_entropy_coded_data(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();

        loop {
            let byte = self.stream.peek_byte(0).ok_or(Error::Stream(bytes_io::Error::Overrun { needed: 1 }))?;

            if byte != MARKER_PREFIX {
                self.stream.skip(1)?;
                data.push(byte);
                continue;
            }

            let next = self.stream.peek_byte(1).ok_or(Error::Stream(bytes_io::Error::Overrun { needed: 1 }))?;
            match next {
                0x00 => {
                    self.stream.skip(2)?;
                    data.push(MARKER_PREFIX);
                }
                0xD0..=0xD7 => {
                    self.stream.skip(2)?;
                    data.push(MARKER_PREFIX);
                    data.push(next);
                }
                _ => return Ok(data),
            }
        }
    }
}

fn parse_exif_ifd(tiff: &[u8]) -> Vec<ExifIfdEntry> {
    if tiff.len() < 8 {
        return Vec::new();
    }

    let little_endian = &tiff[0..2] == b"II";
    let read_u16 = |b: &[u8]| if little_endian { u16::from_le_bytes([b[0], b[1]]) } else { u16::from_be_bytes([b[0], b[1]]) };
    let read_u32 =
        |b: &[u8]| if little_endian { u32::from_le_bytes([b[0], b[1], b[2], b[3]]) } else { u32::from_be_bytes([b[0], b[1], b[2], b[3]]) };

    let ifd_offset = read_u32(&tiff[4..8]) as usize;
    if ifd_offset + 2 > tiff.len() {
        return Vec::new();
    }

    let entry_count = read_u16(&tiff[ifd_offset..ifd_offset + 2]) as usize;
    let mut entries = Vec::with_capacity(entry_count);

    for i in 0..entry_count {
        let base = ifd_offset + 2 + i * 12;
        if base + 12 > tiff.len() {
            break;
        }

        entries.push(ExifIfdEntry {
            tag: read_u16(&tiff[base..base + 2]),
            format: read_u16(&tiff[base + 2..base + 4]),
            count: read_u32(&tiff[base + 4..base + 8]),
            value_offset: read_u32(&tiff[base + 8..base + 12]),
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![MARKER_PREFIX, marker];
        buf.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    fn minimal_baseline_jpeg() -> Vec<u8> {
        let mut buf = vec![MARKER_PREFIX, SOI];

        // SOF0: 8-bit precision, 1x1, one grayscale component
        let mut sof = vec![8, 0, 1, 0, 1, 1];
        sof.extend_from_slice(&[1, 0x11, 0]);
        buf.extend(segment(0xC0, &sof));

        // SOS: one component, spectral selection bytes
        let sos = vec![1, 1, 0, 0, 0, 0];
        buf.extend(segment(SOS, &sos));

        buf.extend_from_slice(&[0xAB, 0xCD, MARKER_PREFIX, 0x00, 0xEF]);
        buf.extend_from_slice(&[MARKER_PREFIX, EOI]);
        buf
    }

    #[test]
    fn parses_minimal_baseline_frame() {
        let sof_seen = Rc::new(RefCell::new(None));
        let sof_clone = sof_seen.clone();
        let scan_seen = Rc::new(RefCell::new(None));
        let scan_clone = scan_seen.clone();
        let ended = Rc::new(RefCell::new(false));
        let ended_clone = ended.clone();

        let events = JpegEventSink::new()
            .on_start_of_frame(move |s: &JpegStartOfFrame| *sof_clone.borrow_mut() = Some(s.clone()))
            .on_scan(move |s: &JpegScan| *scan_clone.borrow_mut() = Some(s.clone()))
            .on_end(move || *ended_clone.borrow_mut() = true);

        let mut parser = JpegParser::new(minimal_baseline_jpeg(), events);
        parser.run().unwrap();

        let sof = sof_seen.borrow();
        let sof = sof.as_ref().unwrap();
        assert_eq!(sof.width, 1);
        assert_eq!(sof.components.len(), 1);

        let scan = scan_seen.borrow();
        let scan = scan.as_ref().unwrap();
        assert_eq!(scan.entropy_coded_data, vec![0xAB, 0xCD, 0xFF, 0xEF]);
        assert!(*ended.borrow());
    }

    #[test]
    fn rejects_missing_soi() {
        let mut parser = JpegParser::new(vec![0, 0, 0], JpegEventSink::new());
        assert!(parser.run().is_err());
    }

    #[test]
    fn parses_quantization_table() {
        let mut buf = vec![MARKER_PREFIX, SOI];
        let mut dqt_payload = vec![0x00]; // precision 0, table id 0
        dqt_payload.extend(std::iter::repeat(1u8).take(64));
        buf.extend(segment(DQT, &dqt_payload));
        buf.extend_from_slice(&[MARKER_PREFIX, EOI]);

        let seen = Rc::new(RefCell::new(None));
        let seen_clone = seen.clone();
        let events = JpegEventSink::new().on_quantization_table(move |t: &JpegQuantizationTable| *seen_clone.borrow_mut() = Some(t.clone()));

        let mut parser = JpegParser::new(buf, events);
        parser.run().unwrap();

        let table = seen.borrow();
        let table = table.as_ref().unwrap();
        assert_eq!(table.values.len(), 64);
        assert_eq!(table.table_id, 0);
        assert!(parser.quantization_table(0).is_some());
        assert!(parser.quantization_table(1).is_none());
    }
}
