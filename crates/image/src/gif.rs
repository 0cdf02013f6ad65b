use bytes_io::{ByteStream, Endianness};
use tracing::{debug, warn};

use crate::error::{Error, Result};

const SIGNATURE_87A: &[u8; 6] = b"GIF87a";
const SIGNATURE_89A: &[u8; 6] = b"GIF89a";

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_SEPARATOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
const COMMENT_LABEL: u8 = 0xFE;
const PLAIN_TEXT_LABEL: u8 = 0x01;
const APPLICATION_LABEL: u8 = 0xFF;

#[derive(Debug, Clone, Copy)]
pub struct GifLogicalScreen {
    pub width: u16,
    pub height: u16,
    pub has_global_color_table: bool,
    pub color_resolution: u8,
    pub global_color_table_size: usize,
    pub background_color_index: u8,
    pub pixel_aspect_ratio: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct GifImageDescriptor {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub has_local_color_table: bool,
    pub interlaced: bool,
    pub local_color_table_size: usize,
}

#[derive(Debug, Clone)]
pub struct GifImage {
    pub descriptor: GifImageDescriptor,
    pub local_color_table: Option<Vec<[u8; 3]>>,
    pub lzw_min_code_size: u8,
    pub compressed_data: Vec<u8>,
    /// The graphic control extension immediately preceding this image, if
    /// any — disposal method, delay, and transparency apply to this frame.
    pub graphic_control: Option<GifGraphicControl>,
}

#[derive(Debug, Clone, Copy)]
pub struct GifGraphicControl {
    pub disposal_method: u8,
    pub user_input_flag: bool,
    pub transparent_color_flag: bool,
    pub delay_time: u16,
    pub transparent_color_index: u8,
}

#[derive(Debug, Clone)]
pub struct GifApplicationExtension {
    pub identifier: String,
    pub authentication_code: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct GifPlainTextExtension {
    pub text: Vec<u8>,
}

#[derive(Default)]
pub struct GifEventSink {
    pub on_logical_screen: Option<Box<dyn FnMut(&GifLogicalScreen)>>,
    pub on_global_color_table: Option<Box<dyn FnMut(&[[u8; 3]])>>,
    pub on_graphic_control: Option<Box<dyn FnMut(&GifGraphicControl)>>,
    pub on_image: Option<Box<dyn FnMut(&GifImage)>>,
    pub on_comment: Option<Box<dyn FnMut(&str)>>,
    pub on_plain_text: Option<Box<dyn FnMut(&GifPlainTextExtension)>>,
    pub on_application: Option<Box<dyn FnMut(&GifApplicationExtension)>>,
    pub on_trailer: Option<Box<dyn FnMut()>>,
    pub on_error: Option<Box<dyn FnMut(&str)>>,
}

impl GifEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_logical_screen(mut self, f: impl FnMut(&GifLogicalScreen) + 'static) -> Self {
        self.on_logical_screen = Some(Box::new(f));
        self
    }

    pub fn on_global_color_table(mut self, f: impl FnMut(&[[u8; 3]]) + 'static) -> Self {
        self.on_global_color_table = Some(Box::new(f));
        self
    }

    pub fn on_graphic_control(mut self, f: impl FnMut(&GifGraphicControl) + 'static) -> Self {
        self.on_graphic_control = Some(Box::new(f));
        self
    }

    pub fn on_image(mut self, f: impl FnMut(&GifImage) + 'static) -> Self {
        self.on_image = Some(Box::new(f));
        self
    }

    pub fn on_comment(mut self, f: impl FnMut(&str) + 'static) -> Self {
        self.on_comment = Some(Box::new(f));
        self
    }

    pub fn on_application(mut self, f: impl FnMut(&GifApplicationExtension) + 'static) -> Self {
        self.on_application = Some(Box::new(f));
        self
    }

    pub fn on_trailer(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_trailer = Some(Box::new(f));
        self
    }
}

/// Drives the GIF87a/89a block grammar. LZW sub-blocks are collected as raw
/// bytes (length-prefixed sub-block framing stripped) and handed to callers
/// uninflated: pixel decompression is out of scope here, only container
/// parsing.
pub struct GifParser {
    stream: ByteStream,
    events: GifEventSink,
    pending_graphic_control: Option<GifGraphicControl>,
}

impl GifParser {
    pub fn new(data: Vec<u8>) -> Self {
        Self::with_events(data, GifEventSink::new())
    }

    pub fn with_events(data: Vec<u8>, events: GifEventSink) -> Self {
        let mut stream = ByteStream::new(data);
        stream.set_endianness(Endianness::Little);
        Self { stream, events, pending_graphic_control: None }
    }

    pub fn run(&mut self) -> Result<()> {
        if let Err(e) = self.run_inner() {
            warn!(error = %e, "gif: failed to parse");
            if let Some(cb) = &mut self.events.on_error {
                cb(&e.to_string());
            }
            return Err(e);
        }
        Ok(())
    }

    fn run_inner(&mut self) -> Result<()> {
        self.parse_signature()?;
        self.parse_logical_screen()?;

        loop {
            let introducer = self.stream.read_bytes(1)?[0];
            match introducer {
                EXTENSION_INTRODUCER => self.parse_extension()?,
                IMAGE_SEPARATOR => self.parse_image()?,
                TRAILER => {
                    if let Some(cb) = &mut self.events.on_trailer {
                        cb();
                    }
                    return Ok(());
                }
                other => return Err(Error::Structural(format!("unexpected GIF block introducer {other:#04x}"))),
            }
        }
    }

    fn parse_signature(&mut self) -> Result<()> {
        let sig = self.stream.read_bytes(6)?;
        if sig.as_slice() != SIGNATURE_87A && sig.as_slice() != SIGNATURE_89A {
            return Err(Error::Structural("not a GIF file: bad signature".into()));
        }
        Ok(())
    }

    fn parse_logical_screen(&mut self) -> Result<()> {
        let width = self.stream.read_number(2)? as u16;
        let height = self.stream.read_number(2)? as u16;
        let packed = self.stream.read_bytes(1)?[0];
        let background_color_index = self.stream.read_bytes(1)?[0];
        let pixel_aspect_ratio = self.stream.read_bytes(1)?[0];

        let has_global_color_table = packed & 0x80 != 0;
        let color_resolution = (packed >> 4) & 0x07;
        let table_size_exp = packed & 0x07;
        let global_color_table_size = if has_global_color_table { 2usize << table_size_exp } else { 0 };

        let screen = GifLogicalScreen {
            width,
            height,
            has_global_color_table,
            color_resolution,
            global_color_table_size,
            background_color_index,
            pixel_aspect_ratio,
        };

        debug!(width, height, has_global_color_table, "gif: parsed logical screen descriptor");
        if let Some(cb) = &mut self.events.on_logical_screen {
            cb(&screen);
        }

        if has_global_color_table {
            let table = self.read_color_table(global_color_table_size)?;
            if let Some(cb) = &mut self.events.on_global_color_table {
                cb(&table);
            }
        }

        Ok(())
    }

    fn read_color_table(&mut self, entries: usize) -> Result<Vec<[u8; 3]>> {
        let raw = self.stream.read_bytes(entries * 3)?;
        Ok(raw.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
    }

    fn read_sub_blocks(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        loop {
            let len = self.stream.read_bytes(1)?[0] as usize;
            if len == 0 {
                return Ok(data);
            }
            data.extend(self.stream.read_bytes(len)?);
        }
    }

    fn parse_extension(&mut self) -> Result<()> {
        let label = self.stream.read_bytes(1)?[0];
        match label {
            GRAPHIC_CONTROL_LABEL => {
                let block_size = self.stream.read_bytes(1)?[0];
                if block_size != 4 {
                    return Err(Error::Structural("graphic control extension must be 4 bytes".into()));
                }
                let packed = self.stream.read_bytes(1)?[0];
                let delay_time = self.stream.read_number(2)? as u16;
                let transparent_color_index = self.stream.read_bytes(1)?[0];
                self.stream.skip(1)?; // block terminator

                let control = GifGraphicControl {
                    disposal_method: (packed >> 2) & 0x07,
                    user_input_flag: packed & 0x02 != 0,
                    transparent_color_flag: packed & 0x01 != 0,
                    delay_time,
                    transparent_color_index,
                };

                if let Some(cb) = &mut self.events.on_graphic_control {
                    cb(&control);
                }
                self.pending_graphic_control = Some(control);
            }
            COMMENT_LABEL => {
                let data = self.read_sub_blocks()?;
                let text = String::from_utf8_lossy(&data).into_owned();
                if let Some(cb) = &mut self.events.on_comment {
                    cb(&text);
                }
            }
            PLAIN_TEXT_LABEL => {
                let block_size = self.stream.read_bytes(1)?[0];
                self.stream.skip(block_size as usize)?;
                let text = self.read_sub_blocks()?;
                if let Some(cb) = &mut self.events.on_plain_text {
                    cb(&GifPlainTextExtension { text });
                }
            }
            APPLICATION_LABEL => {
                let block_size = self.stream.read_bytes(1)?[0];
                if block_size != 11 {
                    return Err(Error::Structural("application extension must be 11 bytes".into()));
                }
                let identifier = self.stream.read_string(8)?;
                let authentication_code = self.stream.read_string(3)?;
                let data = self.read_sub_blocks()?;

                if let Some(cb) = &mut self.events.on_application {
                    cb(&GifApplicationExtension { identifier, authentication_code, data });
                }
            }
            other => {
                // unknown extension: length-prefixed sub-blocks still frame it, skip uninterpreted.
                let block_size = self.stream.read_bytes(1)?[0];
                self.stream.skip(block_size as usize)?;
                let _ = self.read_sub_blocks()?;
                let _ = other;
            }
        }

        Ok(())
    }

    fn parse_image(&mut self) -> Result<()> {
        let left = self.stream.read_number(2)? as u16;
        let top = self.stream.read_number(2)? as u16;
        let width = self.stream.read_number(2)? as u16;
        let height = self.stream.read_number(2)? as u16;
        let packed = self.stream.read_bytes(1)?[0];

        let has_local_color_table = packed & 0x80 != 0;
        let interlaced = packed & 0x40 != 0;
        let table_size_exp = packed & 0x07;
        let local_color_table_size = if has_local_color_table { 2usize << table_size_exp } else { 0 };

        let local_color_table =
            if has_local_color_table { Some(self.read_color_table(local_color_table_size)?) } else { None };

        let lzw_min_code_size = self.stream.read_bytes(1)?[0];
        let compressed_data = self.read_sub_blocks()?;

        let descriptor = GifImageDescriptor {
            left,
            top,
            width,
            height,
            has_local_color_table,
            interlaced,
            local_color_table_size,
        };

        let graphic_control = self.pending_graphic_control.take();

        if let Some(cb) = &mut self.events.on_image {
            cb(&GifImage { descriptor, local_color_table, lzw_min_code_size, compressed_data, graphic_control });
        }

        Ok(())
    }
}
