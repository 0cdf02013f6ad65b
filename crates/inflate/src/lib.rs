//! RFC 1951 DEFLATE decoder: canonical Huffman table construction, fixed
//! and dynamic blocks, length/distance back-references including
//! self-overlapping copies.

#![allow(dead_code)]

mod error;
mod huffman;
mod sink;
mod tables;

use bytes_io::{BitDirection, BitStream};
use tracing::{debug, trace};

pub use error::{Error, Result};

use huffman::HuffmanTable;
use sink::Sink;
use tables::{fixed_distance_lengths, fixed_literal_lengths, CODE_LENGTH_ORDER, DISTANCE_TABLE, LENGTH_TABLE};

/// Behavior knobs for the stored-block path. Open Question (iii) in the
/// spec flags that NLEN verification should be configurable rather than
/// silently skipped or silently fatal; default matches RFC 1951's intent.
#[derive(Debug, Clone, Copy)]
pub struct InflateOptions {
    /// Verify that a stored block's NLEN equals the ones-complement of LEN.
    pub verify_stored_nlen: bool,
}

impl Default for InflateOptions {
    fn default() -> Self {
        Self { verify_stored_nlen: true }
    }
}

/// Decompresses a complete DEFLATE stream. `expected_len`, when known (e.g.
/// a ZIP local file header's uncompressed-size field), sizes the output
/// buffer exactly and makes an over-long stream a hard error rather than an
/// unbounded allocation.
pub fn inflate(data: &[u8], expected_len: Option<usize>) -> Result<Vec<u8>> {
    inflate_with_options(data, expected_len, InflateOptions::default())
}

pub fn inflate_with_options(data: &[u8], expected_len: Option<usize>, options: InflateOptions) -> Result<Vec<u8>> {
    #[cfg(feature = "native-fallback")]
    if let Some(out) = try_native(data, expected_len) {
        debug!(len = out.len(), "inflate: native fallback succeeded");
        return Ok(out);
    }

    inflate_manual(data, expected_len, options)
}

#[cfg(feature = "native-fallback")]
fn try_native(data: &[u8], expected_len: Option<usize>) -> Option<Vec<u8>> {
    use std::io::Read;

    use flate2::read::DeflateDecoder;

    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::with_capacity(expected_len.unwrap_or(data.len().saturating_mul(3)));

    decoder.read_to_end(&mut out).ok()?;

    Some(out)
}

fn inflate_manual(data: &[u8], expected_len: Option<usize>, options: InflateOptions) -> Result<Vec<u8>> {
    let mut bits = BitStream::new(data.to_vec(), BitDirection::Ltm);
    let mut sink = Sink::new(expected_len);

    loop {
        let bfinal = bits.read_bits(1)?;
        let btype = bits.read_bits(2)?;

        trace!(bfinal, btype, "inflate: block header");

        match btype {
            0 => decode_stored_block(&mut bits, &mut sink, options)?,
            1 => {
                let lit = HuffmanTable::build(&fixed_literal_lengths())?;
                let dist = HuffmanTable::build(&fixed_distance_lengths())?;
                decode_compressed_block(&mut bits, &mut sink, &lit, &dist)?;
            }
            2 => {
                let (lit, dist) = read_dynamic_tables(&mut bits)?;
                decode_compressed_block(&mut bits, &mut sink, &lit, &dist)?;
            }
            _ => return Err(Error::Structural("reserved BTYPE 11 in DEFLATE block header".into())),
        }

        if bfinal == 1 {
            break;
        }
    }

    Ok(sink.into_vec())
}

fn decode_stored_block(bits: &mut BitStream, sink: &mut Sink, options: InflateOptions) -> Result<()> {
    bits.align_to_byte();

    let header = bits.read_bytes(4)?;
    let len = u16::from_le_bytes([header[0], header[1]]);
    let nlen = u16::from_le_bytes([header[2], header[3]]);

    if options.verify_stored_nlen && nlen != !len {
        return Err(Error::Structural(format!(
            "stored block NLEN {nlen:#06x} is not the ones-complement of LEN {len:#06x}"
        )));
    }

    let payload = bits.read_bytes(len as usize)?;

    for byte in payload {
        sink.push(byte)?;
    }

    Ok(())
}

fn decode_compressed_block(
    bits: &mut BitStream,
    sink: &mut Sink,
    literal_table: &HuffmanTable,
    distance_table: &HuffmanTable,
) -> Result<()> {
    loop {
        let symbol = literal_table.decode(bits)?;

        match symbol {
            0..=255 => sink.push(symbol as u8)?,
            256 => return Ok(()),
            257..=285 => {
                let (base, extra_bits) = LENGTH_TABLE[symbol as usize - 257];
                let extra = if extra_bits > 0 { bits.read_bits(extra_bits as u32)? } else { 0 };
                let length = base as u32 + extra;

                let dist_symbol = distance_table.decode(bits)?;
                let (dist_base, dist_extra_bits) = DISTANCE_TABLE
                    .get(dist_symbol as usize)
                    .copied()
                    .ok_or_else(|| Error::Structural(format!("invalid distance symbol {dist_symbol}")))?;
                let dist_extra = if dist_extra_bits > 0 { bits.read_bits(dist_extra_bits as u32)? } else { 0 };
                let distance = dist_base as u32 + dist_extra;

                copy_back_reference(sink, distance as usize, length as usize)?;
            }
            _ => return Err(Error::Structural(format!("invalid literal/length symbol {symbol}"))),
        }
    }
}

/// Copies `length` bytes from `distance` bytes before the current output
/// position, byte by byte so self-overlapping runs (distance < length)
/// replicate correctly.
fn copy_back_reference(sink: &mut Sink, distance: usize, length: usize) -> Result<()> {
    let start = sink
        .len()
        .checked_sub(distance)
        .ok_or_else(|| Error::Structural(format!("back-reference distance {distance} exceeds output produced so far")))?;

    for i in 0..length {
        let byte = sink.byte_at(start + i);
        sink.push(byte)?;
    }

    Ok(())
}

fn read_dynamic_tables(bits: &mut BitStream) -> Result<(HuffmanTable, HuffmanTable)> {
    let hlit = bits.read_bits(5)? as usize + 257;
    let hdist = bits.read_bits(5)? as usize + 1;
    let hclen = bits.read_bits(4)? as usize + 4;

    let mut code_length_lengths = [0u8; 19];

    for &position in CODE_LENGTH_ORDER.iter().take(hclen) {
        code_length_lengths[position] = bits.read_bits(3)? as u8;
    }

    let code_length_table = HuffmanTable::build(&code_length_lengths)?;

    let mut lengths = Vec::with_capacity(hlit + hdist);

    while lengths.len() < hlit + hdist {
        let symbol = code_length_table.decode(bits)?;

        match symbol {
            0..=15 => lengths.push(symbol as u8),
            16 => {
                let repeat = bits.read_bits(2)? + 3;
                let previous = *lengths
                    .last()
                    .ok_or_else(|| Error::Structural("code-length symbol 16 with no previous length to repeat".into()))?;

                lengths.extend(std::iter::repeat(previous).take(repeat as usize));
            }
            17 => {
                let repeat = bits.read_bits(3)? + 3;
                lengths.extend(std::iter::repeat(0).take(repeat as usize));
            }
            18 => {
                let repeat = bits.read_bits(7)? + 11;
                lengths.extend(std::iter::repeat(0).take(repeat as usize));
            }
            other => return Err(Error::Structural(format!("invalid code-length alphabet symbol {other}"))),
        }
    }

    lengths.truncate(hlit + hdist);

    let literal_table = HuffmanTable::build(&lengths[..hlit])?;
    let distance_table = HuffmanTable::build(&lengths[hlit..])?;

    Ok((literal_table, distance_table))
}
