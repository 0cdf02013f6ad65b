use bytes_io::ByteBuffer;

use crate::error::Result;

/// Output byte sink for the symbol loop. `Fixed` wraps the shared
/// `ByteBuffer` component (§4.C) when the caller supplied an expected
/// decompressed length — the common case, since every ZIP local file
/// header and every GZIP ISIZE trailer carries one. `Growable` is used when
/// no hint is available.
pub(crate) enum Sink {
    Fixed(ByteBuffer),
    Growable(Vec<u8>),
}

impl Sink {
    pub fn new(expected_len: Option<usize>) -> Self {
        match expected_len {
            Some(n) => Sink::Fixed(ByteBuffer::new(n)),
            None => Sink::Growable(Vec::new()),
        }
    }

    pub fn push(&mut self, byte: u8) -> Result<()> {
        match self {
            Sink::Fixed(buf) => buf.insert_byte(byte)?,
            Sink::Growable(v) => v.push(byte),
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        match self {
            Sink::Fixed(buf) => buf.len(),
            Sink::Growable(v) => v.len(),
        }
    }

    pub fn byte_at(&self, idx: usize) -> u8 {
        match self {
            Sink::Fixed(buf) => buf.byte_at(idx).expect("idx bounds checked by caller"),
            Sink::Growable(v) => v[idx],
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Sink::Fixed(buf) => buf.get_data(),
            Sink::Growable(v) => v,
        }
    }
}
