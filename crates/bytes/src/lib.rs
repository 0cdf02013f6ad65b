//! Dependency-free bit/byte stream primitives shared by every codec in this
//! toolkit: forward-only pull readers over a paged (multi-buffer) byte
//! sequence, and fixed-capacity append-only write buffers.

#![allow(dead_code)]

mod bit_buffer;
mod bit_stream;
mod byte_buffer;
mod byte_stream;
mod error;
mod paged;

pub use bit_buffer::BitBuffer;
pub use bit_stream::{BitDirection, BitStream};
pub use byte_buffer::ByteBuffer;
pub use byte_stream::{ByteStream, Endianness};
pub use error::{Error, Result};
