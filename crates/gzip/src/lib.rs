//! GZIP (RFC 1952) single-member decoder: header parse plus a raw DEFLATE
//! payload, delegated to `inflate-rfc1951`.

#![allow(dead_code)]

mod decoder;
mod error;
mod header;

pub use decoder::GunzipDecoder;
pub use error::{Error, Result};
pub use header::{Flags, GzipHeader};
