use thiserror::Error as ThisError;

pub type Result<R, E = Error> = std::result::Result<R, E>;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Streams exhausted before the requested amount of data could be produced.
    ///
    /// Recoverable: callers above the stream layer (archive decoders) catch
    /// this and move to a "waiting for more bytes" state until `push()` is
    /// called again.
    #[error("buffer overrun: needed {needed} more byte(s)")]
    Overrun { needed: usize },

    #[error("bad bit count {0} for read_bits/peek_bits, must be 1..=32")]
    InvalidBitCount(u32),

    #[error("bad byte count {0} for write_number/write_signed_number, must be 1..=4")]
    InvalidByteCount(usize),

    #[error("value {value} does not fit in {bytes} byte(s)")]
    ValueOutOfRange { value: i64, bytes: usize },

    #[error("string is not ASCII: {0:?}")]
    NonAscii(String),

    #[error("buffer capacity exceeded: wrote {written}, capacity {capacity}")]
    CapacityExceeded { written: usize, capacity: usize },

    #[error("UTF-8 error: {0:?}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// True if this is the recoverable "need more input" signal rather than
    /// a structural/programmer error.
    pub fn is_overrun(&self) -> bool {
        matches!(self, Error::Overrun { .. })
    }
}
