use thiserror::Error as ThisError;

pub type Result<R, E = Error> = std::result::Result<R, E>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("stream error: {0}")]
    Stream(#[from] bytes_io::Error),

    #[error("structural error: {0}")]
    Structural(String),
}

impl Error {
    /// True when the underlying bit stream ran out of buffered input —
    /// recoverable by the archive layer, distinct from a malformed stream.
    pub fn is_overrun(&self) -> bool {
        matches!(self, Error::Stream(e) if e.is_overrun())
    }
}
