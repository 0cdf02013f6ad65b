use thiserror::Error as ThisError;

pub type Result<R, E = Error> = std::result::Result<R, E>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Stream(#[from] bytes_io::Error),

    #[error(transparent)]
    Inflate(#[from] inflate_rfc1951::Error),

    #[error("structural error: {0}")]
    Structural(String),
}

impl Error {
    pub fn is_overrun(&self) -> bool {
        match self {
            Error::Stream(e) => e.is_overrun(),
            Error::Inflate(e) => e.is_overrun(),
            Error::Structural(_) => false,
        }
    }
}
