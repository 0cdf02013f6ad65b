use thiserror::Error as ThisError;

pub type Result<R, E = Error> = std::result::Result<R, E>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Stream(#[from] bytes_io::Error),

    #[error("structural error: {0}")]
    Structural(String),
}

impl Error {
    pub fn is_overrun(&self) -> bool {
        matches!(self, Error::Stream(e) if e.is_overrun())
    }
}
