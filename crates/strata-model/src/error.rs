use strata_io::{IoError, ReadError};
use strata_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no such attribute: {0}")]
    NoSuchAttribute(String),

    /// Stored content failed validation while reading.
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("wrong API usage: {0}")]
    WrongApiUsage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ModelError {
    /// Whether this failure, raised while reading one child of a composite,
    /// should skip that child instead of failing the whole read.
    pub fn is_recoverable_read(&self) -> bool {
        match self {
            Self::Read(_) => true,
            Self::Io(err) => err.is_backend_failure(),
            _ => false,
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
