//! File I/O error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Could not resolve sample path: {0}")]
    Unresolved(String),

    #[error("Unsupported channel count: {0}")]
    UnsupportedChannelCount(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("WAV error: {0}")]
    Wav(String),
}

pub type FileResult<T> = Result<T, FileError>;

impl From<hound::Error> for FileError {
    fn from(err: hound::Error) -> Self {
        FileError::Wav(err.to_string())
    }
}
