//! Error taxonomy shared by every codec operation.
//!
//! A single malformed or unreadable record aborts the whole open/decode/encode
//! call; nothing is retried and no partially parsed state escapes.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MfError {
    /// The underlying stream failed to read, write or seek.
    #[error("I/O operation failed: {0}")]
    Io(#[source] io::Error),
    /// Structural violation: bad mnemonic, truncated payload, unexpected record.
    #[error("Invalid file: {0}")]
    InvalidFile(String),
    #[error("Unsupported feature required: {0}")]
    UnsupportedFeature(String),
    /// The caller asked for something the block cannot satisfy.
    #[error("Invalid read request: {0}")]
    InvalidReadRequest(String),
    #[error("Missing property: {0}")]
    MissingProperty(String),
    /// The handle's stream was already released by `close()`.
    #[error("Container is closed")]
    Closed,
}

impl From<io::Error> for MfError {
    /// Running out of bytes mid-record means the file is truncated, which is
    /// a structural problem rather than a failing device.
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            MfError::InvalidFile(format!("unexpected end of file ({err})"))
        } else {
            MfError::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, MfError>;
