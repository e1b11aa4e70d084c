//! Error types for the spreadblock format.

use std::io;
use thiserror::Error;

/// The result type used throughout spreadblock.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for block encoding and decoding.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error from the underlying stream.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed block, meta or column binary bytes.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A reader or writer was driven out of order.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The configured block size cannot hold the requested content.
    #[error("Block size exceeded: {0}")]
    BlockSizeExceeded(String),

    /// A maker, compressor or encryptor name did not resolve.
    #[error("Unknown {kind} identifier: {name}")]
    UnknownIdentifier {
        /// What kind of identifier was looked up.
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// A compressor failed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// An encryptor failed, or authentication did not verify.
    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Creates a new block size error.
    pub fn block_size_exceeded(msg: impl Into<String>) -> Self {
        Error::BlockSizeExceeded(msg.into())
    }

    /// Creates an error for an identifier that is not registered.
    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Error::UnknownIdentifier { kind, name: name.into() }
    }

    /// Creates a new encryption error.
    pub fn encryption(msg: impl Into<String>) -> Self {
        Error::Encryption(msg.into())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::InvalidArgument(format!("invalid pattern: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("test corruption");
        assert_eq!(err.to_string(), "Data corruption: test corruption");

        let err = Error::unknown("compressor", "zz");
        assert_eq!(err.to_string(), "Unknown compressor identifier: zz");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_regex() {
        let err: Error = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
