//! Error types shared across the Girder crates.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations. The variants follow the error taxonomy of the binary
//! container: framing and version errors are fatal to a read, construction
//! errors are collected and the decode continues.

use std::io;
use thiserror::Error;

/// Result type alias for Girder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for container reading/writing and tree construction
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, stream reads/writes)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed framing: bad length/tag, or end-of-stream mid-record
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// File demands a newer reader than this one
    #[error("File requires reader version {minimum_reader}, this reader is version {reader}")]
    UnsupportedVersion {
        /// Minimum reader version declared by the file
        minimum_reader: u32,
        /// Version of the running reader
        reader: u32,
    },

    /// Record kind tag this reader does not recognize
    #[error("Unknown record kind: {0}")]
    UnknownRecordKind(u8),

    /// Blob payload exceeds the 32-bit signed length limit
    #[error("Blob length {0} exceeds the maximum of {max}", max = i32::MAX)]
    BlobTooLarge(u64),

    /// A single event handler failed during tree construction
    #[error("Construction error: {0}")]
    Construction(String),

    /// A string handle did not resolve to stored content
    #[error("Invalid string handle")]
    InvalidHandle,
}

impl Error {
    /// Framing-corruption error for a premature end of stream.
    pub fn unexpected_eof(context: &str) -> Self {
        Error::Corruption(format!("unexpected end of stream while reading {context}"))
    }
}
