//! Binary record codec for Girder
//!
//! This crate implements the versioned binary container:
//! - varint: 7-bit variable-length integer primitives
//! - record: record kinds and container header constants
//! - event: typed build-event payloads
//! - writer: framed record output with wire-level string dedup
//! - reader: lazy record decoding with version negotiation, optional
//!   gzip unwrapping and forward-compatible skipping

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event;
pub mod reader;
pub mod record;
pub mod varint;
pub mod writer;

pub use event::{BuildEvent, Diagnostic, ItemPayload, MessageImportance};
pub use reader::{open_stream, ReaderOptions, RecordReader};
pub use record::{
    Record, RecordKind, FORMAT_VERSION, FORWARD_COMPAT_MIN_VERSION, MIN_READER_VERSION,
};
pub use writer::RecordWriter;
