//! Record kinds and the container header constants.
//!
//! # Container Layout
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Format version (7-bit varint)                 │
//! ├───────────────────────────────────────────────┤
//! │ Minimum reader version (7-bit varint)         │  if version >= 2
//! ├───────────────────────────────────────────────┤
//! │ Record 1: kind (varint) + length (varint)     │
//! │           + payload                           │
//! ├───────────────────────────────────────────────┤
//! │ ...                                           │
//! ├───────────────────────────────────────────────┤
//! │ EndOfFile record: kind 0, length 0            │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The payload length makes every record self-delimiting, so a reader that
//! opts in to forward compatibility can skip kinds it does not recognize.
//! The whole stream may additionally be gzip-wrapped; that is detected and
//! undone outside the record layer.

use crate::event::BuildEvent;

/// Current container format version written by this crate.
pub const FORMAT_VERSION: u32 = 3;

/// First format version whose records are length-prefixed and therefore
/// skippable. Files at or above this version also declare a minimum reader
/// version in the header.
pub const FORWARD_COMPAT_MIN_VERSION: u32 = 2;

/// Minimum reader version declared in files this crate writes.
pub const MIN_READER_VERSION: u32 = 2;

/// Kind tag of one framed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    /// Reserved stream terminator
    EndOfFile = 0,
    /// Build start event
    BuildStarted = 1,
    /// Build finish event
    BuildFinished = 2,
    /// Project start event
    ProjectStarted = 3,
    /// Project finish event
    ProjectFinished = 4,
    /// Target start event
    TargetStarted = 5,
    /// Target finish event
    TargetFinished = 6,
    /// Task start event
    TaskStarted = 7,
    /// Task finish event
    TaskFinished = 8,
    /// Free-form message event
    Message = 9,
    /// Warning diagnostic
    Warning = 10,
    /// Error diagnostic
    Error = 11,
    /// Custom/extended event
    Extended = 12,
    /// String-table entry
    String = 13,
    /// Embedded binary payload
    Blob = 14,
}

impl RecordKind {
    /// Map a wire tag to a kind, `None` for tags this reader does not know.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => RecordKind::EndOfFile,
            1 => RecordKind::BuildStarted,
            2 => RecordKind::BuildFinished,
            3 => RecordKind::ProjectStarted,
            4 => RecordKind::ProjectFinished,
            5 => RecordKind::TargetStarted,
            6 => RecordKind::TargetFinished,
            7 => RecordKind::TaskStarted,
            8 => RecordKind::TaskFinished,
            9 => RecordKind::Message,
            10 => RecordKind::Warning,
            11 => RecordKind::Error,
            12 => RecordKind::Extended,
            13 => RecordKind::String,
            14 => RecordKind::Blob,
            _ => return None,
        })
    }

    /// Wire tag for this kind.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// One decoded record: frame coordinates plus the typed event.
///
/// String-table records are consumed by the reader itself and never
/// surfaced; `EndOfFile` terminates the sequence instead of appearing in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Kind tag
    pub kind: RecordKind,
    /// Byte offset of the kind tag in the (decompressed) stream
    pub start: u64,
    /// Payload length in bytes
    pub length: u64,
    /// Decoded event
    pub event: BuildEvent,
}
