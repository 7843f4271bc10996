//! String deduplication store for Girder
//!
//! Record fields reference string payloads through opaque handles. Short
//! strings stay resident in memory; strings at or above the spill threshold
//! are written once to an anonymous temp file and addressed by
//! `(offset, length)` thereafter, bounding memory for logs that embed large
//! property values or file contents.
//!
//! Identical content is stored at most once. Retrieval is byte-identical to
//! what was added, including across flush boundaries.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod store;

pub use store::{StringHandle, StringStore, SPILL_THRESHOLD};
