//! Girder: a versioned binary build-log container and the build tree
//! reconstructed from it.
//!
//! The workspace splits along the data path:
//!
//! ```text
//! girder (this crate)     convenience entry points, re-exports
//! ├── girder-core         errors, correlation ids, timestamps, traits
//! ├── girder-strings      deduplicating string store with disk spill
//! ├── girder-codec        record container: varints, reader, writer
//! ├── girder-classify     heuristic message classification
//! └── girder-tree         arena tree, target graph, construction engine
//! ```
//!
//! Typical use reads a log file end to end:
//!
//! ```no_run
//! use girder::{read_build, ReaderOptions};
//!
//! let result = read_build("build.log.bin", ReaderOptions::default(), None)?;
//! println!("{} nodes, {} contained errors", result.tree.len(), result.errors.len());
//! # Ok::<(), girder::Error>(())
//! ```

#![warn(missing_docs)]

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

pub use girder_classify::{classify, Classified, Fragment, FragmentKind, MessageContext};
pub use girder_codec::{
    open_stream, BuildEvent, Diagnostic, ItemPayload, MessageImportance, ReaderOptions, Record,
    RecordKind, RecordReader, RecordWriter, FORMAT_VERSION,
};
pub use girder_core::{
    Correlation, DependencyProvider, Error, Result, TargetDefinition, Timestamp, NO_ID,
};
pub use girder_strings::{StringHandle, StringStore};
pub use girder_tree::{BuildResult, BuildTree, Node, NodeId, NodeKind, TargetGraph, TreeBuilder};

/// Read a build log file and reconstruct its tree.
///
/// Header problems (bad preamble, unsupported version) abort with an error.
/// Past the header, construction is best-effort: handler failures are
/// collected into [`BuildResult::errors`] and the partial tree is still
/// returned. A corrupt record stream stops reading at the corruption point
/// with the failure appended to the collected errors.
pub fn read_build(
    path: impl AsRef<Path>,
    options: ReaderOptions,
    provider: Option<Arc<dyn DependencyProvider>>,
) -> Result<BuildResult> {
    let file = File::open(path.as_ref())?;
    tracing::debug!(path = %path.as_ref().display(), "reading build log");
    read_build_from(file, options, provider)
}

/// Like [`read_build`] for an already-open stream (plain or gzip-wrapped).
pub fn read_build_from(
    input: impl Read + 'static,
    options: ReaderOptions,
    provider: Option<Arc<dyn DependencyProvider>>,
) -> Result<BuildResult> {
    let reader = open_stream(input, options)?;
    let builder = TreeBuilder::new(provider);
    let mut stream_errors = Vec::new();

    for record in reader {
        match record {
            Ok(record) => builder.handle(&record.event),
            Err(e) => {
                // The record layer cannot resynchronize past corruption;
                // keep what was built and surface the failure.
                tracing::warn!(error = %e, "record stream ended early");
                stream_errors.push(e);
                break;
            }
        }
    }

    let mut result = builder.finish();
    result.errors.extend(stream_errors);
    Ok(result)
}

/// Write a sequence of events as a complete log: header, every event in
/// order, and the end-of-file marker. Returns the sink.
pub fn write_build<W: std::io::Write>(out: W, events: &[BuildEvent]) -> Result<W> {
    let mut writer = RecordWriter::new(out)?;
    for event in events {
        writer.write(event)?;
    }
    writer.finish()
}

/// Like [`write_build`] with whole-stream gzip compression.
pub fn write_build_compressed<W: std::io::Write>(out: W, events: &[BuildEvent]) -> Result<W> {
    let mut writer = RecordWriter::new_compressed(out)?;
    for event in events {
        writer.write(event)?;
    }
    let encoder = writer.finish()?;
    Ok(encoder.finish()?)
}

/// Write a complete log file at `path`, optionally gzip-wrapped.
pub fn write_build_file(
    path: impl AsRef<Path>,
    events: &[BuildEvent],
    compress: bool,
) -> Result<()> {
    let file = File::create(path.as_ref())?;
    if compress {
        write_build_compressed(file, events)?;
    } else {
        write_build(file, events)?;
    }
    Ok(())
}
