//! Record stream writer.
//!
//! Appends framed records to a byte sink: header first, then one record per
//! event, then the `EndOfFile` sentinel on `finish`. String payloads are
//! deduplicated at encode time — each unique value is written once as a
//! `String` record and referenced by index afterwards.

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::GzEncoder;
use flate2::Compression;
use girder_core::{Correlation, Error, Result, Timestamp};
use rustc_hash::FxHashMap;
use std::io::{Read, Write};

use crate::event::{BuildEvent, Diagnostic, ItemPayload};
use crate::record::{RecordKind, FORMAT_VERSION, MIN_READER_VERSION};
use crate::varint;

/// Writes a record stream to an underlying byte sink.
pub struct RecordWriter<W: Write> {
    out: W,
    /// Unique string content -> 1-based wire index.
    strings: FxHashMap<String, u32>,
    next_string: u32,
}

impl<W: Write> RecordWriter<W> {
    /// Start a stream: writes the format version and minimum reader version.
    pub fn new(mut out: W) -> Result<Self> {
        varint::write_u32(&mut out, FORMAT_VERSION)?;
        varint::write_u32(&mut out, MIN_READER_VERSION)?;
        Ok(RecordWriter {
            out,
            strings: FxHashMap::default(),
            next_string: 1,
        })
    }

    /// Append one event as a framed record.
    pub fn write(&mut self, event: &BuildEvent) -> Result<()> {
        match event {
            BuildEvent::BuildStarted { timestamp } => {
                let mut payload = Vec::new();
                put_timestamp(&mut payload, *timestamp)?;
                self.emit(RecordKind::BuildStarted, &payload)
            }
            BuildEvent::BuildFinished {
                timestamp,
                succeeded,
            } => {
                let mut payload = Vec::new();
                put_timestamp(&mut payload, *timestamp)?;
                payload.push(u8::from(*succeeded));
                self.emit(RecordKind::BuildFinished, &payload)
            }
            BuildEvent::ProjectStarted {
                correlation,
                parent_project_context_id,
                timestamp,
                project_file,
                target_names,
                global_properties,
                properties,
            } => {
                let file_idx = self.intern(project_file)?;
                let targets_idx = self.intern_opt(target_names.as_deref())?;
                let globals = self.intern_pairs(global_properties)?;
                let props = self.intern_pairs(properties)?;
                let mut payload = Vec::new();
                put_correlation(&mut payload, correlation)?;
                varint::write_i32(&mut payload, *parent_project_context_id)?;
                put_timestamp(&mut payload, *timestamp)?;
                varint::write_u32(&mut payload, file_idx)?;
                varint::write_u32(&mut payload, targets_idx)?;
                put_pairs(&mut payload, &globals)?;
                put_pairs(&mut payload, &props)?;
                self.emit(RecordKind::ProjectStarted, &payload)
            }
            BuildEvent::ProjectFinished {
                project_context_id,
                timestamp,
                succeeded,
            } => {
                let mut payload = Vec::new();
                varint::write_i32(&mut payload, *project_context_id)?;
                put_timestamp(&mut payload, *timestamp)?;
                payload.push(u8::from(*succeeded));
                self.emit(RecordKind::ProjectFinished, &payload)
            }
            BuildEvent::TargetStarted {
                correlation,
                timestamp,
                target_name,
                parent_target,
                source_file,
            } => {
                let name_idx = self.intern(target_name)?;
                let parent_idx = self.intern_opt(parent_target.as_deref())?;
                let source_idx = self.intern_opt(source_file.as_deref())?;
                let mut payload = Vec::new();
                put_correlation(&mut payload, correlation)?;
                put_timestamp(&mut payload, *timestamp)?;
                varint::write_u32(&mut payload, name_idx)?;
                varint::write_u32(&mut payload, parent_idx)?;
                varint::write_u32(&mut payload, source_idx)?;
                self.emit(RecordKind::TargetStarted, &payload)
            }
            BuildEvent::TargetFinished {
                correlation,
                timestamp,
                target_name,
                succeeded,
                outputs,
            } => {
                let name_idx = self.intern(target_name)?;
                let items = self.intern_items(outputs)?;
                let mut payload = Vec::new();
                put_correlation(&mut payload, correlation)?;
                put_timestamp(&mut payload, *timestamp)?;
                varint::write_u32(&mut payload, name_idx)?;
                payload.push(u8::from(*succeeded));
                put_items(&mut payload, &items)?;
                self.emit(RecordKind::TargetFinished, &payload)
            }
            BuildEvent::TaskStarted {
                correlation,
                timestamp,
                task_name,
                source_file,
                line,
            } => {
                let name_idx = self.intern(task_name)?;
                let source_idx = self.intern_opt(source_file.as_deref())?;
                let mut payload = Vec::new();
                put_correlation(&mut payload, correlation)?;
                put_timestamp(&mut payload, *timestamp)?;
                varint::write_u32(&mut payload, name_idx)?;
                varint::write_u32(&mut payload, source_idx)?;
                varint::write_u32(&mut payload, *line)?;
                self.emit(RecordKind::TaskStarted, &payload)
            }
            BuildEvent::TaskFinished {
                correlation,
                timestamp,
                task_name,
                succeeded,
            } => {
                let name_idx = self.intern(task_name)?;
                let mut payload = Vec::new();
                put_correlation(&mut payload, correlation)?;
                put_timestamp(&mut payload, *timestamp)?;
                varint::write_u32(&mut payload, name_idx)?;
                payload.push(u8::from(*succeeded));
                self.emit(RecordKind::TaskFinished, &payload)
            }
            BuildEvent::Message {
                correlation,
                timestamp,
                importance,
                text,
            } => {
                let text_idx = self.intern(text)?;
                let mut payload = Vec::new();
                put_correlation(&mut payload, correlation)?;
                put_timestamp(&mut payload, *timestamp)?;
                payload.push(importance.to_u8());
                varint::write_u32(&mut payload, text_idx)?;
                self.emit(RecordKind::Message, &payload)
            }
            BuildEvent::Warning(diag) => {
                let payload = self.encode_diagnostic(diag)?;
                self.emit(RecordKind::Warning, &payload)
            }
            BuildEvent::Error(diag) => {
                let payload = self.encode_diagnostic(diag)?;
                self.emit(RecordKind::Error, &payload)
            }
            BuildEvent::Extended {
                correlation,
                timestamp,
                event_type,
                fields,
                text,
            } => {
                let type_idx = self.intern(event_type)?;
                let pairs = self.intern_pairs(fields)?;
                let text_idx = self.intern_opt(text.as_deref())?;
                let mut payload = Vec::new();
                put_correlation(&mut payload, correlation)?;
                put_timestamp(&mut payload, *timestamp)?;
                varint::write_u32(&mut payload, type_idx)?;
                put_pairs(&mut payload, &pairs)?;
                varint::write_u32(&mut payload, text_idx)?;
                self.emit(RecordKind::Extended, &payload)
            }
            BuildEvent::Blob { name, bytes } => {
                if bytes.len() as u64 > i32::MAX as u64 {
                    return Err(Error::BlobTooLarge(bytes.len() as u64));
                }
                let name_idx = self.intern(name)?;
                let mut payload = Vec::with_capacity(bytes.len() + 8);
                varint::write_u32(&mut payload, name_idx)?;
                varint::write_u64(&mut payload, bytes.len() as u64)?;
                payload.extend_from_slice(bytes);
                self.emit(RecordKind::Blob, &payload)
            }
        }
    }

    /// Append a blob record streamed from a reader without buffering it.
    ///
    /// Fails before writing any bytes when `length` exceeds the 32-bit
    /// signed limit.
    pub fn write_blob_stream<R: Read>(
        &mut self,
        name: &str,
        source: &mut R,
        length: u64,
    ) -> Result<()> {
        if length > i32::MAX as u64 {
            return Err(Error::BlobTooLarge(length));
        }
        let name_idx = self.intern(name)?;

        let mut head = Vec::new();
        varint::write_u32(&mut head, name_idx)?;
        varint::write_u64(&mut head, length)?;

        varint::write_u32(&mut self.out, u32::from(RecordKind::Blob.as_u8()))?;
        varint::write_u64(&mut self.out, head.len() as u64 + length)?;
        self.out.write_all(&head)?;
        let copied = std::io::copy(&mut source.take(length), &mut self.out)?;
        if copied != length {
            return Err(Error::unexpected_eof("blob source stream"));
        }
        Ok(())
    }

    /// Write the `EndOfFile` sentinel, flush, and return the sink.
    pub fn finish(mut self) -> Result<W> {
        self.emit(RecordKind::EndOfFile, &[])?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn emit(&mut self, kind: RecordKind, payload: &[u8]) -> Result<()> {
        varint::write_u32(&mut self.out, u32::from(kind.as_u8()))?;
        varint::write_u64(&mut self.out, payload.len() as u64)?;
        self.out.write_all(payload)?;
        Ok(())
    }

    /// Intern a string, emitting its `String` record on first use.
    /// Returns the 1-based wire index.
    fn intern(&mut self, value: &str) -> Result<u32> {
        if let Some(idx) = self.strings.get(value) {
            return Ok(*idx);
        }
        let idx = self.next_string;
        self.next_string += 1;
        self.strings.insert(value.to_string(), idx);
        self.emit(RecordKind::String, value.as_bytes())?;
        Ok(idx)
    }

    /// Intern an optional string; `None` maps to the null index 0.
    fn intern_opt(&mut self, value: Option<&str>) -> Result<u32> {
        match value {
            Some(v) => self.intern(v),
            None => Ok(0),
        }
    }

    fn intern_pairs(&mut self, pairs: &[(String, String)]) -> Result<Vec<(u32, u32)>> {
        pairs
            .iter()
            .map(|(name, value)| Ok((self.intern(name)?, self.intern(value)?)))
            .collect()
    }

    fn intern_items(&mut self, items: &[ItemPayload]) -> Result<Vec<(u32, Vec<(u32, u32)>)>> {
        items
            .iter()
            .map(|item| Ok((self.intern(&item.spec)?, self.intern_pairs(&item.metadata)?)))
            .collect()
    }

    fn encode_diagnostic(&mut self, diag: &Diagnostic) -> Result<Vec<u8>> {
        let code_idx = self.intern_opt(diag.code.as_deref())?;
        let file_idx = self.intern_opt(diag.file.as_deref())?;
        let text_idx = self.intern(&diag.text)?;
        let mut payload = Vec::new();
        put_correlation(&mut payload, &diag.correlation)?;
        put_timestamp(&mut payload, diag.timestamp)?;
        varint::write_u32(&mut payload, code_idx)?;
        varint::write_u32(&mut payload, file_idx)?;
        varint::write_u32(&mut payload, diag.line)?;
        varint::write_u32(&mut payload, diag.column)?;
        varint::write_u32(&mut payload, text_idx)?;
        Ok(payload)
    }
}

impl<W: Write> RecordWriter<GzEncoder<W>> {
    /// Start a gzip-wrapped stream over the given sink.
    pub fn new_compressed(out: W) -> Result<Self> {
        RecordWriter::new(GzEncoder::new(out, Compression::default()))
    }
}

fn put_timestamp(buf: &mut Vec<u8>, timestamp: Timestamp) -> Result<()> {
    buf.write_i64::<LittleEndian>(timestamp.as_micros())?;
    Ok(())
}

fn put_correlation(buf: &mut Vec<u8>, c: &Correlation) -> Result<()> {
    varint::write_i32(buf, c.node_id)?;
    varint::write_i32(buf, c.project_context_id)?;
    varint::write_i32(buf, c.project_instance_id)?;
    varint::write_i32(buf, c.target_id)?;
    varint::write_i32(buf, c.task_id)?;
    varint::write_i64(buf, c.evaluation_id)?;
    Ok(())
}

fn put_pairs(buf: &mut Vec<u8>, pairs: &[(u32, u32)]) -> Result<()> {
    varint::write_u32(buf, pairs.len() as u32)?;
    for (name, value) in pairs {
        varint::write_u32(buf, *name)?;
        varint::write_u32(buf, *value)?;
    }
    Ok(())
}

fn put_items(buf: &mut Vec<u8>, items: &[(u32, Vec<(u32, u32)>)]) -> Result<()> {
    varint::write_u32(buf, items.len() as u32)?;
    for (spec, metadata) in items {
        varint::write_u32(buf, *spec)?;
        put_pairs(buf, metadata)?;
    }
    Ok(())
}
