//! Record stream reader.
//!
//! Performs header negotiation eagerly on construction, then yields decoded
//! records lazily through `Iterator`. Reading stops at the `EndOfFile`
//! sentinel; end-of-stream anywhere else is data corruption unless the
//! caller opted in to truncated input. Stopping early means simply ceasing
//! to pull.

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use girder_core::{Correlation, Error, Result, Timestamp};
use girder_strings::{StringHandle, StringStore};
use std::io::{BufRead, BufReader, Read};

use crate::event::{BuildEvent, Diagnostic, ItemPayload, MessageImportance};
use crate::record::{Record, RecordKind, FORMAT_VERSION, FORWARD_COMPAT_MIN_VERSION};
use crate::varint;

/// Gzip stream magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Record payloads beyond this are treated as framing corruption.
const MAX_RECORD_LENGTH: u64 = i32::MAX as u64;

/// Reader behavior switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaderOptions {
    /// Skip record kinds this reader does not recognize instead of failing.
    /// Only honored when the file declared forward compatibility.
    pub skip_unknown_records: bool,
    /// Treat end-of-stream at a record boundary as a clean stop instead of
    /// corruption. Half-written logs from crashed builds hit this.
    pub allow_truncated: bool,
}

#[derive(Debug)]
struct CountRead<R> {
    inner: R,
    consumed: u64,
}

impl<R: Read> Read for CountRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

/// Reads framed records from a byte stream.
///
/// Construction reads and validates the header; iteration yields one
/// `Record` per event. String-table records are consumed internally and
/// never surfaced.
#[derive(Debug)]
pub struct RecordReader<R: Read> {
    input: CountRead<R>,
    options: ReaderOptions,
    store: StringStore,
    table: Vec<StringHandle>,
    file_version: u32,
    minimum_reader: u32,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    /// Read the header and set up for iteration.
    ///
    /// Fails with `UnsupportedVersion` before any record is processed when
    /// the file demands a newer reader than this one.
    pub fn new(input: R, options: ReaderOptions) -> Result<Self> {
        let mut input = CountRead { inner: input, consumed: 0 };
        let file_version = varint::read_u32(&mut input, "format version")?;
        let minimum_reader = if file_version >= FORWARD_COMPAT_MIN_VERSION {
            varint::read_u32(&mut input, "minimum reader version")?
        } else {
            0
        };
        if minimum_reader > FORMAT_VERSION {
            return Err(Error::UnsupportedVersion {
                minimum_reader,
                reader: FORMAT_VERSION,
            });
        }
        Ok(RecordReader {
            input,
            options,
            store: StringStore::new(),
            table: Vec::new(),
            file_version,
            minimum_reader,
            done: false,
        })
    }

    /// Format version declared by the file.
    pub fn file_version(&self) -> u32 {
        self.file_version
    }

    /// Minimum reader version declared by the file (0 for legacy files).
    pub fn minimum_reader_version(&self) -> u32 {
        self.minimum_reader
    }

    /// Whether the file's records are skippable by a newer-file/older-reader
    /// pairing.
    pub fn forward_compatible(&self) -> bool {
        self.file_version >= FORWARD_COMPAT_MIN_VERSION
    }

    /// The string store backing decoded string fields.
    pub fn string_store(&self) -> &StringStore {
        &self.store
    }

    fn read_next(&mut self) -> Result<Option<Record>> {
        loop {
            let start = self.input.consumed;
            let tag = match self.read_kind_tag()? {
                Some(tag) => tag,
                None => return Ok(None),
            };
            let length = varint::read_u64(&mut self.input, "record length")?;
            if length > MAX_RECORD_LENGTH {
                return Err(Error::Corruption(format!(
                    "record length {length} exceeds maximum"
                )));
            }

            let kind = match RecordKind::from_u8(tag) {
                Some(kind) => kind,
                None => {
                    if self.options.skip_unknown_records && self.forward_compatible() {
                        self.skip_payload(length)?;
                        tracing::warn!(tag, length, "skipping unknown record kind");
                        continue;
                    }
                    return Err(Error::UnknownRecordKind(tag));
                }
            };

            if kind == RecordKind::EndOfFile {
                return Ok(None);
            }

            let payload = self.read_payload(length)?;

            if kind == RecordKind::String {
                let value = std::str::from_utf8(&payload).map_err(|_| {
                    Error::Corruption("string record is not UTF-8".to_string())
                })?;
                let handle = self.store.add(value)?;
                self.table.push(handle);
                continue;
            }

            let event = self.decode_event(kind, &payload)?;
            return Ok(Some(Record {
                kind,
                start,
                length,
                event,
            }));
        }
    }

    /// Read the kind tag, distinguishing a clean boundary EOF from
    /// corruption mid-record.
    fn read_kind_tag(&mut self) -> Result<Option<u8>> {
        let mut first = [0u8; 1];
        let mut filled = 0;
        while filled < 1 {
            let n = self.input.read(&mut first[filled..])?;
            if n == 0 {
                if self.options.allow_truncated {
                    tracing::warn!("stream ended without EndOfFile record; treating as truncated");
                    return Ok(None);
                }
                return Err(Error::Corruption(
                    "stream ended without EndOfFile record".to_string(),
                ));
            }
            filled += n;
        }
        if first[0] & 0x80 == 0 {
            return Ok(Some(first[0]));
        }
        // Multi-byte kind tags are reserved for future kinds; decode the
        // remainder and reject values outside the u8 tag space.
        let mut value = u64::from(first[0] & 0x7f);
        let mut shift = 7u32;
        loop {
            let mut next = [0u8; 1];
            self.input
                .read_exact(&mut next)
                .map_err(|_| Error::unexpected_eof("record kind"))?;
            value |= u64::from(next[0] & 0x7f) << shift;
            if next[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 63 {
                return Err(Error::Corruption("record kind varint too long".to_string()));
            }
        }
        u8::try_from(value)
            .map(Some)
            .map_err(|_| Error::Corruption(format!("record kind {value} out of range")))
    }

    fn read_payload(&mut self, length: u64) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; length as usize];
        self.input
            .read_exact(&mut payload)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::unexpected_eof("record payload"),
                _ => Error::Io(e),
            })?;
        Ok(payload)
    }

    fn skip_payload(&mut self, length: u64) -> Result<()> {
        let copied = std::io::copy(&mut (&mut self.input).take(length), &mut std::io::sink())?;
        if copied != length {
            return Err(Error::unexpected_eof("skipped record payload"));
        }
        Ok(())
    }

    fn decode_event(&self, kind: RecordKind, payload: &[u8]) -> Result<BuildEvent> {
        let mut buf = payload;
        let event = match kind {
            RecordKind::BuildStarted => BuildEvent::BuildStarted {
                timestamp: get_timestamp(&mut buf)?,
            },
            RecordKind::BuildFinished => BuildEvent::BuildFinished {
                timestamp: get_timestamp(&mut buf)?,
                succeeded: get_bool(&mut buf)?,
            },
            RecordKind::ProjectStarted => {
                let correlation = get_correlation(&mut buf)?;
                let parent_project_context_id =
                    varint::read_i32(&mut buf, "parent project context")?;
                let timestamp = get_timestamp(&mut buf)?;
                let project_file = self.get_string(&mut buf)?;
                let target_names = self.get_opt_string(&mut buf)?;
                let global_properties = self.get_pairs(&mut buf)?;
                let properties = self.get_pairs(&mut buf)?;
                BuildEvent::ProjectStarted {
                    correlation,
                    parent_project_context_id,
                    timestamp,
                    project_file,
                    target_names,
                    global_properties,
                    properties,
                }
            }
            RecordKind::ProjectFinished => BuildEvent::ProjectFinished {
                project_context_id: varint::read_i32(&mut buf, "project context")?,
                timestamp: get_timestamp(&mut buf)?,
                succeeded: get_bool(&mut buf)?,
            },
            RecordKind::TargetStarted => {
                let correlation = get_correlation(&mut buf)?;
                let timestamp = get_timestamp(&mut buf)?;
                let target_name = self.get_string(&mut buf)?;
                let parent_target = self.get_opt_string(&mut buf)?;
                let source_file = self.get_opt_string(&mut buf)?;
                BuildEvent::TargetStarted {
                    correlation,
                    timestamp,
                    target_name,
                    parent_target,
                    source_file,
                }
            }
            RecordKind::TargetFinished => {
                let correlation = get_correlation(&mut buf)?;
                let timestamp = get_timestamp(&mut buf)?;
                let target_name = self.get_string(&mut buf)?;
                let succeeded = get_bool(&mut buf)?;
                let outputs = self.get_items(&mut buf)?;
                BuildEvent::TargetFinished {
                    correlation,
                    timestamp,
                    target_name,
                    succeeded,
                    outputs,
                }
            }
            RecordKind::TaskStarted => {
                let correlation = get_correlation(&mut buf)?;
                let timestamp = get_timestamp(&mut buf)?;
                let task_name = self.get_string(&mut buf)?;
                let source_file = self.get_opt_string(&mut buf)?;
                let line = varint::read_u32(&mut buf, "task line")?;
                BuildEvent::TaskStarted {
                    correlation,
                    timestamp,
                    task_name,
                    source_file,
                    line,
                }
            }
            RecordKind::TaskFinished => {
                let correlation = get_correlation(&mut buf)?;
                let timestamp = get_timestamp(&mut buf)?;
                let task_name = self.get_string(&mut buf)?;
                let succeeded = get_bool(&mut buf)?;
                BuildEvent::TaskFinished {
                    correlation,
                    timestamp,
                    task_name,
                    succeeded,
                }
            }
            RecordKind::Message => {
                let correlation = get_correlation(&mut buf)?;
                let timestamp = get_timestamp(&mut buf)?;
                let importance = MessageImportance::from_u8(get_u8(&mut buf)?);
                let text = self.get_string(&mut buf)?;
                BuildEvent::Message {
                    correlation,
                    timestamp,
                    importance,
                    text,
                }
            }
            RecordKind::Warning => BuildEvent::Warning(self.decode_diagnostic(&mut buf)?),
            RecordKind::Error => BuildEvent::Error(self.decode_diagnostic(&mut buf)?),
            RecordKind::Extended => {
                let correlation = get_correlation(&mut buf)?;
                let timestamp = get_timestamp(&mut buf)?;
                let event_type = self.get_string(&mut buf)?;
                let fields = self.get_pairs(&mut buf)?;
                let text = self.get_opt_string(&mut buf)?;
                BuildEvent::Extended {
                    correlation,
                    timestamp,
                    event_type,
                    fields,
                    text,
                }
            }
            RecordKind::Blob => {
                let name = self.get_string(&mut buf)?;
                let declared = varint::read_u64(&mut buf, "blob length")? as usize;
                if declared != buf.len() {
                    return Err(Error::Corruption(format!(
                        "blob declares {declared} bytes but record carries {}",
                        buf.len()
                    )));
                }
                BuildEvent::Blob {
                    name,
                    bytes: buf.to_vec(),
                }
            }
            RecordKind::EndOfFile | RecordKind::String => {
                unreachable!("handled by the framing loop")
            }
        };
        Ok(event)
    }

    fn decode_diagnostic(&self, buf: &mut &[u8]) -> Result<Diagnostic> {
        let correlation = get_correlation(buf)?;
        let timestamp = get_timestamp(buf)?;
        let code = self.get_opt_string(buf)?;
        let file = self.get_opt_string(buf)?;
        let line = varint::read_u32(buf, "diagnostic line")?;
        let column = varint::read_u32(buf, "diagnostic column")?;
        let text = self.get_string(buf)?;
        Ok(Diagnostic {
            correlation,
            timestamp,
            code,
            file,
            line,
            column,
            text,
        })
    }

    fn get_string(&self, buf: &mut &[u8]) -> Result<String> {
        match self.get_opt_string(buf)? {
            Some(value) => Ok(value),
            // Null index in a required slot: tolerate as empty rather than
            // losing the rest of the record.
            None => Ok(String::new()),
        }
    }

    fn get_opt_string(&self, buf: &mut &[u8]) -> Result<Option<String>> {
        let index = varint::read_u32(buf, "string index")?;
        if index == 0 {
            return Ok(None);
        }
        let handle = self
            .table
            .get(index as usize - 1)
            .copied()
            .ok_or_else(|| Error::Corruption(format!("string index {index} out of range")))?;
        Ok(Some(self.store.get(handle)?))
    }

    fn get_pairs(&self, buf: &mut &[u8]) -> Result<Vec<(String, String)>> {
        let count = varint::read_u32(buf, "pair count")? as usize;
        let mut pairs = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let name = self.get_string(buf)?;
            let value = self.get_string(buf)?;
            pairs.push((name, value));
        }
        Ok(pairs)
    }

    fn get_items(&self, buf: &mut &[u8]) -> Result<Vec<ItemPayload>> {
        let count = varint::read_u32(buf, "item count")? as usize;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let spec = self.get_string(buf)?;
            let metadata = self.get_pairs(buf)?;
            items.push(ItemPayload { spec, metadata });
        }
        Ok(items)
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Open a possibly gzip-wrapped record stream.
///
/// Peeks at the first two bytes; the gzip magic routes the stream through
/// transparent decompression before the record layer sees it.
pub fn open_stream<R: Read + 'static>(
    input: R,
    options: ReaderOptions,
) -> Result<RecordReader<Box<dyn Read>>> {
    let mut buffered = BufReader::new(input);
    let head = buffered.fill_buf()?;
    let compressed = head.len() >= 2 && head[..2] == GZIP_MAGIC;
    let inner: Box<dyn Read> = if compressed {
        Box::new(GzDecoder::new(buffered))
    } else {
        Box::new(buffered)
    };
    RecordReader::new(inner, options)
}

fn get_timestamp(buf: &mut &[u8]) -> Result<Timestamp> {
    let micros = buf
        .read_i64::<LittleEndian>()
        .map_err(|_| Error::unexpected_eof("timestamp"))?;
    Ok(Timestamp::from_micros(micros))
}

fn get_bool(buf: &mut &[u8]) -> Result<bool> {
    Ok(get_u8(buf)? != 0)
}

fn get_u8(buf: &mut &[u8]) -> Result<u8> {
    buf.read_u8().map_err(|_| Error::unexpected_eof("byte field"))
}

fn get_correlation(buf: &mut &[u8]) -> Result<Correlation> {
    Ok(Correlation {
        node_id: varint::read_i32(buf, "node id")?,
        project_context_id: varint::read_i32(buf, "project context id")?,
        project_instance_id: varint::read_i32(buf, "project instance id")?,
        target_id: varint::read_i32(buf, "target id")?,
        task_id: varint::read_i32(buf, "task id")?,
        evaluation_id: varint::read_i64(buf, "evaluation id")?,
    })
}
