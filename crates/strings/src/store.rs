//! Deduplicating string storage with temp-file spill.

use girder_core::{Error, Result};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

/// Byte length at or above which a string is spilled to the backing file.
pub const SPILL_THRESHOLD: usize = 1024;

/// Opaque handle addressing one stored string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringHandle(u32);

#[derive(Debug)]
enum Entry {
    Resident(Box<str>),
    Spilled { offset: u64, len: u32 },
}

/// Deduplicating string store.
///
/// `add` interns content and returns a handle; `get` resolves a handle back
/// to the identical content. The backing temp file is created lazily on the
/// first spill and released by `close` (or on drop).
#[derive(Debug)]
pub struct StringStore {
    entries: Vec<Entry>,
    /// Content -> handle for resident strings.
    resident_index: FxHashMap<Box<str>, StringHandle>,
    /// Content hash -> candidate handles for spilled strings. Candidates
    /// are verified byte-for-byte before being reused.
    spilled_index: FxHashMap<u64, Vec<StringHandle>>,
    backing: Mutex<Option<File>>,
    tail: u64,
}

impl StringStore {
    /// Create an empty store.
    pub fn new() -> Self {
        StringStore {
            entries: Vec::new(),
            resident_index: FxHashMap::default(),
            spilled_index: FxHashMap::default(),
            backing: Mutex::new(None),
            tail: 0,
        }
    }

    /// Number of distinct strings stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no strings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Intern a string, returning a handle to the stored content.
    ///
    /// Adding the same content again returns a handle that resolves to the
    /// identical bytes without storing a second copy.
    pub fn add(&mut self, value: &str) -> Result<StringHandle> {
        if value.len() < SPILL_THRESHOLD {
            if let Some(handle) = self.resident_index.get(value) {
                return Ok(*handle);
            }
            let handle = StringHandle(self.entries.len() as u32);
            let boxed: Box<str> = value.into();
            self.entries.push(Entry::Resident(boxed.clone()));
            self.resident_index.insert(boxed, handle);
            return Ok(handle);
        }

        let hash = content_hash(value);
        if let Some(candidates) = self.spilled_index.get(&hash) {
            // Hash collisions are possible; verify against file content.
            let candidates = candidates.clone();
            for candidate in candidates {
                if self.get(candidate)? == value {
                    return Ok(candidate);
                }
            }
        }

        let offset = self.spill(value.as_bytes())?;
        let handle = StringHandle(self.entries.len() as u32);
        self.entries.push(Entry::Spilled {
            offset,
            len: value.len() as u32,
        });
        self.spilled_index.entry(hash).or_default().push(handle);
        Ok(handle)
    }

    /// Resolve a handle back to its content.
    pub fn get(&self, handle: StringHandle) -> Result<String> {
        match self.entries.get(handle.0 as usize) {
            Some(Entry::Resident(s)) => Ok(s.to_string()),
            Some(Entry::Spilled { offset, len }) => self.read_spilled(*offset, *len),
            None => Err(Error::InvalidHandle),
        }
    }

    /// Release the backing file. Idempotent: closing twice is a no-op.
    ///
    /// Spilled handles can no longer be resolved afterwards; resident
    /// handles remain valid.
    pub fn close(&mut self) {
        let mut guard = self.backing.lock().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    fn spill(&mut self, bytes: &[u8]) -> Result<u64> {
        let mut guard = self.backing.lock().unwrap_or_else(|e| e.into_inner());
        let file = match guard.as_mut() {
            Some(f) => f,
            None => {
                if self.tail != 0 {
                    // Store was closed; spilling again would orphan offsets.
                    return Err(Error::InvalidHandle);
                }
                *guard = Some(tempfile::tempfile()?);
                guard.as_mut().expect("just inserted")
            }
        };
        file.seek(SeekFrom::Start(self.tail))?;
        file.write_all(bytes)?;
        let offset = self.tail;
        self.tail += bytes.len() as u64;
        Ok(offset)
    }

    fn read_spilled(&self, offset: u64, len: u32) -> Result<String> {
        let mut guard = self.backing.lock().unwrap_or_else(|e| e.into_inner());
        let file = guard.as_mut().ok_or(Error::InvalidHandle)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| Error::Corruption("spilled string is not UTF-8".into()))
    }
}

impl Default for StringStore {
    fn default() -> Self {
        StringStore::new()
    }
}

fn content_hash(value: &str) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}
