//! Fixed-layout container header: field table, parse and serialize.
//!
//! # Layout
//! The header is always [`HEADER_SIZE`] (46) bytes, all integers little-endian:
//!
//! | Offset | Size | Field             | Decoded as |
//! |-------:|-----:|-------------------|------------|
//! |      0 |    4 | `chunkID`         | ASCII      |
//! |      4 |    4 | `chunkSize`       | u32        |
//! |      8 |    4 | `format`          | ASCII      |
//! |     12 |    4 | `formatChunkID`   | ASCII      |
//! |     16 |    4 | `formatChunkSize` | u32        |
//! |     20 |    2 | `formatTag`       | u16        |
//! |     22 |    2 | `numChannels`     | u16        |
//! |     24 |    4 | `samplesPerSec`   | u32        |
//! |     28 |    4 | `avgBytesPerSec`  | u32        |
//! |     32 |    2 | `blockAlign`      | u16        |
//! |     34 |    2 | `bitsPerSample`   | u16        |
//! |     38 |    4 | `dataChunkID`     | ASCII      |
//! |     42 |    4 | `dataChunkSize`   | u32        |
//!
//! Bytes 36..38 belong to no field. They hold the `cbSize` word of an
//! 18-byte `fmt ` chunk and are written back as zero.  This is the layout
//! of the dialect we consume; it is not the canonical 44-byte header.
//!
//! # Tables are values
//! A [`HeaderTable`] is never patched in place.  The `with_*` methods return
//! a new table with raw bytes, decoded value and the `fullHeader` bytes
//! updated together.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use thiserror::Error;

/// Serialized header length in bytes.
pub const HEADER_SIZE: usize = 46;

/// Lookup name of the synthetic entry holding the whole raw header.
pub const FULL_HEADER: &str = "fullHeader";

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum HeaderError {
    /// Fewer than [`HEADER_SIZE`] bytes, or the payload cannot be read as samples.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),
    #[error("Unknown header field: {0}")]
    UnknownField(String),
    #[error("Field {field} takes {expected} bytes, got {actual}")]
    FieldLength { field: &'static str, expected: usize, actual: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Field specs ──────────────────────────────────────────────────────────────

/// How a field's raw bytes are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Ascii,
    U16,
    U32,
}

/// Static placement of one header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name:   &'static str,
    pub offset: usize,
    pub len:    usize,
    pub kind:   FieldKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeaderField {
    ChunkId,
    ChunkSize,
    Format,
    FormatChunkId,
    FormatChunkSize,
    FormatTag,
    NumChannels,
    SamplesPerSec,
    AvgBytesPerSec,
    BlockAlign,
    BitsPerSample,
    DataChunkId,
    DataChunkSize,
}

const fn spec(name: &'static str, offset: usize, len: usize, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, offset, len, kind }
}

impl HeaderField {
    /// Every field, in layout order.
    pub const ALL: [HeaderField; 13] = [
        HeaderField::ChunkId,
        HeaderField::ChunkSize,
        HeaderField::Format,
        HeaderField::FormatChunkId,
        HeaderField::FormatChunkSize,
        HeaderField::FormatTag,
        HeaderField::NumChannels,
        HeaderField::SamplesPerSec,
        HeaderField::AvgBytesPerSec,
        HeaderField::BlockAlign,
        HeaderField::BitsPerSample,
        HeaderField::DataChunkId,
        HeaderField::DataChunkSize,
    ];

    pub fn spec(self) -> FieldSpec {
        use FieldKind::*;
        match self {
            HeaderField::ChunkId         => spec("chunkID",          0, 4, Ascii),
            HeaderField::ChunkSize       => spec("chunkSize",        4, 4, U32),
            HeaderField::Format          => spec("format",           8, 4, Ascii),
            HeaderField::FormatChunkId   => spec("formatChunkID",   12, 4, Ascii),
            HeaderField::FormatChunkSize => spec("formatChunkSize", 16, 4, U32),
            HeaderField::FormatTag       => spec("formatTag",       20, 2, U16),
            HeaderField::NumChannels     => spec("numChannels",     22, 2, U16),
            HeaderField::SamplesPerSec   => spec("samplesPerSec",   24, 4, U32),
            HeaderField::AvgBytesPerSec  => spec("avgBytesPerSec",  28, 4, U32),
            HeaderField::BlockAlign      => spec("blockAlign",      32, 2, U16),
            HeaderField::BitsPerSample   => spec("bitsPerSample",   34, 2, U16),
            HeaderField::DataChunkId     => spec("dataChunkID",     38, 4, Ascii),
            HeaderField::DataChunkSize   => spec("dataChunkSize",   42, 4, U32),
        }
    }

    #[inline]
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Resolve a field by its layout name (`"chunkSize"`, `"dataChunkID"`, ...).
    pub fn from_name(name: &str) -> Result<Self, HeaderError> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == name)
            .ok_or_else(|| HeaderError::UnknownField(name.to_string()))
    }
}

// ── Entries ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    U16(u16),
    U32(u32),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::U16(v)  => write!(f, "{v}"),
            FieldValue::U32(v)  => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub raw:   Vec<u8>,
    pub value: FieldValue,
}

impl HeaderEntry {
    fn decode(kind: FieldKind, raw: &[u8]) -> Self {
        let value = match kind {
            // Non-ASCII bytes are shown lossily; the raw bytes stay authoritative.
            FieldKind::Ascii => FieldValue::Text(String::from_utf8_lossy(raw).into_owned()),
            FieldKind::U16   => FieldValue::U16(LittleEndian::read_u16(raw)),
            FieldKind::U32   => FieldValue::U32(LittleEndian::read_u32(raw)),
        };
        Self { raw: raw.to_vec(), value }
    }
}

// ── HeaderTable ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTable {
    entries: BTreeMap<HeaderField, HeaderEntry>,
    /// The raw header as read, with every `with_*` update written through.
    /// Bytes 36..38 keep whatever the input carried.
    full_header: [u8; HEADER_SIZE],
}

impl HeaderTable {
    /// Decode all fields from a raw header.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let entries = HeaderField::ALL
            .iter()
            .map(|&field| {
                let s = field.spec();
                (field, HeaderEntry::decode(s.kind, &bytes[s.offset..s.offset + s.len]))
            })
            .collect();
        Self { entries, full_header: *bytes }
    }

    /// Build a possibly incomplete table from `(field, raw)` pairs.
    /// Fields left out serialize as zero bytes.
    pub fn from_entries<I>(entries: I) -> Result<Self, HeaderError>
    where
        I: IntoIterator<Item = (HeaderField, Vec<u8>)>,
    {
        let mut table = Self { entries: BTreeMap::new(), full_header: [0u8; HEADER_SIZE] };
        for (field, raw) in entries {
            table = table.with_raw(field, &raw)?;
        }
        Ok(table)
    }

    pub fn full_header(&self) -> &[u8; HEADER_SIZE] {
        &self.full_header
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, field: HeaderField) -> bool {
        self.entries.contains_key(&field)
    }

    /// Raw bytes by lookup name.  [`FULL_HEADER`] resolves to all 46 bytes;
    /// any other name must be a field name.
    pub fn raw_by_name(&self, name: &str) -> Result<&[u8], HeaderError> {
        if name == FULL_HEADER {
            return Ok(&self.full_header);
        }
        Ok(&self.get_by_name(name)?.raw)
    }

    /// Entries in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (HeaderField, &HeaderEntry)> {
        self.entries.iter().map(|(f, e)| (*f, e))
    }

    pub fn get(&self, field: HeaderField) -> Result<&HeaderEntry, HeaderError> {
        self.entries
            .get(&field)
            .ok_or_else(|| HeaderError::UnknownField(field.name().to_string()))
    }

    pub fn get_by_name(&self, name: &str) -> Result<&HeaderEntry, HeaderError> {
        self.get(HeaderField::from_name(name)?)
    }

    pub fn u32_field(&self, field: HeaderField) -> Result<u32, HeaderError> {
        match self.get(field)?.value {
            FieldValue::U32(v) => Ok(v),
            _ => Err(HeaderError::UnknownField(format!("{} is not a u32 field", field.name()))),
        }
    }

    pub fn u16_field(&self, field: HeaderField) -> Result<u16, HeaderError> {
        match self.get(field)?.value {
            FieldValue::U16(v) => Ok(v),
            _ => Err(HeaderError::UnknownField(format!("{} is not a u16 field", field.name()))),
        }
    }

    pub fn text_field(&self, field: HeaderField) -> Result<&str, HeaderError> {
        match &self.get(field)?.value {
            FieldValue::Text(s) => Ok(s),
            _ => Err(HeaderError::UnknownField(format!("{} is not a text field", field.name()))),
        }
    }

    /// Return a copy of this table with `field` set to `raw`.
    pub fn with_raw(&self, field: HeaderField, raw: &[u8]) -> Result<Self, HeaderError> {
        let s = field.spec();
        if raw.len() != s.len {
            return Err(HeaderError::FieldLength { field: s.name, expected: s.len, actual: raw.len() });
        }
        let mut next = self.clone();
        next.entries.insert(field, HeaderEntry::decode(s.kind, raw));
        next.full_header[s.offset..s.offset + s.len].copy_from_slice(raw);
        Ok(next)
    }

    pub fn with_u32(&self, field: HeaderField, value: u32) -> Result<Self, HeaderError> {
        let mut raw = [0u8; 4];
        LittleEndian::write_u32(&mut raw, value);
        self.with_raw(field, &raw)
    }

    pub fn with_u16(&self, field: HeaderField, value: u16) -> Result<Self, HeaderError> {
        let mut raw = [0u8; 2];
        LittleEndian::write_u16(&mut raw, value);
        self.with_raw(field, &raw)
    }

    pub fn summary(&self) -> HeaderSummary {
        HeaderSummary {
            fields: self
                .iter()
                .map(|(f, e)| FieldSummary {
                    name:   f.name(),
                    offset: f.spec().offset,
                    raw:    hex::encode(&e.raw),
                    value:  e.value.clone(),
                })
                .collect(),
        }
    }
}

const LABELS: [(HeaderField, &str); 13] = [
    (HeaderField::ChunkId,         "Chunk ID"),
    (HeaderField::ChunkSize,       "Chunk size"),
    (HeaderField::Format,          "Format"),
    (HeaderField::FormatChunkId,   "Format chunk ID"),
    (HeaderField::FormatChunkSize, "Format chunk size"),
    (HeaderField::FormatTag,       "Format tag"),
    (HeaderField::NumChannels,     "Num channels"),
    (HeaderField::SamplesPerSec,   "Samples per sec"),
    (HeaderField::AvgBytesPerSec,  "Avg bytes per sec"),
    (HeaderField::BlockAlign,      "Block align"),
    (HeaderField::BitsPerSample,   "Bits per sample"),
    (HeaderField::DataChunkId,     "Data chunk ID"),
    (HeaderField::DataChunkSize,   "Data chunk size"),
];

impl fmt::Display for HeaderTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (field, label) in LABELS {
            // Blank line before each chunk group.
            if matches!(field, HeaderField::FormatChunkId | HeaderField::DataChunkId) {
                writeln!(f)?;
            }
            match self.entries.get(&field) {
                Some(e) => writeln!(f, "  {label:<18} {}", e.value)?,
                None    => writeln!(f, "  {label:<18} -")?,
            }
        }
        Ok(())
    }
}

/// JSON view of a table, for `info --json`.
#[derive(Debug, Clone, Serialize)]
pub struct HeaderSummary {
    pub fields: Vec<FieldSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSummary {
    pub name:   &'static str,
    pub offset: usize,
    pub raw:    String,
    pub value:  FieldValue,
}

// ── Parse / serialize ────────────────────────────────────────────────────────

/// Read the header from absolute offset 0.  The stream position is restored
/// before returning, on success and on failure.
pub fn parse_header<R: Read + Seek>(reader: &mut R) -> Result<HeaderTable, HeaderError> {
    let pos = reader.stream_position()?;
    reader.seek(SeekFrom::Start(0))?;
    let mut bytes = [0u8; HEADER_SIZE];
    let read = read_full(reader, &mut bytes);
    reader.seek(SeekFrom::Start(pos))?;

    let n = read?;
    if n < HEADER_SIZE {
        return Err(HeaderError::MalformedContainer(format!(
            "header needs {HEADER_SIZE} bytes, stream has {n}"
        )));
    }
    Ok(HeaderTable::from_bytes(&bytes))
}

/// Place every present field at its spec offset.  Missing fields and the
/// two bytes at 36..38 stay zero.
pub fn serialize_header(table: &HeaderTable) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    for field in HeaderField::ALL {
        if let Some(entry) = table.entries.get(&field) {
            let s = field.spec();
            out[s.offset..s.offset + s.len].copy_from_slice(&entry.raw);
        }
    }
    out
}

/// Fill `buf` until it is full or the reader hits EOF; returns bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
