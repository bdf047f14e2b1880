//! Wire records exchanged between the history provider and the tree builder
//!
//! The single-letter JSON keys match the compact data file format, so that
//! records written by other tools can be read back unchanged.

use crate::error::{Result, SizeError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Size information for one artifact of one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    /// Artifact path relative to the build output
    pub path: String,
    /// Raw size in bytes
    pub size: u64,
    /// Gzipped size in bytes
    #[serde(rename = "gzipSize")]
    pub gzip_size: u64,
}

impl FileData {
    /// Create a new artifact record
    pub fn new(path: impl Into<String>, size: u64, gzip_size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            gzip_size,
        }
    }
}

/// First record of every stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Number of items the stream describes, used to estimate progress
    pub total: usize,
    /// True when the stream describes the difference between two builds
    pub diff_mode: bool,
}

fn deserialize_rounded<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let size = f64::deserialize(deserializer)?;
    if !size.is_finite() {
        return Err(D::Error::custom(format!("invalid symbol size {}", size)));
    }
    Ok(size.round() as i64)
}

/// A single symbol of a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolEntry {
    /// Name of the symbol
    #[serde(rename = "n")]
    pub name: String,
    /// Byte size of the symbol, divided by its alias count
    ///
    /// Data files may carry fractional sizes; they are rounded on read.
    #[serde(rename = "b", deserialize_with = "deserialize_rounded")]
    pub byte_size: i64,
    /// Single character symbol type
    #[serde(rename = "t")]
    pub kind: char,
    /// How many symbols this entry represents; negative when removed in a diff
    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    /// Bit flags
    #[serde(rename = "f", default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,
    /// Number of aliases sharing this size
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub num_aliases: Option<u32>,
}

impl SymbolEntry {
    /// Create a symbol with an explicit count
    pub fn new(name: impl Into<String>, byte_size: i64, kind: char, count: i64) -> Self {
        Self {
            name: name.into(),
            byte_size,
            kind,
            count: Some(count),
            flags: None,
            num_aliases: None,
        }
    }
}

/// A file and the symbols that belong to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path to the file
    #[serde(rename = "p")]
    pub path: String,
    /// Symbols belonging to this file
    #[serde(rename = "s")]
    pub symbols: Vec<SymbolEntry>,
}

/// One item of a record stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    /// Stream header
    Meta(Meta),
    /// File with its symbols
    File(FileEntry),
}

impl Record {
    /// Parse one line of a newline-delimited data file
    ///
    /// The first line must hold the meta record, every following line a file entry.
    pub fn from_ndjson_line(line: &str, first: bool) -> Result<Self> {
        let parsed = if first {
            serde_json::from_str::<Meta>(line).map(Record::Meta)
        } else {
            serde_json::from_str::<FileEntry>(line).map(Record::File)
        };
        parsed.map_err(|e| SizeError::MalformedEntry(e.to_string()))
    }
}
