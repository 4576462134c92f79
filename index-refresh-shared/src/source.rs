//! Source file identity and format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where a source file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
    ObjectStorage,
    Local,
}

/// The two record layouts understood by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Delimited text with a header row (`.csv`).
    Tabular,
    /// JSON array, single object or JSON Lines (`.json`, `.jsonl`, `.ndjson`).
    Structured,
}

impl SourceFormat {
    /// Detect the format from a file name or object key, ignoring case.
    ///
    /// Returns `None` for anything that is not a tabular or structured file.
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".csv") {
            Some(Self::Tabular)
        } else if lower.ends_with(".json") || lower.ends_with(".jsonl") || lower.ends_with(".ndjson")
        {
            Some(Self::Structured)
        } else {
            None
        }
    }
}

/// Physical location of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum SourceLocation {
    ObjectStorage { bucket: String, key: String },
    Local { path: PathBuf },
}

/// A file enumerated for ingestion. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFile {
    pub location: SourceLocation,
    pub format: SourceFormat,
    /// Size in bytes as reported at enumeration time.
    pub size: u64,
}

impl SourceFile {
    /// Create a source file living in an object storage bucket.
    pub fn object(bucket: impl Into<String>, key: impl Into<String>, format: SourceFormat, size: u64) -> Self {
        Self {
            location: SourceLocation::ObjectStorage {
                bucket: bucket.into(),
                key: key.into(),
            },
            format,
            size,
        }
    }

    /// Create a source file on the local filesystem.
    pub fn local(path: impl Into<PathBuf>, format: SourceFormat, size: u64) -> Self {
        Self {
            location: SourceLocation::Local { path: path.into() },
            format,
            size,
        }
    }

    pub fn origin(&self) -> SourceOrigin {
        match self.location {
            SourceLocation::ObjectStorage { .. } => SourceOrigin::ObjectStorage,
            SourceLocation::Local { .. } => SourceOrigin::Local,
        }
    }

    /// Stable identity used by the resume tracker and in error reports.
    ///
    /// `bucket/key` for object storage, the path as given for local files.
    pub fn identity(&self) -> String {
        match &self.location {
            SourceLocation::ObjectStorage { bucket, key } => format!("{}/{}", bucket, key),
            SourceLocation::Local { path } => path.display().to_string(),
        }
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

/// Whether a run skips files completed by a previous run or starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// Skip files already tracked as processed for the destination index.
    Resume,
    /// Clear tracked files and empty the destination index before loading.
    #[default]
    FreshLoad,
}
