//! Error types for the ingestion pipeline.

use index_refresh_admin::{AdminError, GuardrailError};
use index_refresh_repository::SearchIndexError;
use index_refresh_shared::{FailedRecord, Record};
use thiserror::Error;

use crate::assembler::RECORD_TOO_LARGE;
use crate::reader::PRE_SUBMISSION_STATUS;

/// Errors that can occur while ingesting source files.
///
/// Only some of these end a run. `MalformedSource` skips one file and
/// `RecordTooLarge` / `PermanentSubmission` fail single records; the
/// remaining variants stop the run.
#[derive(Error, Debug)]
pub enum IngestError {
    /// A source file could not be parsed.
    #[error("Malformed source {file}: {reason}")]
    MalformedSource { file: String, reason: String },

    /// A single record serializes larger than the bulk request ceiling.
    #[error("Record of {size} bytes exceeds request ceiling of {limit} bytes")]
    RecordTooLarge { size: usize, limit: usize },

    /// A bulk request or item failed in a way that may succeed on retry.
    #[error("Transient submission error: {0}")]
    TransientSubmission(String),

    /// A record was refused by the index, or its retries ran out.
    #[error("Permanent submission error ({status} {error_type}): {reason}")]
    PermanentSubmission {
        status: u16,
        error_type: String,
        reason: String,
    },

    /// The destination cannot be used (authentication, missing index).
    #[error("Fatal configuration error: {0}")]
    FatalConfiguration(String),

    /// A guardrail refused the run.
    #[error("Guardrail refused ingestion: {0}")]
    Guardrail(#[from] GuardrailError),

    /// A gated admin operation (fresh-load cleanup) failed.
    #[error("Admin operation failed: {0}")]
    Admin(#[from] AdminError),

    /// Error from the search index.
    #[error("Search index error: {0}")]
    SearchIndex(#[from] SearchIndexError),

    /// Source enumeration or download failed.
    #[error("Source error: {0}")]
    Source(String),

    /// The resume tracker could not be read or written.
    #[error("Tracking error: {0}")]
    Tracking(String),

    /// The dead-letter channel could not be set up or written.
    #[error("DLQ error: {0}")]
    Dlq(String),

    /// The index document count does not match what was written.
    #[error("Document count verification failed: expected {expected}, found {actual}")]
    CountVerification { expected: u64, actual: u64 },
}

impl IngestError {
    /// Create a malformed source error.
    pub fn malformed(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedSource {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Create a fatal configuration error.
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::FatalConfiguration(msg.into())
    }

    /// Create a permanent submission error.
    pub fn permanent(status: u16, error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PermanentSubmission {
            status,
            error_type: error_type.into(),
            reason: reason.into(),
        }
    }

    /// Create a source error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a tracking error.
    pub fn tracking(msg: impl Into<String>) -> Self {
        Self::Tracking(msg.into())
    }

    /// Create a DLQ error.
    pub fn dlq(msg: impl Into<String>) -> Self {
        Self::Dlq(msg.into())
    }

    /// Whether the error ends the whole run rather than a file or a record.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::MalformedSource { .. }
                | Self::RecordTooLarge { .. }
                | Self::TransientSubmission(_)
                | Self::PermanentSubmission { .. }
        )
    }

    /// Attach this error to the record it failed, for dead-letter reporting.
    pub fn into_failed_record(self, record: Record) -> FailedRecord {
        match self {
            Self::PermanentSubmission {
                status,
                error_type,
                reason,
            } => FailedRecord::new(record, status, error_type, reason),
            other => {
                let error_type = match &other {
                    Self::RecordTooLarge { .. } => RECORD_TOO_LARGE,
                    Self::MalformedSource { .. } => "malformed_source",
                    Self::TransientSubmission(_) => "transient_error",
                    _ => "ingest_error",
                };
                FailedRecord::new(record, PRE_SUBMISSION_STATUS, error_type, other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn record() -> Record {
        Record::new(Map::new(), Some("7".to_string()), 3)
    }

    #[test]
    fn test_record_failures_are_not_fatal() {
        assert!(!IngestError::RecordTooLarge { size: 20, limit: 10 }.is_fatal());
        assert!(!IngestError::permanent(400, "mapper_parsing_exception", "bad").is_fatal());
        assert!(!IngestError::TransientSubmission("503".to_string()).is_fatal());
        assert!(IngestError::fatal("forbidden").is_fatal());
    }

    #[test]
    fn test_into_failed_record() {
        let failed = IngestError::permanent(400, "mapper_parsing_exception", "failed to parse")
            .into_failed_record(record());
        assert_eq!(failed.status, 400);
        assert_eq!(failed.error_type, "mapper_parsing_exception");
        assert_eq!(failed.error_reason, "failed to parse");

        let failed = IngestError::RecordTooLarge { size: 20, limit: 10 }.into_failed_record(record());
        assert_eq!(failed.status, PRE_SUBMISSION_STATUS);
        assert_eq!(failed.error_type, RECORD_TOO_LARGE);
        assert_eq!(failed.record.position, 3);
        assert!(failed.error_reason.contains("20 bytes"));
    }
}
