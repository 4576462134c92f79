//! Batches and bulk outcomes.

use std::sync::Arc;

use crate::record::Record;
use crate::source::SourceFile;

/// An ordered run of records from one source file.
///
/// Sequence numbers increase monotonically within a file, starting at 1.
#[derive(Debug, Clone)]
pub struct Batch {
    pub source: Arc<SourceFile>,
    pub sequence: u64,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A record that could not be indexed, with the reason reported by the index
/// or by the pipeline itself.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRecord {
    pub record: Record,
    /// HTTP-like status of the failure. 0 when the record never reached the index.
    pub status: u16,
    pub error_type: String,
    pub error_reason: String,
}

impl FailedRecord {
    pub fn new(
        record: Record,
        status: u16,
        error_type: impl Into<String>,
        error_reason: impl Into<String>,
    ) -> Self {
        Self {
            record,
            status,
            error_type: error_type.into(),
            error_reason: error_reason.into(),
        }
    }
}

/// Outcome of submitting one batch. Partial success is the normal case.
#[derive(Debug, Clone, Default)]
pub struct BulkResult {
    pub succeeded: usize,
    /// Subset of `succeeded` the index reported as newly created documents.
    pub created: usize,
    /// Permanently failed items in source order.
    pub failures: Vec<FailedRecord>,
}

impl BulkResult {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failures.len()
    }
}
