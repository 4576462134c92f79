//! Batch assembly.
//!
//! Records of one source file are grouped into batches that respect both
//! the configured record count and the bulk request byte ceiling. The byte
//! estimate is updated as each record is added, so a batch is cut before
//! the record that would push it over.

use std::sync::Arc;

use index_refresh_shared::{Batch, FailedRecord, Record, SourceFile};
use tracing::debug;

use crate::codec::encode_record;
use crate::errors::IngestError;
use crate::reader::PRE_SUBMISSION_STATUS;

/// Error type used for records larger than the request ceiling.
pub const RECORD_TOO_LARGE: &str = "record_too_large";

/// Groups the records of one source file into batches.
pub struct BatchAssembler {
    source: Arc<SourceFile>,
    index: String,
    batch_size: usize,
    max_request_bytes: usize,
    pending: Vec<Record>,
    pending_bytes: usize,
    next_sequence: u64,
}

impl BatchAssembler {
    pub fn new(
        source: Arc<SourceFile>,
        index: impl Into<String>,
        batch_size: usize,
        max_request_bytes: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            source,
            index: index.into(),
            batch_size,
            max_request_bytes,
            pending: Vec::with_capacity(batch_size),
            pending_bytes: 0,
            next_sequence: 1,
        }
    }

    /// Add a record, returning the batch completed by adding it, if any.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(batch))` - The pending batch was full and has been cut; the
    ///   record starts the next batch
    /// * `Ok(None)` - The record was added to the pending batch
    /// * `Err(FailedRecord)` - The record alone does not fit under the ceiling
    pub fn push(&mut self, record: Record) -> Result<Option<Batch>, FailedRecord> {
        let size = match encode_record(&self.index, &record) {
            Ok(encoded) => encoded.wire_size(),
            Err(e) => {
                return Err(FailedRecord::new(
                    record,
                    PRE_SUBMISSION_STATUS,
                    "serialization_error",
                    e.to_string(),
                ))
            }
        };

        if size >= self.max_request_bytes {
            debug!(
                position = record.position,
                size,
                limit = self.max_request_bytes,
                "Record exceeds request ceiling"
            );
            let e = IngestError::RecordTooLarge {
                size,
                limit: self.max_request_bytes,
            };
            return Err(e.into_failed_record(record));
        }

        let full = self.pending.len() >= self.batch_size
            || self.pending_bytes + size >= self.max_request_bytes;
        let completed = if full && !self.pending.is_empty() {
            Some(self.cut())
        } else {
            None
        };

        self.pending.push(record);
        self.pending_bytes += size;
        Ok(completed)
    }

    /// Cut the final partial batch, if any records are pending.
    pub fn finish(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.cut())
        }
    }

    fn cut(&mut self) -> Batch {
        let records = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        self.pending_bytes = 0;
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        Batch {
            source: self.source.clone(),
            sequence,
            records,
        }
    }
}
