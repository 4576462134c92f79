//! Bulk submission with per-item retries.
//!
//! One batch is sent as one bulk request. The response carries one outcome
//! per item in request order, so outcomes are matched to records by
//! position. Transient item failures are resent alone, with exponential
//! backoff, until they succeed or the retries run out.

use std::sync::Arc;
use std::time::Duration;

use index_refresh_repository::{BulkItemOutcome, SearchIndexError, SearchIndexProvider};
use index_refresh_shared::{Batch, BulkResult, FailedRecord};
use tracing::{debug, info, instrument, warn};

use crate::codec::{encode_record, to_lines, EncodedRecord};
use crate::counters::IngestCounters;
use crate::errors::IngestError;
use crate::reader::PRE_SUBMISSION_STATUS;

/// Configuration for the bulk submitter.
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Maximum number of retry attempts for transient failures.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 5000,
        }
    }
}

/// Whether a failed bulk item may succeed if resent.
///
/// Throttling (429), server errors (5xx) and rejected-execution errors from
/// a saturated write queue are transient. Mapping and validation errors are not.
pub fn is_retryable_item(item: &BulkItemOutcome) -> bool {
    if item.status == 429 || item.status >= 500 {
        return true;
    }
    item.error.as_ref().is_some_and(|e| {
        let error_type = e.error_type.to_lowercase();
        error_type.contains("rejected_execution")
            || e.reason.to_lowercase().contains("rejected execution")
    })
}

/// Submits batches to one destination index.
pub struct BulkSubmitter {
    provider: Arc<dyn SearchIndexProvider>,
    index: String,
    config: SubmitterConfig,
    counters: Arc<IngestCounters>,
}

impl BulkSubmitter {
    pub fn new(
        provider: Arc<dyn SearchIndexProvider>,
        index: impl Into<String>,
        config: SubmitterConfig,
        counters: Arc<IngestCounters>,
    ) -> Self {
        Self {
            provider,
            index: index.into(),
            config,
            counters,
        }
    }

    /// Submit one batch.
    ///
    /// # Returns
    ///
    /// * `Ok(BulkResult)` - Every record reached a terminal state. Permanent
    ///   failures are listed in source order.
    /// * `Err(IngestError::FatalConfiguration)` - The destination cannot be
    ///   written at all (authentication, missing index)
    #[instrument(skip(self, batch), fields(source = %batch.source, sequence = batch.sequence, records = batch.len()))]
    pub async fn submit(&self, batch: &Batch) -> Result<BulkResult, IngestError> {
        let mut result = BulkResult::default();
        let mut failures: Vec<(usize, FailedRecord)> = Vec::new();
        let mut encoded: Vec<Option<EncodedRecord>> = Vec::with_capacity(batch.len());

        for (pos, record) in batch.records.iter().enumerate() {
            match encode_record(&self.index, record) {
                Ok(e) => encoded.push(Some(e)),
                Err(e) => {
                    encoded.push(None);
                    failures.push((
                        pos,
                        FailedRecord::new(
                            record.clone(),
                            PRE_SUBMISSION_STATUS,
                            "serialization_error",
                            e.to_string(),
                        ),
                    ));
                }
            }
        }

        let mut pending: Vec<usize> = (0..batch.len()).filter(|&p| encoded[p].is_some()).collect();
        let mut delay_ms = self.config.initial_retry_delay_ms;

        for attempt in 0..=self.config.max_retries {
            if pending.is_empty() {
                break;
            }
            let last_attempt = attempt == self.config.max_retries;
            let lines = to_lines(pending.iter().filter_map(|&p| encoded[p].as_ref()));

            match self.provider.bulk(&self.index, lines).await {
                Ok(response) if response.items.len() == pending.len() => {
                    let mut retry = Vec::new();
                    for (&pos, item) in pending.iter().zip(response.items.iter()) {
                        if item.is_success() {
                            result.succeeded += 1;
                            if item.is_created() {
                                result.created += 1;
                            }
                        } else if !last_attempt && is_retryable_item(item) {
                            retry.push(pos);
                        } else {
                            failures.push((pos, item_failure(batch, pos, item)));
                        }
                    }
                    pending = retry;
                }
                Ok(response) => {
                    let reason = format!(
                        "bulk response has {} items for {} actions",
                        response.items.len(),
                        pending.len()
                    );
                    warn!(attempt, reason = %reason, "Bulk response does not match request");
                    if last_attempt {
                        self.fail_all(batch, &mut pending, &mut failures, 0, "response_mismatch", &reason);
                    }
                }
                Err(e) if e.is_fatal_configuration() => {
                    return Err(IngestError::fatal(format!(
                        "bulk request to {} refused: {}",
                        self.index, e
                    )));
                }
                Err(e) if e.is_transient() && !last_attempt => {
                    let e = IngestError::TransientSubmission(e.to_string());
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms,
                        error = %e,
                        "Bulk request failed, retrying"
                    );
                }
                Err(e) => {
                    let (status, error_type) = request_failure_kind(&e);
                    self.fail_all(batch, &mut pending, &mut failures, status, error_type, &e.to_string());
                }
            }

            if !pending.is_empty() && !last_attempt {
                debug!(pending = pending.len(), delay_ms, "Retrying transient failures");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = std::cmp::min(delay_ms * 2, self.config.max_retry_delay_ms);
            }
        }

        failures.sort_by_key(|(pos, _)| *pos);
        result.failures = failures.into_iter().map(|(_, f)| f).collect();

        self.counters
            .add_succeeded(result.succeeded as u64, result.created as u64);
        self.counters.add_failed(result.failed() as u64);

        if result.failures.is_empty() {
            debug!(succeeded = result.succeeded, "Batch indexed");
        } else {
            info!(
                succeeded = result.succeeded,
                failed = result.failed(),
                "Batch indexed with failures"
            );
        }
        Ok(result)
    }

    fn fail_all(
        &self,
        batch: &Batch,
        pending: &mut Vec<usize>,
        failures: &mut Vec<(usize, FailedRecord)>,
        status: u16,
        error_type: &str,
        reason: &str,
    ) {
        for pos in pending.drain(..) {
            let e = IngestError::permanent(status, error_type, reason);
            failures.push((pos, e.into_failed_record(batch.records[pos].clone())));
        }
    }
}

fn item_failure(batch: &Batch, pos: usize, item: &BulkItemOutcome) -> FailedRecord {
    let (error_type, reason) = match &item.error {
        Some(e) => (e.error_type.clone(), e.reason.clone()),
        None => ("unknown".to_string(), format!("item failed with status {}", item.status)),
    };
    IngestError::permanent(item.status, error_type, reason).into_failed_record(batch.records[pos].clone())
}

fn request_failure_kind(error: &SearchIndexError) -> (u16, &'static str) {
    match error {
        SearchIndexError::HttpError { status, .. } => (*status, "http_error"),
        SearchIndexError::ConnectionError(_) => (0, "connection_error"),
        SearchIndexError::ParseError(_) => (0, "response_parse_error"),
        _ => (0, "request_error"),
    }
}
