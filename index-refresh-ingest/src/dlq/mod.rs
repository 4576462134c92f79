//! Dead-letter reporting for records that could not be indexed.
//!
//! A report for one source file is split into as few ordered envelopes as
//! the channel's message ceiling allows. All parts of a report share a
//! `report_id` and carry `part_index` / `total_parts`, so a consumer can
//! detect missing parts and reassemble them in record order.

mod sqs;

pub use sqs::{QueueArn, SqsDlqSink, SQS_MAX_MESSAGE_BYTES};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use index_refresh_shared::{DlqEnvelope, DlqRecord, FailedRecord, SourceFile, DLQ_SOURCE_TAG};
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::IngestError;

/// Longest error reason kept on a record whose document had to be truncated.
const MAX_TRUNCATED_REASON_CHARS: usize = 1024;

/// Longest document id or error type kept on a truncated record.
const MAX_TRUNCATED_FIELD_CHARS: usize = 256;

/// A channel accepting serialized dead-letter envelopes.
#[async_trait]
pub trait DlqSink: Send + Sync {
    /// Hard size limit of one message body, in bytes.
    fn max_message_bytes(&self) -> usize;

    /// Send one message body.
    async fn send(&self, body: String) -> Result<(), IngestError>;
}

/// What happened to one error report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    pub parts_sent: usize,
    pub records: usize,
    /// Records that fit no message even when truncated. Logged, never sent.
    pub unsendable: usize,
    /// True when every part reached the channel, or the channel is disabled
    /// and the records were logged instead.
    pub delivered: bool,
}

/// Reports failed records to the dead-letter channel, or to the log when
/// the channel is disabled. Never fails the caller.
pub struct ErrorReporter {
    sink: Option<Arc<dyn DlqSink>>,
}

impl ErrorReporter {
    pub fn new(sink: Arc<dyn DlqSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// A reporter that only logs failed records.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Report `failed` records from `source`.
    #[instrument(skip(self, source, failed), fields(source = %source, records = failed.len()))]
    pub async fn report(
        &self,
        source: &SourceFile,
        error_message: &str,
        failed: &[FailedRecord],
    ) -> ReportOutcome {
        let mut outcome = ReportOutcome {
            parts_sent: 0,
            records: failed.len(),
            unsendable: 0,
            delivered: true,
        };
        if failed.is_empty() {
            return outcome;
        }

        let Some(sink) = &self.sink else {
            for f in failed {
                warn!(
                    source_file = %source,
                    position = f.record.position,
                    document_id = f.record.id.as_deref().unwrap_or(""),
                    status = f.status,
                    error_type = %f.error_type,
                    error_reason = %f.error_reason,
                    "Record failed (DLQ disabled)"
                );
            }
            return outcome;
        };

        let split = match build_envelopes(
            &source.identity(),
            error_message,
            failed,
            sink.max_message_bytes(),
        ) {
            Ok(split) => split,
            Err(e) => {
                error!(error = %e, "Cannot build DLQ envelopes");
                outcome.delivered = false;
                return outcome;
            }
        };

        for &i in &split.unsendable {
            let f = &failed[i];
            error!(
                source_file = %source,
                position = f.record.position,
                document_id = f.record.id.as_deref().unwrap_or(""),
                status = f.status,
                error_type = %f.error_type,
                error_reason = %f.error_reason,
                "Record does not fit a DLQ message, dropped from the report"
            );
        }
        if !split.unsendable.is_empty() {
            outcome.unsendable = split.unsendable.len();
            outcome.delivered = false;
        }
        let envelopes = split.envelopes;

        for envelope in &envelopes {
            let body = match serde_json::to_string(envelope) {
                Ok(body) => body,
                Err(e) => {
                    error!(error = %e, part = envelope.part_index, "Cannot serialize DLQ envelope");
                    outcome.delivered = false;
                    continue;
                }
            };
            match sink.send(body).await {
                Ok(()) => outcome.parts_sent += 1,
                Err(e) => {
                    error!(
                        error = %e,
                        part = envelope.part_index,
                        total_parts = envelope.total_parts,
                        "Failed to send DLQ message"
                    );
                    outcome.delivered = false;
                }
            }
        }

        info!(
            parts = outcome.parts_sent,
            total_parts = envelopes.len(),
            "Reported failed records to DLQ"
        );
        outcome
    }
}

fn to_dlq_record(failed: &FailedRecord) -> DlqRecord {
    DlqRecord {
        document_id: failed.record.id.clone(),
        error_type: failed.error_type.clone(),
        error_reason: failed.error_reason.clone(),
        status: failed.status,
        document: failed.record.document(),
    }
}

fn json_len<T: serde::Serialize>(value: &T) -> Result<usize, IngestError> {
    serde_json::to_vec(value)
        .map(|v| v.len())
        .map_err(|e| IngestError::dlq(e.to_string()))
}

fn truncate_chars(value: &mut String, max: usize) {
    if value.chars().count() > max {
        *value = value.chars().take(max).collect();
    }
}

/// Replace the document by a marker so the record fits a message on its own.
fn truncate_record(mut record: DlqRecord, original_bytes: usize) -> DlqRecord {
    record.document = Value::String(format!(
        "[truncated: document of {} bytes exceeds the message ceiling]",
        original_bytes
    ));
    if let Some(id) = record.document_id.as_mut() {
        truncate_chars(id, MAX_TRUNCATED_FIELD_CHARS);
    }
    truncate_chars(&mut record.error_type, MAX_TRUNCATED_FIELD_CHARS);
    truncate_chars(&mut record.error_reason, MAX_TRUNCATED_REASON_CHARS);
    record
}

/// A report split into envelopes.
#[derive(Debug, Clone)]
pub struct EnvelopeSplit {
    pub envelopes: Vec<DlqEnvelope>,
    /// Indices into the failed records of those left out because they fit
    /// no message even when truncated.
    pub unsendable: Vec<usize>,
}

/// Split `failed` into the fewest ordered envelopes that each serialize
/// within `ceiling` bytes.
///
/// The fixed overhead is measured on an empty envelope whose counters hold
/// the largest value any part can carry, so the real parts are never larger
/// than estimated. A record that does not fit even when truncated is left
/// out and the rest keep their order.
pub fn build_envelopes(
    source_file: &str,
    error_message: &str,
    failed: &[FailedRecord],
    ceiling: usize,
) -> Result<EnvelopeSplit, IngestError> {
    let total = failed.len();
    if total == 0 {
        return Ok(EnvelopeSplit {
            envelopes: Vec::new(),
            unsendable: Vec::new(),
        });
    }

    let template = DlqEnvelope {
        report_id: Uuid::new_v4(),
        part_index: total,
        total_parts: total,
        total_records: total,
        report_total_records: total,
        timestamp: Utc::now(),
        source: DLQ_SOURCE_TAG.to_string(),
        source_file: source_file.to_string(),
        error_message: error_message.to_string(),
        records: Vec::new(),
    };
    let overhead = json_len(&template)?;
    if overhead >= ceiling {
        return Err(IngestError::dlq(format!(
            "envelope overhead of {} bytes leaves no room under {} bytes",
            overhead, ceiling
        )));
    }
    let room = ceiling - overhead;

    let mut parts: Vec<Vec<DlqRecord>> = Vec::new();
    let mut current: Vec<DlqRecord> = Vec::new();
    let mut used = 0;
    let mut unsendable = Vec::new();

    for (i, f) in failed.iter().enumerate() {
        let mut record = to_dlq_record(f);
        // +1 for the separating comma
        let mut size = json_len(&record)? + 1;
        if size > room {
            record = truncate_record(record, size);
            size = json_len(&record)? + 1;
            if size > room {
                unsendable.push(i);
                continue;
            }
        }

        if used + size > room && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(record);
        used += size;
    }
    if !current.is_empty() {
        parts.push(current);
    }

    let carried = total - unsendable.len();
    let total_parts = parts.len();
    let envelopes = parts
        .into_iter()
        .enumerate()
        .map(|(i, records)| DlqEnvelope {
            part_index: i + 1,
            total_parts,
            total_records: records.len(),
            report_total_records: carried,
            records,
            ..template.clone()
        })
        .collect();

    Ok(EnvelopeSplit {
        envelopes,
        unsendable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use index_refresh_shared::{Record, SourceFormat};
    use serde_json::{json, Map};
    use tokio::sync::Mutex;

    struct RecordingSink {
        ceiling: usize,
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl DlqSink for RecordingSink {
        fn max_message_bytes(&self) -> usize {
            self.ceiling
        }

        async fn send(&self, body: String) -> Result<(), IngestError> {
            if self.fail {
                return Err(IngestError::dlq("queue unavailable"));
            }
            self.messages.lock().await.push(body);
            Ok(())
        }
    }

    fn failed(position: u64, payload_len: usize) -> FailedRecord {
        let mut fields = Map::new();
        fields.insert("payload".to_string(), json!("p".repeat(payload_len)));
        FailedRecord::new(
            Record::new(fields, Some(position.to_string()), position),
            400,
            "mapper_parsing_exception",
            "failed to parse",
        )
    }

    #[test]
    fn test_single_part_when_it_fits() {
        let records = vec![failed(1, 10), failed(2, 10)];
        let envelopes = build_envelopes("bucket/a.csv", "2 failed", &records, 256 * 1024)
            .unwrap()
            .envelopes;

        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].part_index, 1);
        assert_eq!(envelopes[0].total_parts, 1);
        assert_eq!(envelopes[0].total_records, 2);
        assert_eq!(envelopes[0].source, DLQ_SOURCE_TAG);
    }

    #[test]
    fn test_split_preserves_order_and_sizes() {
        let records: Vec<_> = (1..=40).map(|i| failed(i, 500)).collect();
        let ceiling = 4096;
        let envelopes = build_envelopes("bucket/a.csv", "40 failed", &records, ceiling)
            .unwrap()
            .envelopes;

        assert!(envelopes.len() > 1);
        assert_eq!(
            envelopes.iter().map(|e| e.total_records).sum::<usize>(),
            records.len()
        );
        for (i, envelope) in envelopes.iter().enumerate() {
            assert_eq!(envelope.part_index, i + 1);
            assert_eq!(envelope.total_parts, envelopes.len());
            assert_eq!(envelope.report_total_records, 40);
            assert_eq!(envelope.report_id, envelopes[0].report_id);
            assert!(serde_json::to_vec(envelope).unwrap().len() <= ceiling);
        }

        let ids: Vec<_> = envelopes
            .iter()
            .flat_map(|e| e.records.iter().map(|r| r.document_id.clone().unwrap()))
            .collect();
        let expected: Vec<_> = (1..=40).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_oversized_record_is_truncated() {
        let records = vec![failed(1, 10), failed(2, 10_000)];
        let envelopes = build_envelopes("bucket/a.csv", "2 failed", &records, 2048)
            .unwrap()
            .envelopes;

        let all: Vec<_> = envelopes.iter().flat_map(|e| e.records.iter()).collect();
        assert_eq!(all.len(), 2);
        assert!(all[1].document.as_str().unwrap().starts_with("[truncated"));
        assert!(envelopes
            .iter()
            .all(|e| serde_json::to_vec(e).unwrap().len() <= 2048));
    }

    #[test]
    fn test_huge_identifier_is_truncated() {
        let mut big = failed(2, 10);
        big.record.id = Some("b".repeat(5000));
        let mut records = vec![failed(1, 10), big, failed(3, 10)];
        records[0].record.id = Some("a".to_string());
        records[2].record.id = Some("c".to_string());

        let split = build_envelopes("bucket/a.csv", "3 failed", &records, 4096).unwrap();

        assert!(split.unsendable.is_empty());
        let ids: Vec<_> = split
            .envelopes
            .iter()
            .flat_map(|e| e.records.iter().map(|r| r.document_id.clone().unwrap()))
            .collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], "a");
        assert_eq!(ids[1].len(), MAX_TRUNCATED_FIELD_CHARS);
        assert_eq!(ids[2], "c");
    }

    #[test]
    fn test_unfittable_record_is_isolated() {
        let mut huge = failed(2, 10_000);
        huge.error_reason = "r".repeat(5000);
        let records = vec![failed(1, 10), huge, failed(3, 10)];

        let split = build_envelopes("bucket/a.csv", "3 failed", &records, 900).unwrap();

        assert_eq!(split.unsendable, vec![1]);
        let ids: Vec<_> = split
            .envelopes
            .iter()
            .flat_map(|e| e.records.iter().map(|r| r.document_id.clone().unwrap()))
            .collect();
        assert_eq!(ids, vec!["1".to_string(), "3".to_string()]);
        for envelope in &split.envelopes {
            assert_eq!(envelope.report_total_records, 2);
            assert!(serde_json::to_vec(envelope).unwrap().len() <= 900);
        }
    }

    #[tokio::test]
    async fn test_report_sends_the_rest_when_one_record_is_unsendable() {
        let sink = Arc::new(RecordingSink {
            ceiling: 900,
            messages: Mutex::new(Vec::new()),
            fail: false,
        });
        let reporter = ErrorReporter::new(sink.clone());
        let source = SourceFile::local("/data/a.csv", SourceFormat::Tabular, 0);
        let mut huge = failed(2, 10_000);
        huge.error_reason = "r".repeat(5000);

        let outcome = reporter
            .report(&source, "3 failed", &[failed(1, 10), huge, failed(3, 10)])
            .await;

        assert!(!outcome.delivered);
        assert_eq!(outcome.unsendable, 1);
        assert!(outcome.parts_sent >= 1);
        let sent: usize = sink
            .messages
            .lock()
            .await
            .iter()
            .map(|m| serde_json::from_str::<DlqEnvelope>(m).unwrap().total_records)
            .sum();
        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn test_report_sends_every_part() {
        let sink = Arc::new(RecordingSink {
            ceiling: 4096,
            messages: Mutex::new(Vec::new()),
            fail: false,
        });
        let reporter = ErrorReporter::new(sink.clone());
        let source = SourceFile::local("/data/a.csv", SourceFormat::Tabular, 0);
        let records: Vec<_> = (1..=20).map(|i| failed(i, 500)).collect();

        let outcome = reporter.report(&source, "20 failed", &records).await;

        assert!(outcome.delivered);
        let messages = sink.messages.lock().await;
        assert_eq!(messages.len(), outcome.parts_sent);
        let total: usize = messages
            .iter()
            .map(|m| serde_json::from_str::<DlqEnvelope>(m).unwrap().total_records)
            .sum();
        assert_eq!(total, 20);
    }

    #[tokio::test]
    async fn test_report_survives_channel_failure() {
        let sink = Arc::new(RecordingSink {
            ceiling: 4096,
            messages: Mutex::new(Vec::new()),
            fail: true,
        });
        let reporter = ErrorReporter::new(sink);
        let source = SourceFile::local("/data/a.csv", SourceFormat::Tabular, 0);

        let outcome = reporter.report(&source, "1 failed", &[failed(1, 10)]).await;
        assert!(!outcome.delivered);
        assert_eq!(outcome.parts_sent, 0);
    }

    #[tokio::test]
    async fn test_disabled_reporter_logs_only() {
        let reporter = ErrorReporter::disabled();
        let source = SourceFile::local("/data/a.csv", SourceFormat::Tabular, 0);

        let outcome = reporter.report(&source, "1 failed", &[failed(1, 10)]).await;
        assert!(outcome.delivered);
        assert_eq!(outcome.parts_sent, 0);
        assert!(!reporter.is_enabled());
    }
}
