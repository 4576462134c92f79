//! Dead-letter envelope sent for records that could not be indexed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Value of the `source` field on every envelope.
pub const DLQ_SOURCE_TAG: &str = "opensearch_ingestion";

/// One failed record as carried on the dead-letter channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqRecord {
    pub document_id: Option<String>,
    pub error_type: String,
    pub error_reason: String,
    pub status: u16,
    pub document: Value,
}

/// One part of an error report.
///
/// A report too large for a single message is split into ordered parts that
/// share `report_id`. `part_index` is 1-based and `total_records` counts the
/// records in this part, so the sum over all parts equals the report size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEnvelope {
    pub report_id: Uuid,
    pub part_index: usize,
    pub total_parts: usize,
    pub total_records: usize,
    pub report_total_records: usize,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub source_file: String,
    pub error_message: String,
    pub records: Vec<DlqRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = DlqEnvelope {
            report_id: Uuid::nil(),
            part_index: 1,
            total_parts: 1,
            total_records: 1,
            report_total_records: 1,
            timestamp: Utc::now(),
            source: DLQ_SOURCE_TAG.to_string(),
            source_file: "bucket/a.csv".to_string(),
            error_message: "1 document(s) failed".to_string(),
            records: vec![DlqRecord {
                document_id: Some("7".to_string()),
                error_type: "mapper_parsing_exception".to_string(),
                error_reason: "failed to parse".to_string(),
                status: 400,
                document: json!({"id": 7}),
            }],
        };

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["part_index"], 1);
        assert_eq!(value["source"], "opensearch_ingestion");
        assert_eq!(value["records"][0]["document_id"], "7");
        assert_eq!(value["records"][0]["status"], 400);
    }
}
