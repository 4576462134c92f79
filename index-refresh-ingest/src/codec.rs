//! Bulk wire encoding.
//!
//! Each record becomes an action line and a document line. Records with an
//! id are sent as `index` with `_id`, so an existing document is replaced
//! as a whole and a missing one is created. Records without an id are sent
//! as `create` and the index assigns the id.

use index_refresh_shared::{Record, WriteAction};
use serde_json::json;

/// The two bulk lines of one record, without trailing newlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    pub action: String,
    pub document: String,
}

impl EncodedRecord {
    /// Bytes this record adds to a bulk body, newlines included.
    pub fn wire_size(&self) -> usize {
        self.action.len() + self.document.len() + 2
    }
}

pub fn encode_record(index: &str, record: &Record) -> Result<EncodedRecord, serde_json::Error> {
    let (action, document) = match (record.action(), record.id.as_deref()) {
        (WriteAction::Upsert, Some(id)) => (
            json!({"index": {"_index": index, "_id": id}}),
            serde_json::Value::Object(record.fields.clone()),
        ),
        _ => (
            json!({"create": {"_index": index}}),
            serde_json::Value::Object(record.fields.clone()),
        ),
    };

    Ok(EncodedRecord {
        action: serde_json::to_string(&action)?,
        document: serde_json::to_string(&document)?,
    })
}

/// Flatten encoded records into the alternating line list of a bulk body.
pub fn to_lines<'a>(records: impl IntoIterator<Item = &'a EncodedRecord>) -> Vec<String> {
    records
        .into_iter()
        .flat_map(|r| [r.action.clone(), r.document.clone()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    fn record(id: Option<&str>) -> Record {
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!("Widget"));
        Record::new(fields, id.map(str::to_string), 1)
    }

    #[test]
    fn test_upsert_encoding() {
        let encoded = encode_record("products", &record(Some("42"))).unwrap();
        let action: Value = serde_json::from_str(&encoded.action).unwrap();
        let document: Value = serde_json::from_str(&encoded.document).unwrap();

        assert_eq!(action, json!({"index": {"_index": "products", "_id": "42"}}));
        // the whole document, not a partial update
        assert_eq!(document, json!({"name": "Widget"}));
    }

    #[test]
    fn test_create_encoding() {
        let encoded = encode_record("products", &record(None)).unwrap();
        let action: Value = serde_json::from_str(&encoded.action).unwrap();

        assert_eq!(action, json!({"create": {"_index": "products"}}));
        assert_eq!(encoded.document, r#"{"name":"Widget"}"#);
        assert!(!encoded.action.contains('\n'));
    }

    #[test]
    fn test_wire_size_counts_newlines() {
        let encoded = encode_record("products", &record(None)).unwrap();
        assert_eq!(
            encoded.wire_size(),
            encoded.action.len() + encoded.document.len() + 2
        );
        assert_eq!(to_lines([&encoded]).len(), 2);
    }
}
