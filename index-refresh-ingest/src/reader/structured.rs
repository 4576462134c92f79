//! JSON sources: an array of objects, a single object, or JSON Lines.

use std::io::Cursor;

use index_refresh_shared::Record;
use serde_json::de::IoRead;
use serde_json::{Deserializer, StreamDeserializer, Value};

use super::{build_record, ReadError};

type ValueStream = StreamDeserializer<'static, IoRead<Cursor<Vec<u8>>>, Value>;

enum Inner {
    Array(std::vec::IntoIter<Value>),
    Stream(ValueStream),
    Done,
}

/// Reads JSON records. Nested objects and arrays pass through unchanged.
///
/// A document starting with `[` is read as an array. Anything else is read
/// as a sequence of whitespace-separated values, which covers both a single
/// object and newline-delimited objects.
pub struct StructuredReader {
    inner: Inner,
    id_field: String,
    position: u64,
    pending_error: Option<String>,
}

impl StructuredReader {
    pub fn new(data: Vec<u8>, id_field: &str) -> Self {
        let body = skip_bom(&data);
        let is_array = body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'[');

        let (inner, pending_error) = if is_array {
            match serde_json::from_slice::<Vec<Value>>(body) {
                Ok(values) => (Inner::Array(values.into_iter()), None),
                Err(e) => (Inner::Done, Some(format!("invalid JSON array: {}", e))),
            }
        } else {
            let stream = Deserializer::from_reader(Cursor::new(body.to_vec())).into_iter::<Value>();
            (Inner::Stream(stream), None)
        };

        Self {
            inner,
            id_field: id_field.to_string(),
            position: 0,
            pending_error,
        }
    }

    fn next_value(&mut self) -> Option<Result<Value, String>> {
        match &mut self.inner {
            Inner::Array(values) => values.next().map(Ok),
            Inner::Stream(stream) => stream
                .next()
                .map(|r| r.map_err(|e| format!("invalid JSON: {}", e))),
            Inner::Done => None,
        }
    }
}

fn skip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data)
}

impl Iterator for StructuredReader {
    type Item = Result<Record, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(reason) = self.pending_error.take() {
            return Some(Err(ReadError::Malformed(reason)));
        }

        let value = match self.next_value()? {
            Ok(value) => value,
            Err(reason) => {
                self.inner = Inner::Done;
                return Some(Err(ReadError::Malformed(reason)));
            }
        };

        self.position += 1;
        match value {
            Value::Object(fields) => Some(build_record(fields, &self.id_field, self.position)),
            other => {
                self.inner = Inner::Done;
                Some(Err(ReadError::Malformed(format!(
                    "entry {} is not an object: {}",
                    self.position, other
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read(data: &str) -> Vec<Result<Record, ReadError>> {
        StructuredReader::new(data.as_bytes().to_vec(), "id").collect()
    }

    #[test]
    fn test_array_of_objects() {
        let records = read(r#"[{"id": "a", "tags": ["x", "y"]}, {"name": "no id"}]"#);
        assert_eq!(records.len(), 2);

        let first = records[0].as_ref().unwrap();
        assert_eq!(first.id.as_deref(), Some("a"));
        assert_eq!(first.fields["tags"], json!(["x", "y"]));

        let second = records[1].as_ref().unwrap();
        assert_eq!(second.id, None);
        assert_eq!(second.position, 2);
    }

    #[test]
    fn test_single_object() {
        let records = read(r#"{"id": 7, "nested": {"a": 1}}"#);
        assert_eq!(records.len(), 1);
        let record = records[0].as_ref().unwrap();
        assert_eq!(record.id.as_deref(), Some("7"));
        assert_eq!(record.fields["nested"], json!({"a": 1}));
    }

    #[test]
    fn test_json_lines() {
        let records = read("{\"id\": 1}\n{\"id\": 2}\n\n{\"id\": 3}\n");
        let ids: Vec<_> = records
            .iter()
            .map(|r| r.as_ref().unwrap().id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_invalid_syntax_is_malformed() {
        let records = read("{\"id\": 1}\n{\"id\": \n");
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(ReadError::Malformed(_))));

        let records = read("[{\"id\": 1},");
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], Err(ReadError::Malformed(_))));
    }

    #[test]
    fn test_non_object_entry_is_malformed() {
        let records = read(r#"[{"id": 1}, 2, {"id": 3}]"#);
        assert_eq!(records.len(), 2);
        assert!(matches!(records[1], Err(ReadError::Malformed(_))));
    }

    #[test]
    fn test_rejected_identifier_continues() {
        let records = read(r#"[{"id": true}, {"id": 2}]"#);
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], Err(ReadError::Rejected(_))));
        assert!(records[1].is_ok());
    }
}
