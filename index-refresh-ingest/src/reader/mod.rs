//! Record reader.
//!
//! Turns the bytes of one source file into a lazy sequence of records, in
//! source order. Tabular and structured sources share one entry point,
//! `open_records`, selected by the file's format.

mod coerce;
mod structured;
mod tabular;

pub use coerce::{coerce_cell, extract_id};
pub use structured::StructuredReader;
pub use tabular::TabularReader;

use index_refresh_shared::{FailedRecord, Record, SourceFormat};
use serde_json::{Map, Value};

/// Status attached to records rejected before they reach the index.
pub const PRE_SUBMISSION_STATUS: u16 = 0;

/// Error type used for records whose identifier cannot be used as a document id.
pub const INVALID_IDENTIFIER: &str = "invalid_identifier";

/// Why the reader could not produce a record.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadError {
    /// The file is not a valid document. Reading stops; the rest of the file is skipped.
    Malformed(String),
    /// This record cannot be indexed. Reading continues with the next record.
    Rejected(FailedRecord),
}

/// A lazy, finite, non-restartable record sequence.
pub type RecordStream = Box<dyn Iterator<Item = Result<Record, ReadError>> + Send>;

/// Open a record sequence over `data` for the given format.
///
/// # Arguments
///
/// * `format` - Tabular or structured
/// * `data` - The complete file contents
/// * `id_field` - Field whose value becomes the document id
pub fn open_records(format: SourceFormat, data: Vec<u8>, id_field: &str) -> RecordStream {
    match format {
        SourceFormat::Tabular => Box::new(TabularReader::new(data, id_field)),
        SourceFormat::Structured => Box::new(StructuredReader::new(data, id_field)),
    }
}

/// Build a record from its fields, resolving the document id.
fn build_record(
    fields: Map<String, Value>,
    id_field: &str,
    position: u64,
) -> Result<Record, ReadError> {
    match extract_id(&fields, id_field) {
        Ok(id) => Ok(Record::new(fields, id, position)),
        Err(reason) => Err(ReadError::Rejected(FailedRecord::new(
            Record::new(fields, None, position),
            PRE_SUBMISSION_STATUS,
            INVALID_IDENTIFIER,
            reason,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_records_dispatches_on_format() {
        let csv = open_records(SourceFormat::Tabular, b"id,name\n1,a\n".to_vec(), "id")
            .collect::<Vec<_>>();
        assert_eq!(csv.len(), 1);

        let json = open_records(
            SourceFormat::Structured,
            br#"[{"id": 1}, {"id": 2}]"#.to_vec(),
            "id",
        )
        .collect::<Vec<_>>();
        assert_eq!(json.len(), 2);
    }
}
