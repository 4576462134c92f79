//! Delimited text with a header row.

use std::io::Cursor;

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use index_refresh_shared::Record;
use serde_json::Map;

use super::{build_record, coerce_cell, ReadError};

/// Reads CSV records, one record per row after the header.
///
/// Rows with a different number of columns than the header make the file malformed.
pub struct TabularReader {
    headers: Option<StringRecord>,
    rows: StringRecordsIntoIter<Cursor<Vec<u8>>>,
    id_field: String,
    position: u64,
    pending_error: Option<String>,
    done: bool,
}

impl TabularReader {
    pub fn new(data: Vec<u8>, id_field: &str) -> Self {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::Headers)
            .from_reader(Cursor::new(data));

        let (headers, pending_error) = match reader.headers() {
            Ok(h) => (Some(h.clone()), None),
            Err(e) => (None, Some(format!("invalid header row: {}", e))),
        };

        Self {
            headers,
            rows: reader.into_records(),
            id_field: id_field.to_string(),
            position: 0,
            pending_error,
            done: false,
        }
    }
}

impl Iterator for TabularReader {
    type Item = Result<Record, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(reason) = self.pending_error.take() {
            self.done = true;
            return Some(Err(ReadError::Malformed(reason)));
        }

        let headers = self.headers.as_ref()?;
        let row = match self.rows.next()? {
            Ok(row) => row,
            Err(e) => {
                self.done = true;
                return Some(Err(ReadError::Malformed(format!(
                    "row {}: {}",
                    self.position + 1,
                    e
                ))));
            }
        };

        self.position += 1;
        let fields: Map<_, _> = headers
            .iter()
            .zip(row.iter())
            .map(|(name, cell)| (name.to_string(), coerce_cell(cell)))
            .collect();

        Some(build_record(fields, &self.id_field, self.position))
    }
}
