//! Error types for the index refresh repository.

mod search_index_error;

pub use search_index_error::SearchIndexError;
