//! # Index Refresh Repository
//!
//! This crate provides the capability interface every index operation is
//! composed from (existence, counts, aliases, health, bulk writes, cleanup,
//! reindex) and a concrete implementation for OpenSearch.

pub mod config;
pub mod errors;
pub mod interfaces;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod opensearch;
pub mod types;

pub use config::OpenSearchConfig;
pub use errors::SearchIndexError;
pub use interfaces::SearchIndexProvider;
pub use opensearch::OpenSearchClient;
pub use types::{AliasAction, BulkItemError, BulkItemOutcome, BulkResponse, ReindexSummary};
