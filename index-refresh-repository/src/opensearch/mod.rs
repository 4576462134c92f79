//! OpenSearch implementation of the search index provider.

mod client;

pub use client::OpenSearchClient;
