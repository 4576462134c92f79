//! Search index provider trait definition.
//!
//! This module defines the capability interface that every index operation
//! (ingest, cleanup, reindex, alias switch) is composed from.

use async_trait::async_trait;

use crate::errors::SearchIndexError;
use crate::types::{AliasAction, BulkResponse, ReindexSummary};
use index_refresh_shared::HealthStatus;

/// Abstracts the underlying search index implementation (OpenSearch, Elasticsearch, etc.).
///
/// Implementations are shared behind an `Arc` by the ingestion pipeline and
/// the admin operations, and replaced by in-memory mocks in tests.
///
/// All methods return `Result<T, SearchIndexError>` for consistent error handling across
/// different backend implementations.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Check whether an index exists.
    ///
    /// # Arguments
    ///
    /// * `index` - The concrete index name
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the index exists
    /// * `Ok(false)` - If the cluster reports it missing
    /// * `Err(SearchIndexError)` - If the check itself fails
    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError>;

    /// Count the documents in an index.
    ///
    /// # Returns
    ///
    /// * `Ok(u64)` - The document count
    /// * `Err(SearchIndexError::IndexNotFound)` - If the index does not exist
    async fn document_count(&self, index: &str) -> Result<u64, SearchIndexError>;

    /// List the aliases pointing at an index. Empty when the index is not live.
    async fn index_aliases(&self, index: &str) -> Result<Vec<String>, SearchIndexError>;

    /// List the indices an alias currently resolves to. Empty when the alias does not exist.
    async fn alias_indices(&self, alias: &str) -> Result<Vec<String>, SearchIndexError>;

    /// Health of a single index.
    ///
    /// Unexpected status values are reported as `HealthStatus::Unknown`.
    async fn index_health(&self, index: &str) -> Result<HealthStatus, SearchIndexError>;

    /// Apply alias actions in one atomic request.
    ///
    /// Either every action is applied or none is.
    ///
    /// # Arguments
    ///
    /// * `actions` - Ordered add/remove actions
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchIndexError>;

    /// Submit a bulk request.
    ///
    /// # Arguments
    ///
    /// * `index` - The destination index
    /// * `lines` - Newline-free action and document lines, alternating
    ///
    /// # Returns
    ///
    /// * `Ok(BulkResponse)` - One outcome per action, in request order. Item
    ///   failures are reported here, not as an error.
    /// * `Err(SearchIndexError)` - If the request as a whole fails
    async fn bulk(&self, index: &str, lines: Vec<String>) -> Result<BulkResponse, SearchIndexError>;

    /// Delete every document of an index, returning how many were deleted.
    async fn delete_all_documents(&self, index: &str) -> Result<u64, SearchIndexError>;

    /// Force-merge an index to reclaim the space held by deleted documents.
    async fn force_merge(&self, index: &str) -> Result<(), SearchIndexError>;

    /// Copy every document of `source` into `target` and wait for completion.
    async fn reindex(&self, source: &str, target: &str) -> Result<ReindexSummary, SearchIndexError>;

    /// Make recent writes visible to counts and searches.
    async fn refresh(&self, index: &str) -> Result<(), SearchIndexError>;

    /// Check that the cluster is reachable.
    async fn health_check(&self) -> Result<(), SearchIndexError>;
}
