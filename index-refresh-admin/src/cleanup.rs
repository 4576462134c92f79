//! Emptying an index that is not serving traffic.

use std::sync::Arc;

use index_refresh_repository::SearchIndexProvider;
use index_refresh_shared::GuardedOperation;
use tracing::{info, instrument, warn};

use crate::errors::AdminError;
use crate::guardrail::GuardrailValidator;

/// Result of a cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub index: String,
    /// Documents present when validation ran.
    pub documents_before: u64,
    pub documents_deleted: u64,
    /// True when the index was already empty and nothing was deleted.
    pub skipped: bool,
}

/// Deletes every document of an index after validating it.
pub struct IndexCleaner {
    provider: Arc<dyn SearchIndexProvider>,
    validator: Arc<GuardrailValidator>,
}

impl IndexCleaner {
    pub fn new(provider: Arc<dyn SearchIndexProvider>, validator: Arc<GuardrailValidator>) -> Self {
        Self {
            provider,
            validator,
        }
    }

    /// Validate `index` for cleanup, then delete all documents and force-merge.
    ///
    /// The force-merge is best effort: a failure is logged and the cleanup
    /// still succeeds, since the documents are already gone.
    #[instrument(skip(self))]
    pub async fn cleanup(&self, index: &str) -> Result<CleanupOutcome, AdminError> {
        let report = self
            .validator
            .validate(index, &GuardedOperation::Cleanup)
            .await?;

        if report.document_count == 0 {
            info!(index, "Index already empty, nothing to clean up");
            return Ok(CleanupOutcome {
                index: index.to_string(),
                documents_before: 0,
                documents_deleted: 0,
                skipped: true,
            });
        }

        info!(
            index,
            documents = report.document_count,
            "Deleting all documents"
        );
        let deleted = self.provider.delete_all_documents(index).await?;

        if let Err(e) = self.provider.force_merge(index).await {
            warn!(index, error = %e, "Force merge after cleanup failed");
        }

        info!(index, deleted, "Cleanup complete");
        Ok(CleanupOutcome {
            index: index.to_string(),
            documents_before: report.document_count,
            documents_deleted: deleted,
            skipped: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GuardrailError;
    use crate::guardrail::GuardrailConfig;
    use index_refresh_repository::memory::InMemoryIndexProvider;

    fn cleaner(provider: Arc<InMemoryIndexProvider>) -> IndexCleaner {
        let validator = Arc::new(GuardrailValidator::new(
            provider.clone(),
            GuardrailConfig::default(),
        ));
        IndexCleaner::new(provider, validator)
    }

    #[tokio::test]
    async fn test_cleanup_deletes_documents() {
        let provider = Arc::new(InMemoryIndexProvider::new());
        provider.create_index_with_documents("products_v2", 5).await;

        let outcome = cleaner(provider.clone()).cleanup("products_v2").await.unwrap();

        assert_eq!(outcome.documents_deleted, 5);
        assert!(!outcome.skipped);
        assert_eq!(provider.document_count("products_v2").await.unwrap(), 0);
        assert!(provider.calls().await.contains(&"force_merge".to_string()));
    }

    #[tokio::test]
    async fn test_cleanup_skips_empty_index() {
        let provider = Arc::new(InMemoryIndexProvider::new());
        provider.create_index("products_v2").await;

        let outcome = cleaner(provider.clone()).cleanup("products_v2").await.unwrap();

        assert!(outcome.skipped);
        assert!(!provider.mutated().await);
    }

    #[tokio::test]
    async fn test_cleanup_refuses_live_index() {
        let provider = Arc::new(InMemoryIndexProvider::new());
        provider.create_index_with_documents("products_v1", 5).await;
        provider.add_alias("products", "products_v1").await;

        let result = cleaner(provider.clone()).cleanup("products_v1").await;

        assert!(matches!(
            result,
            Err(AdminError::Guardrail(GuardrailError::LiveTraffic { .. }))
        ));
        assert_eq!(provider.document_count("products_v1").await.unwrap(), 5);
    }
}
