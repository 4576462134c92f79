//! Copying one index into another.

use std::sync::Arc;

use index_refresh_repository::{ReindexSummary, SearchIndexProvider};
use index_refresh_shared::GuardedOperation;
use tracing::{info, instrument, warn};

use crate::cleanup::IndexCleaner;
use crate::errors::AdminError;
use crate::guardrail::GuardrailValidator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexOutcome {
    pub source: String,
    pub target: String,
    pub source_documents: u64,
    pub summary: ReindexSummary,
}

/// Copies a source index into an emptied target index.
pub struct Reindexer {
    provider: Arc<dyn SearchIndexProvider>,
    validator: Arc<GuardrailValidator>,
    cleaner: IndexCleaner,
}

impl Reindexer {
    pub fn new(provider: Arc<dyn SearchIndexProvider>, validator: Arc<GuardrailValidator>) -> Self {
        Self {
            cleaner: IndexCleaner::new(provider.clone(), validator.clone()),
            provider,
            validator,
        }
    }

    /// Reindex `source` into `target`.
    ///
    /// The source may be live. The target must pass the cleanup guardrails and
    /// is emptied before the copy, so the result mirrors the source.
    #[instrument(skip(self))]
    pub async fn reindex(&self, source: &str, target: &str) -> Result<ReindexOutcome, AdminError> {
        if source == target {
            return Err(AdminError::operation_failed(
                "source and target index must differ",
            ));
        }

        let source_report = self
            .validator
            .validate(source, &GuardedOperation::SourceRead)
            .await?;
        if source_report.document_count == 0 {
            return Err(AdminError::EmptySource(source.to_string()));
        }

        self.validator
            .validate(target, &GuardedOperation::ReindexTarget)
            .await?;
        self.cleaner.cleanup(target).await?;

        info!(
            source,
            target,
            documents = source_report.document_count,
            "Starting reindex"
        );
        let summary = self.provider.reindex(source, target).await?;

        if summary.failures > 0 {
            warn!(failures = summary.failures, "Reindex reported failures");
            return Err(AdminError::operation_failed(format!(
                "reindex from {} to {} reported {} failure(s)",
                source, target, summary.failures
            )));
        }

        info!(
            total = summary.total,
            created = summary.created,
            updated = summary.updated,
            took_ms = summary.took_ms,
            "Reindex complete"
        );

        Ok(ReindexOutcome {
            source: source.to_string(),
            target: target.to_string(),
            source_documents: source_report.document_count,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GuardrailError;
    use crate::guardrail::GuardrailConfig;
    use index_refresh_repository::memory::InMemoryIndexProvider;

    fn reindexer(provider: Arc<InMemoryIndexProvider>) -> Reindexer {
        let validator = Arc::new(GuardrailValidator::new(
            provider.clone(),
            GuardrailConfig::default(),
        ));
        Reindexer::new(provider, validator)
    }

    #[tokio::test]
    async fn test_reindex_copies_live_source() {
        let provider = Arc::new(InMemoryIndexProvider::new());
        provider.create_index_with_documents("products_v1", 4).await;
        provider.add_alias("products", "products_v1").await;
        provider.create_index("products_v2").await;

        let outcome = reindexer(provider.clone())
            .reindex("products_v1", "products_v2")
            .await
            .unwrap();

        assert_eq!(outcome.summary.total, 4);
        assert_eq!(outcome.summary.created, 4);
        assert_eq!(provider.document_count("products_v2").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_reindex_refuses_empty_source() {
        let provider = Arc::new(InMemoryIndexProvider::new());
        provider.create_index("products_v1").await;
        provider.create_index("products_v2").await;

        let result = reindexer(provider.clone())
            .reindex("products_v1", "products_v2")
            .await;

        assert!(matches!(result, Err(AdminError::EmptySource(_))));
        assert!(!provider.mutated().await);
    }

    #[tokio::test]
    async fn test_reindex_refuses_live_target() {
        let provider = Arc::new(InMemoryIndexProvider::new());
        provider.create_index_with_documents("products_v1", 4).await;
        provider.create_index_with_documents("products_v2", 2).await;
        provider.add_alias("products", "products_v2").await;

        let result = reindexer(provider.clone())
            .reindex("products_v1", "products_v2")
            .await;

        assert!(matches!(
            result,
            Err(AdminError::Guardrail(GuardrailError::LiveTraffic { .. }))
        ));
        assert_eq!(provider.document_count("products_v2").await.unwrap(), 2);
    }
}
