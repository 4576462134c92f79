//! Ingestion run.
//!
//! Enumerates the sources, validates the destination, prepares it for the
//! selected mode, drives the worker pool and verifies the final document
//! count.

use std::sync::Arc;
use std::time::{Duration, Instant};

use index_refresh_admin::{GuardrailValidator, IndexCleaner};
use index_refresh_repository::SearchIndexProvider;
use index_refresh_shared::{GuardedOperation, IngestMode};
use tracing::{error, info, instrument, warn};

use crate::counters::IngestCounters;
use crate::dlq::ErrorReporter;
use crate::errors::IngestError;
use crate::pool::{PoolComponents, PoolConfig, WorkerPool};
use crate::source::{SourceCatalog, SourceSpec};
use crate::submitter::{BulkSubmitter, SubmitterConfig};
use crate::summary::{RunStatus, RunSummary};
use crate::tracker::ResumeTracker;

/// Configuration for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Destination index. Must be a concrete index, not an alias.
    pub index: String,
    pub mode: IngestMode,
    pub pool: PoolConfig,
    pub submitter: SubmitterConfig,
    /// Count lookups made before verification gives up.
    pub verify_attempts: u32,
    /// Delay between count lookups.
    pub verify_delay: Duration,
}

impl IngestConfig {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            mode: IngestMode::default(),
            pool: PoolConfig::default(),
            submitter: SubmitterConfig::default(),
            verify_attempts: 3,
            verify_delay: Duration::from_secs(5),
        }
    }
}

/// Runs ingestions against one search cluster.
pub struct IngestRunner {
    provider: Arc<dyn SearchIndexProvider>,
    validator: Arc<GuardrailValidator>,
    catalog: Arc<SourceCatalog>,
    reporter: Arc<ErrorReporter>,
    tracker: Arc<ResumeTracker>,
}

impl IngestRunner {
    pub fn new(
        provider: Arc<dyn SearchIndexProvider>,
        validator: Arc<GuardrailValidator>,
        catalog: Arc<SourceCatalog>,
        reporter: Arc<ErrorReporter>,
        tracker: Arc<ResumeTracker>,
    ) -> Self {
        Self {
            provider,
            validator,
            catalog,
            reporter,
            tracker,
        }
    }

    /// Ingest every file described by `spec` into `config.index`.
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run finished and the document count matched.
    ///   Files that were malformed or whose failures could not be reported
    ///   are counted in `files_failed`.
    /// * `Err(IngestError)` - A guardrail refused the run, a fatal error
    ///   stopped it, or the final count did not match
    #[instrument(skip(self, config, spec), fields(index = %config.index, mode = ?config.mode))]
    pub async fn run(
        &self,
        config: &IngestConfig,
        spec: &SourceSpec,
    ) -> Result<RunSummary, IngestError> {
        let started = Instant::now();
        let index = config.index.as_str();
        let mut summary = RunSummary::new(index, config.mode);

        let mut files = self.catalog.enumerate(spec).await?;
        summary.total_files = files.len();
        if files.is_empty() {
            warn!("No files to process");
            summary.status = RunStatus::NoFiles;
            summary.elapsed_secs = started.elapsed().as_secs_f64();
            summary.log();
            return Ok(summary);
        }

        self.validator
            .validate(index, &GuardedOperation::Ingest)
            .await?;

        match config.mode {
            IngestMode::FreshLoad => {
                // forget progress first so a failed cleanup can never leave
                // tracked files pointing at deleted documents
                self.tracker.reset(index).await?;
                let cleaner = IndexCleaner::new(self.provider.clone(), self.validator.clone());
                cleaner.cleanup(index).await?;
            }
            IngestMode::Resume => {
                let mut pending = Vec::with_capacity(files.len());
                for file in files {
                    if self.tracker.is_processed(index, &file).await {
                        info!(file = %file, "Skipping already processed file");
                    } else {
                        pending.push(file);
                    }
                }
                summary.files_skipped = summary.total_files - pending.len();
                files = pending;
            }
        }

        summary.baseline_count = self.provider.document_count(index).await?;
        info!(
            files = files.len(),
            skipped = summary.files_skipped,
            baseline = summary.baseline_count,
            "Starting ingestion"
        );

        let counters = Arc::new(IngestCounters::new());
        let submitter = BulkSubmitter::new(
            self.provider.clone(),
            index,
            config.submitter.clone(),
            counters.clone(),
        );
        let pool = WorkerPool::new(
            index,
            config.pool.clone(),
            PoolComponents {
                catalog: self.catalog.clone(),
                submitter: Arc::new(submitter),
                reporter: self.reporter.clone(),
                tracker: self.tracker.clone(),
                counters: counters.clone(),
            },
        );
        let outcome = pool.run(files).await;

        summary.files_completed = outcome.files_completed;
        summary.files_failed = outcome.files_failed;
        summary.apply_counters(counters.snapshot());

        if let Some(fatal) = outcome.fatal {
            error!(error = %fatal, "Ingestion stopped");
            summary.status = RunStatus::Failed;
            summary.elapsed_secs = started.elapsed().as_secs_f64();
            summary.log();
            return Err(fatal);
        }

        let verified = self.verify_count(config, &mut summary).await;
        summary.elapsed_secs = started.elapsed().as_secs_f64();
        if verified.is_err() {
            summary.status = RunStatus::Failed;
        }
        summary.log();
        verified.map(|_| summary)
    }

    /// Refresh the index and compare its count with what the run created.
    async fn verify_count(
        &self,
        config: &IngestConfig,
        summary: &mut RunSummary,
    ) -> Result<(), IngestError> {
        let index = config.index.as_str();
        self.provider.refresh(index).await?;

        let expected = summary.expected_count();
        let attempts = config.verify_attempts.max(1);
        let mut actual = 0;
        for attempt in 1..=attempts {
            actual = self.provider.document_count(index).await?;
            summary.final_count = Some(actual);
            if actual == expected {
                info!(expected, actual, "Document count verified");
                return Ok(());
            }
            warn!(attempt, attempts, expected, actual, "Document count mismatch");
            if attempt < attempts {
                tokio::time::sleep(config.verify_delay).await;
            }
        }
        Err(IngestError::CountVerification { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use index_refresh_admin::{GuardrailConfig, GuardrailError};
    use index_refresh_repository::memory::InMemoryIndexProvider;

    struct Fixture {
        provider: Arc<InMemoryIndexProvider>,
        runner: IngestRunner,
        dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let provider = Arc::new(InMemoryIndexProvider::new());
        let dir = tempfile::tempdir().unwrap();
        let tracker = ResumeTracker::load(dir.path().join("processed.json"))
            .await
            .unwrap();
        let validator = Arc::new(GuardrailValidator::new(
            provider.clone(),
            GuardrailConfig::default(),
        ));
        let runner = IngestRunner::new(
            provider.clone(),
            validator,
            Arc::new(SourceCatalog::local_only()),
            Arc::new(ErrorReporter::disabled()),
            Arc::new(tracker),
        );
        Fixture {
            provider,
            runner,
            dir,
        }
    }

    fn config(mode: IngestMode) -> IngestConfig {
        IngestConfig {
            mode,
            verify_attempts: 1,
            verify_delay: Duration::from_millis(1),
            ..IngestConfig::new("products")
        }
    }

    fn folder_spec(f: &Fixture) -> SourceSpec {
        SourceSpec {
            local_folder: Some(f.dir.path().join("data")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_files_touches_nothing() {
        let f = fixture().await;
        std::fs::create_dir(f.dir.path().join("data")).unwrap();
        f.provider.create_index_with_documents("products", 3).await;

        let summary = f
            .runner
            .run(&config(IngestMode::FreshLoad), &folder_spec(&f))
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::NoFiles);
        assert!(!f.provider.mutated().await);
        assert_eq!(f.provider.document_count("products").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fresh_load_replaces_documents() {
        let f = fixture().await;
        let data = f.dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(data.join("a.csv"), "id,name\n1,a\n2,b\n").unwrap();
        f.provider.create_index_with_documents("products", 10).await;

        let summary = f
            .runner
            .run(&config(IngestMode::FreshLoad), &folder_spec(&f))
            .await
            .unwrap();

        assert_eq!(summary.baseline_count, 0);
        assert_eq!(summary.final_count, Some(2));
        assert!(summary.is_clean());
    }

    #[tokio::test]
    async fn test_fresh_load_is_idempotent() {
        let f = fixture().await;
        let data = f.dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(data.join("a.csv"), "name\na\nb\nc\n").unwrap();
        f.provider.create_index("products").await;

        let first = f
            .runner
            .run(&config(IngestMode::FreshLoad), &folder_spec(&f))
            .await
            .unwrap();
        let second = f
            .runner
            .run(&config(IngestMode::FreshLoad), &folder_spec(&f))
            .await
            .unwrap();

        assert_eq!(first.final_count, Some(3));
        assert_eq!(second.final_count, Some(3));
    }

    #[tokio::test]
    async fn test_live_index_is_refused_before_mutation() {
        let f = fixture().await;
        let data = f.dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(data.join("a.csv"), "id\n1\n").unwrap();
        f.provider.create_index_with_documents("products", 5).await;
        f.provider.add_alias("products-live", "products").await;

        let result = f
            .runner
            .run(&config(IngestMode::FreshLoad), &folder_spec(&f))
            .await;

        assert!(matches!(
            result,
            Err(IngestError::Guardrail(GuardrailError::LiveTraffic { .. }))
        ));
        assert!(!f.provider.mutated().await);
    }

    #[tokio::test]
    async fn test_resume_keeps_existing_documents() {
        let f = fixture().await;
        let data = f.dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        std::fs::write(data.join("a.csv"), "id\n1\n2\n").unwrap();
        f.provider.create_index_with_documents("products", 4).await;

        let summary = f
            .runner
            .run(&config(IngestMode::Resume), &folder_spec(&f))
            .await
            .unwrap();

        assert_eq!(summary.baseline_count, 4);
        assert_eq!(summary.final_count, Some(6));

        std::fs::write(data.join("b.csv"), "id\n3\n").unwrap();
        let summary = f
            .runner
            .run(&config(IngestMode::Resume), &folder_spec(&f))
            .await
            .unwrap();
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_completed, 1);
        assert_eq!(summary.final_count, Some(7));
    }
}
