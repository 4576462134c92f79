//! Worker pool.
//!
//! One producer task reads every source file, assembles batches and feeds
//! them into a bounded queue; N workers drain the queue, each submitting
//! one batch at a time. The producer blocks when the queue is full, which
//! bounds how far reading runs ahead of submission.
//!
//! A fatal error in any worker broadcasts a stop signal: the producer stops
//! enqueueing, workers finish the batch they hold and exit, and batches
//! still queued are dropped without their files being tracked.

mod ledger;

pub use ledger::{CompletionLedger, FileState};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use index_refresh_shared::{Batch, FailedRecord, SourceFile};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::assembler::BatchAssembler;
use crate::counters::IngestCounters;
use crate::dlq::ErrorReporter;
use crate::errors::IngestError;
use crate::reader::{open_records, ReadError};
use crate::source::SourceCatalog;
use crate::submitter::BulkSubmitter;
use crate::tracker::ResumeTracker;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of concurrent submitting workers.
    pub workers: usize,
    /// Capacity of the batch queue.
    pub queue_capacity: usize,
    /// Maximum records per batch.
    pub batch_size: usize,
    /// Bulk request ceiling in bytes.
    pub max_request_bytes: usize,
    /// Field holding the document id.
    pub id_field: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 8,
            batch_size: 10_000,
            max_request_bytes: 10 * 1024 * 1024,
            id_field: "id".to_string(),
        }
    }
}

/// Shared components the pool drives.
pub struct PoolComponents {
    pub catalog: Arc<SourceCatalog>,
    pub submitter: Arc<BulkSubmitter>,
    pub reporter: Arc<ErrorReporter>,
    pub tracker: Arc<ResumeTracker>,
    pub counters: Arc<IngestCounters>,
}

/// Result of one pool run.
#[derive(Debug)]
pub struct PoolOutcome {
    pub files_completed: usize,
    pub files_failed: usize,
    /// The first fatal error, if the run was stopped.
    pub fatal: Option<IngestError>,
}

struct PoolInner {
    index: String,
    config: PoolConfig,
    components: PoolComponents,
    ledger: CompletionLedger,
    shutdown_tx: broadcast::Sender<()>,
    fatal: Mutex<Option<IngestError>>,
    files_completed: AtomicUsize,
    files_failed: AtomicUsize,
}

pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    pub fn new(index: impl Into<String>, config: PoolConfig, components: PoolComponents) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(PoolInner {
                index: index.into(),
                config,
                components,
                ledger: CompletionLedger::new(),
                shutdown_tx,
                fatal: Mutex::new(None),
                files_completed: AtomicUsize::new(0),
                files_failed: AtomicUsize::new(0),
            }),
        }
    }

    /// Process `files` to completion or until a fatal error.
    #[instrument(skip(self, files), fields(index = %self.inner.index, files = files.len()))]
    pub async fn run(&self, files: Vec<SourceFile>) -> PoolOutcome {
        let workers = self.inner.config.workers.max(1);
        let (tx, rx) = mpsc::channel::<Batch>(self.inner.config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        info!(workers, queue_capacity = self.inner.config.queue_capacity, "Starting worker pool");

        let mut handles = Vec::with_capacity(workers + 1);
        for worker_id in 0..workers {
            let inner = self.inner.clone();
            let rx = rx.clone();
            let shutdown_rx = self.inner.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                inner.work(worker_id, rx, shutdown_rx).await;
            }));
        }
        // workers own the receiver now, so the producer sees a closed queue
        // once they have all exited
        drop(rx);

        let inner = self.inner.clone();
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            inner.produce(files, tx, shutdown_rx).await;
        }));

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Pool task panicked");
                self.inner
                    .fail(IngestError::fatal(format!("pool task panicked: {}", e)))
                    .await;
            }
        }

        let outcome = PoolOutcome {
            files_completed: self.inner.files_completed.load(Ordering::Relaxed),
            files_failed: self.inner.files_failed.load(Ordering::Relaxed),
            fatal: self.inner.fatal.lock().await.take(),
        };
        info!(
            files_completed = outcome.files_completed,
            files_failed = outcome.files_failed,
            stopped = outcome.fatal.is_some(),
            "Worker pool finished"
        );
        outcome
    }
}

impl PoolInner {
    async fn produce(
        &self,
        files: Vec<SourceFile>,
        tx: mpsc::Sender<Batch>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        for file in files {
            if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                info!("Producer stopping");
                return;
            }
            let file = Arc::new(file);
            if !self.produce_file(file, &tx, &mut shutdown_rx).await {
                info!("Producer stopping");
                return;
            }
        }
        debug!("All files enqueued");
    }

    /// Read one file into the queue. Returns false when the pool is stopping.
    #[instrument(skip(self, file, tx, shutdown_rx), fields(file = %file))]
    async fn produce_file(
        &self,
        file: Arc<SourceFile>,
        tx: &mpsc::Sender<Batch>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> bool {
        let identity = file.identity();
        self.ledger.register(file.clone()).await;

        let data = match self.components.catalog.load(&file).await {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "Cannot load source file");
                self.ledger.poison(&identity).await;
                self.settle_sealed(&identity).await;
                return true;
            }
        };

        let mut assembler = BatchAssembler::new(
            file.clone(),
            &self.index,
            self.config.batch_size,
            self.config.max_request_bytes,
        );
        let mut rejected: Vec<FailedRecord> = Vec::new();
        let mut read = 0u64;

        for item in open_records(file.format, data, &self.config.id_field) {
            match item {
                Ok(record) => {
                    read += 1;
                    match assembler.push(record) {
                        Ok(Some(batch)) => {
                            if !self.enqueue(batch, tx, shutdown_rx).await {
                                return false;
                            }
                        }
                        Ok(None) => {}
                        Err(failed) => rejected.push(failed),
                    }
                }
                Err(ReadError::Rejected(failed)) => {
                    read += 1;
                    rejected.push(failed);
                }
                Err(ReadError::Malformed(reason)) => {
                    let e = IngestError::malformed(&identity, reason);
                    error!(error = %e, records_read = read, "Skipping rest of malformed source file");
                    self.ledger.poison(&identity).await;
                    break;
                }
            }
        }
        self.components.counters.add_read(read);

        if let Some(batch) = assembler.finish() {
            if !self.enqueue(batch, tx, shutdown_rx).await {
                return false;
            }
        }

        if !rejected.is_empty() {
            self.components.counters.add_failed(rejected.len() as u64);
            let message = format!("{} records rejected before submission", rejected.len());
            let outcome = self
                .components
                .reporter
                .report(&file, &message, &rejected)
                .await;
            if !outcome.delivered {
                self.ledger.poison(&identity).await;
            }
        }

        debug!(records = read, "Source file read");
        self.settle_sealed(&identity).await;
        true
    }

    async fn enqueue(
        &self,
        batch: Batch,
        tx: &mpsc::Sender<Batch>,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> bool {
        self.ledger.enqueue(&batch.source.identity()).await;
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => false,
            sent = tx.send(batch) => sent.is_ok(),
        }
    }

    async fn work(
        &self,
        worker_id: usize,
        rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        debug!(worker_id, "Worker started");
        loop {
            let batch = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!(worker_id, "Worker received shutdown signal");
                    break;
                }
                batch = async { rx.lock().await.recv().await } => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };
            self.process(worker_id, batch).await;
        }
        debug!(worker_id, "Worker stopped");
    }

    async fn process(&self, worker_id: usize, batch: Batch) {
        let identity = batch.source.identity();
        let delivered = match self.components.submitter.submit(&batch).await {
            Ok(result) if result.failures.is_empty() => true,
            Ok(result) => {
                let message = format!(
                    "{} of {} records failed in batch {}",
                    result.failed(),
                    result.total(),
                    batch.sequence
                );
                self.components
                    .reporter
                    .report(&batch.source, &message, &result.failures)
                    .await
                    .delivered
            }
            Err(e) if e.is_fatal() => {
                error!(worker_id, error = %e, file = %identity, "Fatal error, stopping pool");
                self.fail(e).await;
                false
            }
            Err(e) => {
                warn!(worker_id, error = %e, file = %identity, "Batch failed");
                false
            }
        };

        if let Some(state) = self.ledger.done(&identity, delivered).await {
            self.finish(state).await;
        }
    }

    async fn settle_sealed(&self, identity: &str) {
        if let Some(state) = self.ledger.seal(identity).await {
            self.finish(state).await;
        }
    }

    async fn finish(&self, state: FileState) {
        match state {
            FileState::Completed(file) => {
                match self
                    .components
                    .tracker
                    .mark_processed(&self.index, &file)
                    .await
                {
                    Ok(()) => {
                        self.files_completed.fetch_add(1, Ordering::Relaxed);
                        info!(file = %file, "Source file completed");
                    }
                    Err(e) => {
                        self.files_failed.fetch_add(1, Ordering::Relaxed);
                        error!(file = %file, error = %e, "Cannot track completed file");
                        self.fail(e).await;
                    }
                }
            }
            FileState::Failed(file) => {
                self.files_failed.fetch_add(1, Ordering::Relaxed);
                warn!(file = %file, "Source file not completed; it will be retried on resume");
            }
        }
    }

    async fn fail(&self, error: IngestError) {
        let mut fatal = self.fatal.lock().await;
        if fatal.is_none() {
            *fatal = Some(error);
        }
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::RECORD_TOO_LARGE;
    use crate::dlq::DlqSink;
    use crate::reader::INVALID_IDENTIFIER;
    use crate::submitter::SubmitterConfig;
    use async_trait::async_trait;
    use index_refresh_shared::DlqEnvelope;
    use index_refresh_repository::memory::{BulkRule, InMemoryIndexProvider};
    use index_refresh_repository::SearchIndexProvider;
    use index_refresh_shared::SourceFormat;
    use serde_json::json;
    use std::path::Path;

    struct Harness {
        provider: Arc<InMemoryIndexProvider>,
        tracker: Arc<ResumeTracker>,
        counters: Arc<IngestCounters>,
        _dir: tempfile::TempDir,
    }

    async fn harness(create_index: bool) -> Harness {
        let provider = Arc::new(InMemoryIndexProvider::new());
        if create_index {
            provider.create_index("products").await;
        }
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(
            ResumeTracker::load(dir.path().join("processed.json"))
                .await
                .unwrap(),
        );
        Harness {
            provider,
            tracker,
            counters: Arc::new(IngestCounters::new()),
            _dir: dir,
        }
    }

    /// Keeps every DLQ message body it receives.
    #[derive(Default)]
    struct CapturingSink {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DlqSink for CapturingSink {
        fn max_message_bytes(&self) -> usize {
            256 * 1024
        }

        async fn send(&self, body: String) -> Result<(), IngestError> {
            self.messages.lock().await.push(body);
            Ok(())
        }
    }

    fn pool(h: &Harness, batch_size: usize) -> WorkerPool {
        pool_with(
            h,
            PoolConfig {
                workers: 3,
                queue_capacity: 2,
                batch_size,
                ..Default::default()
            },
            ErrorReporter::disabled(),
        )
    }

    fn pool_with(h: &Harness, config: PoolConfig, reporter: ErrorReporter) -> WorkerPool {
        let submitter = BulkSubmitter::new(
            h.provider.clone(),
            "products",
            SubmitterConfig {
                max_retries: 1,
                initial_retry_delay_ms: 1,
                max_retry_delay_ms: 2,
            },
            h.counters.clone(),
        );
        WorkerPool::new(
            "products",
            config,
            PoolComponents {
                catalog: Arc::new(SourceCatalog::local_only()),
                submitter: Arc::new(submitter),
                reporter: Arc::new(reporter),
                tracker: h.tracker.clone(),
                counters: h.counters.clone(),
            },
        )
    }

    fn write(dir: &Path, name: &str, body: &str) -> SourceFile {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        let format = SourceFormat::from_path(name).unwrap();
        SourceFile::local(path, format, body.len() as u64)
    }

    #[tokio::test]
    async fn test_all_files_completed_and_tracked() {
        let h = harness(true).await;
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write(dir.path(), "a.csv", "id,name\n1,a\n2,b\n3,c\n"),
            write(dir.path(), "b.jsonl", "{\"id\":4}\n{\"id\":5}\n"),
        ];

        let outcome = pool(&h, 2).run(files.clone()).await;

        assert!(outcome.fatal.is_none());
        assert_eq!(outcome.files_completed, 2);
        assert_eq!(h.provider.document_count("products").await.unwrap(), 5);
        for file in &files {
            assert!(h.tracker.is_processed("products", file).await);
        }
        let snapshot = h.counters.snapshot();
        assert_eq!(snapshot.records_read, 5);
        assert_eq!(snapshot.succeeded, 5);
    }

    #[tokio::test]
    async fn test_malformed_file_is_skipped_not_tracked() {
        let h = harness(true).await;
        let dir = tempfile::tempdir().unwrap();
        let good = write(dir.path(), "a.csv", "id\n1\n");
        let bad = write(dir.path(), "b.csv", "id,name\n2,x\n3\n");

        let outcome = pool(&h, 10).run(vec![good.clone(), bad.clone()]).await;

        assert!(outcome.fatal.is_none());
        assert_eq!(outcome.files_completed, 1);
        assert_eq!(outcome.files_failed, 1);
        assert!(h.tracker.is_processed("products", &good).await);
        assert!(!h.tracker.is_processed("products", &bad).await);
    }

    #[tokio::test]
    async fn test_permanent_failures_still_complete_file() {
        let h = harness(true).await;
        h.provider
            .add_bulk_rule(BulkRule::permanent("id", json!(2), 400, "mapper_parsing_exception"))
            .await;
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "a.csv", "id\n1\n2\n3\n");

        let outcome = pool(&h, 2).run(vec![file.clone()]).await;

        assert_eq!(outcome.files_completed, 1);
        assert!(h.tracker.is_processed("products", &file).await);
        let snapshot = h.counters.snapshot();
        assert_eq!(snapshot.succeeded, 2);
        assert_eq!(snapshot.failed, 1);
    }

    #[tokio::test]
    async fn test_rejected_records_reach_dlq_and_file_completes() {
        let h = harness(true).await;
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}\n{}\n{}\n{}\n{}\n",
            r#"{"id": 1, "name": "kept"}"#,
            r#"{"id": true, "name": "boolean id"}"#,
            format!(r#"{{"id": 3, "payload": "{}"}}"#, "x".repeat(600)),
            r#"{"id": [5], "name": "array id"}"#,
            r#"{"id": 6, "name": "kept"}"#,
        );
        let file = write(dir.path(), "c.jsonl", &body);
        let sink = Arc::new(CapturingSink::default());

        let outcome = pool_with(
            &h,
            PoolConfig {
                workers: 2,
                queue_capacity: 2,
                batch_size: 10,
                max_request_bytes: 300,
                ..Default::default()
            },
            ErrorReporter::new(sink.clone()),
        )
        .run(vec![file.clone()])
        .await;

        assert!(outcome.fatal.is_none());
        assert_eq!(outcome.files_completed, 1);
        assert!(h.tracker.is_processed("products", &file).await);
        assert_eq!(h.provider.document_count("products").await.unwrap(), 2);

        let messages = sink.messages.lock().await;
        assert_eq!(messages.len(), 1);
        let envelope: DlqEnvelope = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(envelope.total_records, 3);
        let types: Vec<_> = envelope
            .records
            .iter()
            .map(|r| r.error_type.as_str())
            .collect();
        assert_eq!(
            types,
            vec![INVALID_IDENTIFIER, RECORD_TOO_LARGE, INVALID_IDENTIFIER]
        );
        assert!(envelope.records.iter().all(|r| r.status == 0));
        assert_eq!(envelope.records[1].document_id.as_deref(), Some("3"));

        let snapshot = h.counters.snapshot();
        assert_eq!(snapshot.records_read, 5);
        assert_eq!(snapshot.succeeded, 2);
        assert_eq!(snapshot.failed, 3);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_pool() {
        let h = harness(false).await;
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<_> = (0..5)
            .map(|i| write(dir.path(), &format!("{}.csv", i), "id\n1\n2\n"))
            .collect();

        let outcome = pool(&h, 1).run(files.clone()).await;

        assert!(matches!(
            outcome.fatal,
            Some(IngestError::FatalConfiguration(_))
        ));
        assert_eq!(outcome.files_completed, 0);
        assert_eq!(h.tracker.processed_count("products").await, 0);
    }
}
