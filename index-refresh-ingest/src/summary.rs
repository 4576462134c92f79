//! End-of-run summary.

use index_refresh_shared::IngestMode;
use serde::Serialize;
use tracing::{info, warn};

use crate::counters::CounterSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Enumeration found nothing; no guardrail ran and nothing was touched.
    NoFiles,
    Completed,
    /// Stopped by a fatal error or a failed count verification.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub index: String,
    pub mode: IngestMode,
    pub status: RunStatus,
    pub total_files: usize,
    pub files_completed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub records_read: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub created: u64,
    pub baseline_count: u64,
    pub final_count: Option<u64>,
    pub elapsed_secs: f64,
}

impl RunSummary {
    pub fn new(index: impl Into<String>, mode: IngestMode) -> Self {
        Self {
            index: index.into(),
            mode,
            status: RunStatus::Completed,
            total_files: 0,
            files_completed: 0,
            files_skipped: 0,
            files_failed: 0,
            records_read: 0,
            succeeded: 0,
            failed: 0,
            created: 0,
            baseline_count: 0,
            final_count: None,
            elapsed_secs: 0.0,
        }
    }

    pub fn apply_counters(&mut self, counters: CounterSnapshot) {
        self.records_read = counters.records_read;
        self.succeeded = counters.succeeded;
        self.failed = counters.failed;
        self.created = counters.created;
    }

    /// Document count the index should hold after the run.
    pub fn expected_count(&self) -> u64 {
        self.baseline_count + self.created
    }

    /// Every file completed and the run was not stopped.
    pub fn is_clean(&self) -> bool {
        self.status != RunStatus::Failed && self.files_failed == 0
    }

    pub fn log(&self) {
        let mode = match self.mode {
            IngestMode::Resume => "resume",
            IngestMode::FreshLoad => "fresh_load",
        };
        if self.is_clean() {
            info!(
                index = %self.index,
                mode,
                status = ?self.status,
                total_files = self.total_files,
                files_completed = self.files_completed,
                files_skipped = self.files_skipped,
                records_read = self.records_read,
                succeeded = self.succeeded,
                failed = self.failed,
                created = self.created,
                baseline_count = self.baseline_count,
                final_count = ?self.final_count,
                elapsed_secs = self.elapsed_secs,
                "Ingestion summary"
            );
        } else {
            warn!(
                index = %self.index,
                mode,
                status = ?self.status,
                total_files = self.total_files,
                files_completed = self.files_completed,
                files_skipped = self.files_skipped,
                files_failed = self.files_failed,
                records_read = self.records_read,
                succeeded = self.succeeded,
                failed = self.failed,
                created = self.created,
                baseline_count = self.baseline_count,
                final_count = ?self.final_count,
                elapsed_secs = self.elapsed_secs,
                "Ingestion summary"
            );
        }
    }
}
