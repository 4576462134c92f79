//! Per-file completion bookkeeping.
//!
//! A file is complete once the producer has sealed it (no more batches
//! will come) and every enqueued batch has reached a terminal state. A
//! file with any undelivered failure report, or one that could not be read
//! to the end, settles as failed and is never tracked as processed.

use std::collections::HashMap;
use std::sync::Arc;

use index_refresh_shared::SourceFile;
use tokio::sync::Mutex;

/// How a file settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Completed(Arc<SourceFile>),
    Failed(Arc<SourceFile>),
}

#[derive(Debug)]
struct FileProgress {
    file: Arc<SourceFile>,
    pending: usize,
    sealed: bool,
    poisoned: bool,
}

#[derive(Debug, Default)]
pub struct CompletionLedger {
    files: Mutex<HashMap<String, FileProgress>>,
}

impl CompletionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, file: Arc<SourceFile>) {
        self.files.lock().await.insert(
            file.identity(),
            FileProgress {
                file,
                pending: 0,
                sealed: false,
                poisoned: false,
            },
        );
    }

    /// Count one more in-flight batch for `identity`.
    pub async fn enqueue(&self, identity: &str) {
        if let Some(progress) = self.files.lock().await.get_mut(identity) {
            progress.pending += 1;
        }
    }

    /// Mark `identity` as failed without settling it.
    pub async fn poison(&self, identity: &str) {
        if let Some(progress) = self.files.lock().await.get_mut(identity) {
            progress.poisoned = true;
        }
    }

    /// No more batches will be enqueued for `identity`.
    pub async fn seal(&self, identity: &str) -> Option<FileState> {
        let mut files = self.files.lock().await;
        files.get_mut(identity)?.sealed = true;
        Self::settle(&mut files, identity)
    }

    /// One batch of `identity` reached a terminal state.
    ///
    /// `delivered` is false when some of its failed records could not be
    /// reported.
    pub async fn done(&self, identity: &str, delivered: bool) -> Option<FileState> {
        let mut files = self.files.lock().await;
        let progress = files.get_mut(identity)?;
        progress.pending = progress.pending.saturating_sub(1);
        if !delivered {
            progress.poisoned = true;
        }
        Self::settle(&mut files, identity)
    }

    fn settle(files: &mut HashMap<String, FileProgress>, identity: &str) -> Option<FileState> {
        let ready = files
            .get(identity)
            .is_some_and(|p| p.sealed && p.pending == 0);
        if !ready {
            return None;
        }
        files.remove(identity).map(|p| {
            if p.poisoned {
                FileState::Failed(p.file)
            } else {
                FileState::Completed(p.file)
            }
        })
    }
}
