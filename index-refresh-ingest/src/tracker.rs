//! Resume tracker.
//!
//! Persists, per destination index, the identities of source files whose
//! records all reached a terminal state. Stored as a JSON object
//! `{index: [identity, ...]}` and rewritten atomically on every change.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use index_refresh_shared::SourceFile;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::errors::IngestError;

type TrackingState = BTreeMap<String, BTreeSet<String>>;

/// File-backed record of processed source files.
///
/// Safe to share between workers: updates are serialized and each one is
/// flushed to disk before the call returns.
pub struct ResumeTracker {
    path: PathBuf,
    state: Mutex<TrackingState>,
}

impl ResumeTracker {
    /// Load the tracker from `path`. A missing file starts empty.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, IngestError> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => TrackingState::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                IngestError::tracking(format!("invalid tracking file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TrackingState::new(),
            Err(e) => {
                return Err(IngestError::tracking(format!(
                    "cannot read tracking file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        debug!(path = %path.display(), indices = state.len(), "Loaded tracking state");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_processed(&self, index: &str, file: &SourceFile) -> bool {
        self.state
            .lock()
            .await
            .get(index)
            .is_some_and(|files| files.contains(&file.identity()))
    }

    /// Record `file` as processed for `index` and persist.
    #[instrument(skip(self, file), fields(file = %file))]
    pub async fn mark_processed(&self, index: &str, file: &SourceFile) -> Result<(), IngestError> {
        let mut state = self.state.lock().await;
        let inserted = state
            .entry(index.to_string())
            .or_default()
            .insert(file.identity());
        if inserted {
            self.persist(&state).await?;
        }
        Ok(())
    }

    /// Forget every processed file of `index` and persist.
    #[instrument(skip(self))]
    pub async fn reset(&self, index: &str) -> Result<(), IngestError> {
        let mut state = self.state.lock().await;
        let previous = state.insert(index.to_string(), BTreeSet::new());
        self.persist(&state).await?;
        info!(
            cleared = previous.map(|p| p.len()).unwrap_or(0),
            "Reset tracking state"
        );
        Ok(())
    }

    pub async fn processed_count(&self, index: &str) -> usize {
        self.state
            .lock()
            .await
            .get(index)
            .map(|f| f.len())
            .unwrap_or(0)
    }

    async fn persist(&self, state: &TrackingState) -> Result<(), IngestError> {
        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| IngestError::tracking(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, body).await.map_err(|e| {
            IngestError::tracking(format!("cannot write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            IngestError::tracking(format!("cannot replace {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}
