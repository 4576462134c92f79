//! Error types for guardrails and admin operations.

use index_refresh_repository::SearchIndexError;
use index_refresh_shared::HealthStatus;
use thiserror::Error;

/// A refused guardrail check. One variant per rule, in evaluation order.
#[derive(Error, Debug, Clone)]
pub enum GuardrailError {
    /// The index does not exist.
    #[error("Index not found: {index}")]
    IndexNotFound { index: String },

    /// The index is served by at least one alias and must not be mutated in place.
    #[error("Index {index} is live behind alias(es) {aliases:?}")]
    LiveTraffic { index: String, aliases: Vec<String> },

    /// The index health is red or unknown.
    #[error("Index {index} is unhealthy: {health}")]
    UnhealthyIndex { index: String, health: HealthStatus },

    /// The alias-switch target holds no documents.
    #[error("Target index {index} is empty")]
    EmptyTarget { index: String },

    /// Source and target document counts differ by more than the threshold.
    #[error(
        "Document count divergence {divergence_percent:.2}% exceeds {threshold_percent}% \
         (source {source_index}={source_count}, target {target_index}={target_count})"
    )]
    CountDivergence {
        source_index: String,
        target_index: String,
        source_count: u64,
        target_count: u64,
        divergence_percent: f64,
        threshold_percent: f64,
    },

    /// A check could not be evaluated because the index API failed.
    #[error("Guardrail check {check} failed on {index}: {source}")]
    CheckFailed {
        index: String,
        check: &'static str,
        #[source]
        source: SearchIndexError,
    },
}

impl GuardrailError {
    /// Name of the rule that refused the operation.
    pub fn rule(&self) -> &'static str {
        match self {
            Self::IndexNotFound { .. } => "index_exists",
            Self::LiveTraffic { .. } => "not_live",
            Self::UnhealthyIndex { .. } => "healthy",
            Self::EmptyTarget { .. } => "target_not_empty",
            Self::CountDivergence { .. } => "count_divergence",
            Self::CheckFailed { check, .. } => *check,
        }
    }
}

/// Errors raised by the gated admin operations.
#[derive(Error, Debug)]
pub enum AdminError {
    /// A guardrail refused the operation.
    #[error("Guardrail refused operation: {0}")]
    Guardrail(#[from] GuardrailError),

    /// The index API failed while the operation was running.
    #[error("Search index error: {0}")]
    SearchIndex(#[from] SearchIndexError),

    /// The alias does not exist.
    #[error("Alias not found: {0}")]
    AliasNotFound(String),

    /// The alias does not resolve to the expected index.
    #[error("Alias {alias} resolves to {actual:?}, expected {expected}")]
    AliasMismatch {
        alias: String,
        expected: String,
        actual: Vec<String>,
    },

    /// The source of a copy holds no documents.
    #[error("Source index {0} is empty")]
    EmptySource(String),

    /// The operation ran but did not reach the expected state.
    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl AdminError {
    /// Create an operation failed error.
    pub fn operation_failed(msg: impl Into<String>) -> Self {
        Self::OperationFailed(msg.into())
    }
}
