//! Guardrail report types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Health of a single index as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
    Unknown,
}

impl HealthStatus {
    /// Parse the `status` field of a health response. Anything unexpected is `Unknown`.
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "green" => Self::Green,
            "yellow" => Self::Yellow,
            "red" => Self::Red,
            _ => Self::Unknown,
        }
    }

    /// Green or yellow.
    pub fn is_serviceable(self) -> bool {
        matches!(self, Self::Green | Self::Yellow)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The operation a guardrail validation is gating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardedOperation {
    /// Bulk ingestion into the index.
    Ingest,
    /// Deleting every document from the index.
    Cleanup,
    /// Reading from the index as the source of a reindex or alias switch.
    SourceRead,
    /// Writing into the index as the destination of a reindex.
    ReindexTarget,
    /// Repointing an alias from `source` to the validated index.
    AliasSwitch { source: String },
    /// An operation whose purpose is to create the index.
    Create,
}

impl GuardedOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Cleanup => "cleanup",
            Self::SourceRead => "source-read",
            Self::ReindexTarget => "reindex-target",
            Self::AliasSwitch { .. } => "alias-switch",
            Self::Create => "create",
        }
    }

    /// Operations that mutate the index in place and must never touch a live index.
    pub fn mutates_in_place(&self) -> bool {
        matches!(self, Self::Ingest | Self::Cleanup | Self::ReindexTarget)
    }

    pub fn creates_index(&self) -> bool {
        matches!(self, Self::Create)
    }
}

impl fmt::Display for GuardedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One evaluated guardrail check, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// State of one index at validation time. Never cached across operations.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailReport {
    pub index: String,
    pub operation: GuardedOperation,
    pub exists: bool,
    /// True when any alias points at the index.
    pub is_live: bool,
    pub aliases: Vec<String>,
    pub document_count: u64,
    pub health: HealthStatus,
    pub checks: Vec<GuardrailCheck>,
}

impl GuardrailReport {
    pub fn new(index: impl Into<String>, operation: GuardedOperation) -> Self {
        Self {
            index: index.into(),
            operation,
            exists: false,
            is_live: false,
            aliases: Vec::new(),
            document_count: 0,
            health: HealthStatus::Unknown,
            checks: Vec::new(),
        }
    }
}
