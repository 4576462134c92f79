//! # Index Refresh Shared
//!
//! Shared types used across the index refresh crates: source files and the
//! records read from them, the batches submitted to the bulk API, the
//! per-batch outcome, guardrail reports and dead-letter envelopes.

pub mod batch;
pub mod dlq;
pub mod guardrail;
pub mod record;
pub mod source;

pub use batch::{Batch, BulkResult, FailedRecord};
pub use dlq::{DlqEnvelope, DlqRecord, DLQ_SOURCE_TAG};
pub use guardrail::{GuardedOperation, GuardrailCheck, GuardrailReport, HealthStatus};
pub use record::{Record, WriteAction};
pub use source::{IngestMode, SourceFile, SourceFormat, SourceLocation, SourceOrigin};
