//! # Index Refresh Ingest
//!
//! Loads tabular and structured source files into a search index.
//!
//! ## Architecture
//!
//! 1. **Source**: enumerates files from object storage and local paths
//! 2. **Reader**: turns one file into a lazy sequence of records
//! 3. **Assembler**: groups records into size- and count-bounded batches
//! 4. **Pool**: one producer and N workers, each running the **Submitter**
//! 5. **Tracker** and **DLQ**: record completed files and report failed records
//! 6. **Runner**: guardrails, fresh-load cleanup, the pool and count verification

pub mod assembler;
pub mod codec;
pub mod counters;
pub mod dlq;
pub mod errors;
pub mod pool;
pub mod reader;
pub mod runner;
pub mod source;
pub mod submitter;
pub mod summary;
pub mod tracker;

pub use counters::{CounterSnapshot, IngestCounters};
pub use dlq::{DlqSink, ErrorReporter, ReportOutcome, SqsDlqSink};
pub use errors::IngestError;
pub use pool::{PoolConfig, PoolOutcome, WorkerPool};
pub use runner::{IngestConfig, IngestRunner};
pub use source::{ObjectStore, S3ObjectStore, SourceCatalog, SourceSpec};
pub use submitter::{BulkSubmitter, SubmitterConfig};
pub use summary::{RunStatus, RunSummary};
pub use tracker::ResumeTracker;
