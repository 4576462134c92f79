//! # Index Refresh
//!
//! Entry point and configuration for the index refresh tool: ingestion
//! into a standby index, cleanup, reindex and zero-downtime alias switch.

pub mod config;

pub use config::{Dependencies, Settings};

use thiserror::Error;

/// Errors that can occur during initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ingestion error.
    #[error("Ingestion error: {0}")]
    IngestError(#[from] index_refresh_ingest::IngestError),

    /// Admin operation error.
    #[error("Admin error: {0}")]
    AdminError(#[from] index_refresh_admin::AdminError),

    /// Search index error.
    #[error("Search error: {0}")]
    SearchError(#[from] index_refresh_repository::SearchIndexError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
