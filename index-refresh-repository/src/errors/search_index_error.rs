//! Search index error types.
//!
//! This module defines the error types that can occur during search index operations.

use thiserror::Error;

/// Errors that can occur during search index operations.
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Validation error (e.g., malformed URL or empty index name).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failed to reach the search engine, or the request timed out.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The search engine answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The index does not exist.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Failed to parse a response from the search engine.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Unknown error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SearchIndexError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create an HTTP error from a status code and response body.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::HttpError {
            status,
            body: body.into(),
        }
    }

    /// Create an index not found error.
    pub fn index_not_found(index: impl Into<String>) -> Self {
        Self::IndexNotFound(index.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Connection failures, throttling (429) and server errors (5xx) are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) => true,
            Self::HttpError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the error means the destination cannot be used at all.
    ///
    /// Authentication failures and a missing index stop a run rather than
    /// failing individual documents.
    pub fn is_fatal_configuration(&self) -> bool {
        match self {
            Self::IndexNotFound(_) => true,
            Self::HttpError { status, .. } => matches!(status, 401 | 403 | 404),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SearchIndexError::connection("reset by peer").is_transient());
        assert!(SearchIndexError::http(429, "too many requests").is_transient());
        assert!(SearchIndexError::http(503, "unavailable").is_transient());
        assert!(!SearchIndexError::http(400, "bad request").is_transient());
        assert!(!SearchIndexError::parse("bad json").is_transient());
    }

    #[test]
    fn test_fatal_configuration_classification() {
        assert!(SearchIndexError::http(401, "unauthorized").is_fatal_configuration());
        assert!(SearchIndexError::http(403, "forbidden").is_fatal_configuration());
        assert!(SearchIndexError::index_not_found("products").is_fatal_configuration());
        assert!(!SearchIndexError::http(500, "boom").is_fatal_configuration());
        assert!(!SearchIndexError::connection("timeout").is_fatal_configuration());
    }
}
