//! Connection configuration for the OpenSearch client.

use std::time::Duration;

/// Connection settings for an OpenSearch cluster.
#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    /// Base URL of the cluster (e.g., "http://localhost:9200").
    pub url: String,
    /// Basic auth user name. Auth is only sent when both user name and password are set.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Verify TLS certificates. Disabled for self-signed development clusters.
    pub verify_ssl: bool,
    /// Transport request timeout.
    pub timeout: Duration,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            verify_ssl: false,
            timeout: Duration::from_secs(60),
        }
    }
}

impl OpenSearchConfig {
    /// Create a config for the given URL with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set basic auth credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// The credential pair, if both halves are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}
