//! Environment settings.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use index_refresh_repository::OpenSearchConfig;

use crate::IndexingError;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default transport timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default alias-switch document count divergence, in percent.
const DEFAULT_COUNT_THRESHOLD: f64 = 10.0;

/// Default resume tracker file.
const DEFAULT_TRACKING_FILE: &str = "processed_files.json";

/// Settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub opensearch: OpenSearchConfig,
    /// Region for the S3 and SQS clients. The AWS default chain applies when unset.
    pub aws_region: Option<String>,
    pub dlq_enabled: bool,
    pub dlq_arn: Option<String>,
    pub count_threshold_percent: f64,
    pub tracking_file: PathBuf,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_USERNAME` / `OPENSEARCH_PASSWORD`: basic auth, sent when both are set
    /// - `VERIFY_SSL`: verify TLS certificates (default: false)
    /// - `OPENSEARCH_TIMEOUT_SECS`: transport request timeout (default: 60)
    /// - `AWS_REGION`: region for S3 and SQS
    /// - `DLQ`: `enabled` or `disabled` (default: disabled)
    /// - `SQS_DLQ_ARN`: ARN of the dead-letter queue. The older hyphenated
    ///   `SQS-DLQ-ARN` is still read when the underscore form is unset, since
    ///   most shells cannot export a name containing `-`.
    /// - `DOCUMENT_COUNT_THRESHOLD`: alias-switch divergence threshold in percent (default: 10)
    /// - `TRACKING_FILE`: resume tracker path (default: processed_files.json)
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`, which returns the value of a variable if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IndexingError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut opensearch =
            OpenSearchConfig::new(get("OPENSEARCH_URL").unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()));
        opensearch.username = get("OPENSEARCH_USERNAME");
        opensearch.password = get("OPENSEARCH_PASSWORD");
        opensearch.verify_ssl = parse_flag("VERIFY_SSL", get("VERIFY_SSL"), false)?;
        opensearch.timeout = Duration::from_secs(parse_value(
            "OPENSEARCH_TIMEOUT_SECS",
            get("OPENSEARCH_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
        )?);

        let count_threshold_percent = parse_value(
            "DOCUMENT_COUNT_THRESHOLD",
            get("DOCUMENT_COUNT_THRESHOLD"),
            DEFAULT_COUNT_THRESHOLD,
        )?;
        if !count_threshold_percent.is_finite() || count_threshold_percent < 0.0 {
            return Err(IndexingError::config(
                "DOCUMENT_COUNT_THRESHOLD must be a non-negative number",
            ));
        }

        Ok(Self {
            opensearch,
            aws_region: get("AWS_REGION"),
            dlq_enabled: parse_flag("DLQ", get("DLQ"), false)?,
            dlq_arn: get("SQS_DLQ_ARN").or_else(|| get("SQS-DLQ-ARN")),
            count_threshold_percent,
            tracking_file: PathBuf::from(
                get("TRACKING_FILE").unwrap_or_else(|| DEFAULT_TRACKING_FILE.to_string()),
            ),
        })
    }
}

fn parse_flag(key: &str, value: Option<String>, default: bool) -> Result<bool, IndexingError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "enabled" | "true" | "1" | "yes" => Ok(true),
        "disabled" | "false" | "0" | "no" => Ok(false),
        _ => Err(IndexingError::config(format!(
            "{} must be enabled or disabled, got '{}'",
            key, value
        ))),
    }
}

fn parse_value<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, IndexingError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| IndexingError::config(format!("{} has an invalid value '{}'", key, v))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, IndexingError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.opensearch.url, "http://localhost:9200");
        assert!(s.opensearch.credentials().is_none());
        assert!(!s.opensearch.verify_ssl);
        assert_eq!(s.opensearch.timeout, Duration::from_secs(60));
        assert!(!s.dlq_enabled);
        assert_eq!(s.count_threshold_percent, 10.0);
        assert_eq!(s.tracking_file, PathBuf::from("processed_files.json"));
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("OPENSEARCH_URL", "https://search:9200"),
            ("OPENSEARCH_USERNAME", "admin"),
            ("OPENSEARCH_PASSWORD", "secret"),
            ("VERIFY_SSL", "true"),
            ("DLQ", "Enabled"),
            ("SQS_DLQ_ARN", "arn:aws:sqs:us-east-1:123456789012:dlq"),
            ("DOCUMENT_COUNT_THRESHOLD", "2.5"),
            ("TRACKING_FILE", "/var/lib/refresh/state.json"),
        ])
        .unwrap();
        assert_eq!(s.opensearch.credentials(), Some(("admin", "secret")));
        assert!(s.opensearch.verify_ssl);
        assert!(s.dlq_enabled);
        assert_eq!(s.count_threshold_percent, 2.5);
        assert_eq!(s.tracking_file, PathBuf::from("/var/lib/refresh/state.json"));
    }

    #[test]
    fn test_hyphenated_dlq_arn() {
        let s = settings(&[("SQS-DLQ-ARN", "arn:aws:sqs:us-east-1:123456789012:legacy")]).unwrap();
        assert_eq!(
            s.dlq_arn.as_deref(),
            Some("arn:aws:sqs:us-east-1:123456789012:legacy")
        );

        let s = settings(&[
            ("SQS-DLQ-ARN", "arn:aws:sqs:us-east-1:123456789012:legacy"),
            ("SQS_DLQ_ARN", "arn:aws:sqs:us-east-1:123456789012:dlq"),
        ])
        .unwrap();
        assert_eq!(s.dlq_arn.as_deref(), Some("arn:aws:sqs:us-east-1:123456789012:dlq"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(settings(&[("DLQ", "sometimes")]).is_err());
        assert!(settings(&[("OPENSEARCH_TIMEOUT_SECS", "soon")]).is_err());
        assert!(settings(&[("DOCUMENT_COUNT_THRESHOLD", "-1")]).is_err());
    }
}
