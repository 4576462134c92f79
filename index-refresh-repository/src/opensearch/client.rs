//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    cert::CertificateValidation,
    cluster::ClusterHealthParts,
    http::{
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{IndicesExistsParts, IndicesForcemergeParts, IndicesGetAliasParts, IndicesRefreshParts},
    params::Conflicts,
    BulkParts, CountParts, DeleteByQueryParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::OpenSearchConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::types::{AliasAction, BulkResponse, ReindexSummary};
use index_refresh_shared::HealthStatus;

/// OpenSearch client implementation.
///
/// # Example
///
/// ```ignore
/// use index_refresh_repository::{OpenSearchClient, OpenSearchConfig, SearchIndexProvider};
/// let config = OpenSearchConfig::new("http://localhost:9200");
/// let client = OpenSearchClient::new(&config)?;
///
/// let count = client.document_count("products_v2").await?;
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client from connection settings.
    ///
    /// # Arguments
    ///
    /// * `config` - URL, optional basic auth, TLS verification and request timeout
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchIndexError)` - If the URL is invalid or transport setup fails
    pub fn new(config: &OpenSearchConfig) -> Result<Self, SearchIndexError> {
        let parsed_url = Url::parse(&config.url)
            .map_err(|e| SearchIndexError::validation(format!("Invalid OpenSearch URL: {}", e)))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .timeout(config.timeout);

        if let Some((username, password)) = config.credentials() {
            builder = builder.auth(Credentials::Basic(username.to_string(), password.to_string()));
        }
        if !config.verify_ssl {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        let transport = builder
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        info!(
            url = %config.url,
            basic_auth = config.credentials().is_some(),
            verify_ssl = config.verify_ssl,
            "Created OpenSearch client"
        );

        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }

    /// Pass a successful response through, or turn it into an `HttpError`.
    async fn ensure_success(response: Response, operation: &str) -> Result<Response, SearchIndexError> {
        let status = response.status_code();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(operation, status = %status, body = %body, "OpenSearch request failed");
        Err(SearchIndexError::http(status.as_u16(), body))
    }

    async fn read_json(response: Response) -> Result<Value, SearchIndexError> {
        response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))
    }
}

/// Alias names found under `{index: {aliases: {...}}}`.
///
/// When `name` is itself an alias the response is keyed by the concrete
/// indices behind it, so aliases are collected from every entry.
fn parse_index_aliases(body: &Value, name: &str) -> Vec<String> {
    let mut aliases: Vec<String> = body
        .as_object()
        .map(|obj| {
            obj.values()
                .filter_map(|i| i.get("aliases").and_then(|a| a.as_object()))
                .flat_map(|a| a.keys().cloned())
                .collect()
        })
        .unwrap_or_default();
    if aliases.is_empty() && body.as_object().is_some_and(|obj| obj.keys().any(|k| k != name)) {
        aliases.push(name.to_string());
    }
    aliases.sort();
    aliases.dedup();
    aliases
}

/// Index names that carry the alias in a get-alias-by-name response.
fn parse_alias_indices(body: &Value, alias: &str) -> Vec<String> {
    let mut indices: Vec<String> = body
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(_, v)| v.get("aliases").and_then(|a| a.get(alias)).is_some())
                .map(|(k, _)| k.clone())
                .collect()
        })
        .unwrap_or_default();
    indices.sort();
    indices
}

fn parse_count(body: &Value) -> Result<u64, SearchIndexError> {
    body.get("count")
        .and_then(|c| c.as_u64())
        .ok_or_else(|| SearchIndexError::parse("Count response has no count field"))
}

#[async_trait]
impl SearchIndexProvider for OpenSearchClient {
    #[instrument(skip(self))]
    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Self::ensure_success(response, "index_exists").await.map(|_| true),
        }
    }

    #[instrument(skip(self))]
    async fn document_count(&self, index: &str) -> Result<u64, SearchIndexError> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::index_not_found(index));
        }
        let response = Self::ensure_success(response, "count").await?;
        parse_count(&Self::read_json(response).await?)
    }

    #[instrument(skip(self))]
    async fn index_aliases(&self, index: &str) -> Result<Vec<String>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_alias(IndicesGetAliasParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::index_not_found(index));
        }
        let response = Self::ensure_success(response, "get_alias").await?;
        Ok(parse_index_aliases(&Self::read_json(response).await?, index))
    }

    #[instrument(skip(self))]
    async fn alias_indices(&self, alias: &str) -> Result<Vec<String>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_alias(IndicesGetAliasParts::Name(&[alias]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        // 404 means no index carries the alias
        if response.status_code().as_u16() == 404 {
            return Ok(Vec::new());
        }
        let response = Self::ensure_success(response, "get_alias").await?;
        Ok(parse_alias_indices(&Self::read_json(response).await?, alias))
    }

    #[instrument(skip(self))]
    async fn index_health(&self, index: &str) -> Result<HealthStatus, SearchIndexError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::index_not_found(index));
        }
        let response = Self::ensure_success(response, "cluster_health").await?;
        let body = Self::read_json(response).await?;

        Ok(body
            .get("status")
            .and_then(|s| s.as_str())
            .map(HealthStatus::parse)
            .unwrap_or(HealthStatus::Unknown))
    }

    #[instrument(skip(self, actions), fields(actions = actions.len()))]
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchIndexError> {
        let body = json!({
            "actions": actions.iter().map(AliasAction::to_json).collect::<Vec<_>>()
        });

        let response = self
            .client
            .indices()
            .update_aliases()
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let response = Self::ensure_success(response, "update_aliases").await?;
        let body = Self::read_json(response).await?;

        if body.get("acknowledged").and_then(|a| a.as_bool()) != Some(true) {
            return Err(SearchIndexError::unknown(format!(
                "Alias update was not acknowledged: {}",
                body
            )));
        }

        info!("Alias update acknowledged");
        Ok(())
    }

    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn bulk(&self, index: &str, lines: Vec<String>) -> Result<BulkResponse, SearchIndexError> {
        let response = self
            .client
            .bulk(BulkParts::Index(index))
            .body(lines)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let response = Self::ensure_success(response, "bulk").await?;
        let body = Self::read_json(response).await?;
        let parsed = BulkResponse::parse(&body)?;

        debug!(
            items = parsed.items.len(),
            errors = parsed.errors,
            took = parsed.took,
            "Bulk request completed"
        );
        Ok(parsed)
    }

    #[instrument(skip(self))]
    async fn delete_all_documents(&self, index: &str) -> Result<u64, SearchIndexError> {
        let response = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&[index]))
            .conflicts(Conflicts::Proceed)
            .refresh(true)
            .wait_for_completion(true)
            .body(json!({"query": {"match_all": {}}}))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::index_not_found(index));
        }
        let response = Self::ensure_success(response, "delete_by_query").await?;
        let body = Self::read_json(response).await?;

        let failures = body
            .get("failures")
            .and_then(|f| f.as_array())
            .map(|f| f.len())
            .unwrap_or(0);
        if failures > 0 {
            warn!(index, failures, "Delete by query reported failures");
        }

        Ok(body.get("deleted").and_then(|d| d.as_u64()).unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn force_merge(&self, index: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .forcemerge(IndicesForcemergeParts::Index(&[index]))
            .only_expunge_deletes(true)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Self::ensure_success(response, "forcemerge").await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reindex(&self, source: &str, target: &str) -> Result<ReindexSummary, SearchIndexError> {
        let response = self
            .client
            .reindex()
            .wait_for_completion(true)
            .refresh(true)
            .body(json!({
                "source": {"index": source},
                "dest": {"index": target}
            }))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let response = Self::ensure_success(response, "reindex").await?;
        Ok(ReindexSummary::parse(&Self::read_json(response).await?))
    }

    #[instrument(skip(self))]
    async fn refresh(&self, index: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Self::ensure_success(response, "refresh").await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Self::ensure_success(response, "ping").await?;
        Ok(())
    }
}
