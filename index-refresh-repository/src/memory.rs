//! In-memory search index provider for tests.
//!
//! Keeps indices, documents and aliases in process memory and records every
//! call, so tests can assert which operations reached the index.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::types::{AliasAction, BulkItemError, BulkItemOutcome, BulkResponse, ReindexSummary};
use index_refresh_shared::HealthStatus;

/// Rejects bulk items whose document has `field == value`.
///
/// With `remaining` set, the rule only applies that many times and the item
/// succeeds afterwards, which models a transient rejection.
#[derive(Debug, Clone)]
pub struct BulkRule {
    pub field: String,
    pub value: Value,
    pub status: u16,
    pub error_type: String,
    pub reason: String,
    pub remaining: Option<usize>,
}

impl BulkRule {
    pub fn permanent(field: &str, value: Value, status: u16, error_type: &str) -> Self {
        Self {
            field: field.to_string(),
            value,
            status,
            error_type: error_type.to_string(),
            reason: format!("{} rejected by rule", error_type),
            remaining: None,
        }
    }

    pub fn transient(field: &str, value: Value, status: u16, error_type: &str, times: usize) -> Self {
        Self {
            remaining: Some(times),
            ..Self::permanent(field, value, status, error_type)
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryIndex {
    docs: BTreeMap<String, Value>,
    health: HealthStatus,
}

#[derive(Debug, Default)]
struct State {
    indices: BTreeMap<String, MemoryIndex>,
    aliases: BTreeMap<String, BTreeSet<String>>,
    rules: Vec<BulkRule>,
    next_auto_id: u64,
    failing_bulk_requests: usize,
    fail_alias_update: bool,
}

/// In-memory `SearchIndexProvider`.
#[derive(Debug, Default)]
pub struct InMemoryIndexProvider {
    state: Mutex<State>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryIndexProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_index(&self, index: &str) {
        self.state.lock().await.indices.insert(
            index.to_string(),
            MemoryIndex {
                docs: BTreeMap::new(),
                health: HealthStatus::Green,
            },
        );
    }

    /// Create an index holding `count` placeholder documents.
    pub async fn create_index_with_documents(&self, index: &str, count: u64) {
        self.create_index(index).await;
        let mut state = self.state.lock().await;
        if let Some(idx) = state.indices.get_mut(index) {
            for i in 0..count {
                idx.docs
                    .insert(format!("seed-{}", i), serde_json::json!({ "seed": i }));
            }
        }
    }

    pub async fn set_health(&self, index: &str, health: HealthStatus) {
        if let Some(idx) = self.state.lock().await.indices.get_mut(index) {
            idx.health = health;
        }
    }

    pub async fn add_alias(&self, alias: &str, index: &str) {
        self.state
            .lock()
            .await
            .aliases
            .entry(alias.to_string())
            .or_default()
            .insert(index.to_string());
    }

    pub async fn add_bulk_rule(&self, rule: BulkRule) {
        self.state.lock().await.rules.push(rule);
    }

    /// Answer the next `n` bulk requests with a 503.
    pub async fn fail_bulk_requests(&self, n: usize) {
        self.state.lock().await.failing_bulk_requests = n;
    }

    /// Make the next alias update fail without applying any action.
    pub async fn fail_next_alias_update(&self) {
        self.state.lock().await.fail_alias_update = true;
    }

    pub async fn documents(&self, index: &str) -> Vec<Value> {
        self.state
            .lock()
            .await
            .indices
            .get(index)
            .map(|i| i.docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of the calls received so far, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    /// Whether any call that changes index contents or aliases was received.
    pub async fn mutated(&self) -> bool {
        const MUTATIONS: [&str; 5] = [
            "update_aliases",
            "bulk",
            "delete_all_documents",
            "force_merge",
            "reindex",
        ];
        self.calls
            .lock()
            .await
            .iter()
            .any(|c| MUTATIONS.contains(&c.as_str()))
    }

    async fn record(&self, call: &str) {
        self.calls.lock().await.push(call.to_string());
    }

    fn missing(index: &str) -> SearchIndexError {
        SearchIndexError::index_not_found(index)
    }
}

fn apply_rules(rules: &mut [BulkRule], doc: &Value) -> Option<(u16, BulkItemError)> {
    for rule in rules.iter_mut() {
        if doc.get(&rule.field) != Some(&rule.value) {
            continue;
        }
        match rule.remaining {
            Some(0) => continue,
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        return Some((
            rule.status,
            BulkItemError {
                error_type: rule.error_type.clone(),
                reason: rule.reason.clone(),
            },
        ));
    }
    None
}

#[async_trait]
impl SearchIndexProvider for InMemoryIndexProvider {
    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError> {
        self.record("index_exists").await;
        let state = self.state.lock().await;
        Ok(state.indices.contains_key(index) || state.aliases.contains_key(index))
    }

    async fn document_count(&self, index: &str) -> Result<u64, SearchIndexError> {
        self.record("document_count").await;
        let state = self.state.lock().await;
        state
            .indices
            .get(index)
            .map(|i| i.docs.len() as u64)
            .ok_or_else(|| Self::missing(index))
    }

    async fn index_aliases(&self, index: &str) -> Result<Vec<String>, SearchIndexError> {
        self.record("index_aliases").await;
        let state = self.state.lock().await;
        // an alias name resolves to the indices behind it
        let targets: BTreeSet<String> = match state.aliases.get(index) {
            Some(indices) => indices.clone(),
            None if state.indices.contains_key(index) => BTreeSet::from([index.to_string()]),
            None => return Err(Self::missing(index)),
        };
        Ok(state
            .aliases
            .iter()
            .filter(|(_, indices)| !indices.is_disjoint(&targets))
            .map(|(alias, _)| alias.clone())
            .collect())
    }

    async fn alias_indices(&self, alias: &str) -> Result<Vec<String>, SearchIndexError> {
        self.record("alias_indices").await;
        Ok(self
            .state
            .lock()
            .await
            .aliases
            .get(alias)
            .map(|i| i.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn index_health(&self, index: &str) -> Result<HealthStatus, SearchIndexError> {
        self.record("index_health").await;
        let state = self.state.lock().await;
        state
            .indices
            .get(index)
            .map(|i| i.health)
            .ok_or_else(|| Self::missing(index))
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchIndexError> {
        self.record("update_aliases").await;
        let mut state = self.state.lock().await;
        if state.fail_alias_update {
            state.fail_alias_update = false;
            return Err(SearchIndexError::http(500, "simulated alias update failure"));
        }

        // Validate everything before applying anything.
        for action in actions {
            let (AliasAction::Add { index, .. } | AliasAction::Remove { index, .. }) = action;
            if !state.indices.contains_key(index) {
                return Err(Self::missing(index));
            }
        }
        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    state
                        .aliases
                        .entry(alias.clone())
                        .or_default()
                        .insert(index.clone());
                }
                AliasAction::Remove { index, alias } => {
                    if let Some(indices) = state.aliases.get_mut(alias) {
                        indices.remove(index);
                        if indices.is_empty() {
                            state.aliases.remove(alias);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn bulk(&self, index: &str, lines: Vec<String>) -> Result<BulkResponse, SearchIndexError> {
        self.record("bulk").await;
        let mut state = self.state.lock().await;
        if state.failing_bulk_requests > 0 {
            state.failing_bulk_requests -= 1;
            return Err(SearchIndexError::http(503, "simulated unavailable"));
        }
        if !state.indices.contains_key(index) {
            return Err(Self::missing(index));
        }

        let mut items = Vec::with_capacity(lines.len() / 2);
        for pair in lines.chunks(2) {
            let action: Value = serde_json::from_str(&pair[0])
                .map_err(|e| SearchIndexError::parse(e.to_string()))?;
            let body: Value = match pair.get(1) {
                Some(line) => serde_json::from_str(line)
                    .map_err(|e| SearchIndexError::parse(e.to_string()))?,
                None => return Err(SearchIndexError::parse("Action line without document")),
            };

            // `index` replaces by id, `create` gets a generated id
            let id = action
                .get("index")
                .and_then(|a| a.get("_id"))
                .and_then(|i| i.as_str())
                .map(str::to_string);
            let doc = body;

            if let Some((status, error)) = apply_rules(&mut state.rules, &doc) {
                items.push(BulkItemOutcome {
                    status,
                    result: None,
                    error: Some(error),
                });
                continue;
            }

            let id = match id {
                Some(id) => id,
                None => {
                    state.next_auto_id += 1;
                    format!("auto-{}", state.next_auto_id)
                }
            };
            let docs = match state.indices.get_mut(index) {
                Some(idx) => &mut idx.docs,
                None => return Err(Self::missing(index)),
            };
            let created = docs.insert(id, doc).is_none();
            items.push(BulkItemOutcome {
                status: if created { 201 } else { 200 },
                result: Some(if created { "created" } else { "updated" }.to_string()),
                error: None,
            });
        }

        Ok(BulkResponse {
            took: 1,
            errors: items.iter().any(|i| i.error.is_some()),
            items,
        })
    }

    async fn delete_all_documents(&self, index: &str) -> Result<u64, SearchIndexError> {
        self.record("delete_all_documents").await;
        let mut state = self.state.lock().await;
        let idx = state
            .indices
            .get_mut(index)
            .ok_or_else(|| Self::missing(index))?;
        let deleted = idx.docs.len() as u64;
        idx.docs.clear();
        Ok(deleted)
    }

    async fn force_merge(&self, index: &str) -> Result<(), SearchIndexError> {
        self.record("force_merge").await;
        if self.state.lock().await.indices.contains_key(index) {
            Ok(())
        } else {
            Err(Self::missing(index))
        }
    }

    async fn reindex(&self, source: &str, target: &str) -> Result<ReindexSummary, SearchIndexError> {
        self.record("reindex").await;
        let mut state = self.state.lock().await;
        let docs = state
            .indices
            .get(source)
            .map(|i| i.docs.clone())
            .ok_or_else(|| Self::missing(source))?;
        let dest = state
            .indices
            .get_mut(target)
            .ok_or_else(|| Self::missing(target))?;

        let mut summary = ReindexSummary::default();
        for (id, doc) in docs {
            summary.total += 1;
            if dest.docs.insert(id, doc).is_none() {
                summary.created += 1;
            } else {
                summary.updated += 1;
            }
        }
        Ok(summary)
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchIndexError> {
        self.record("refresh").await;
        if self.state.lock().await.indices.contains_key(index) {
            Ok(())
        } else {
            Err(Self::missing(index))
        }
    }

    async fn health_check(&self) -> Result<(), SearchIndexError> {
        self.record("health_check").await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_alias_update_is_all_or_nothing() {
        let provider = InMemoryIndexProvider::new();
        provider.create_index("products_v1").await;
        provider.add_alias("products", "products_v1").await;

        let actions = vec![
            AliasAction::remove("products_v1", "products"),
            AliasAction::add("missing", "products"),
        ];
        assert!(provider.update_aliases(&actions).await.is_err());
        assert_eq!(
            provider.alias_indices("products").await.unwrap(),
            vec!["products_v1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_bulk_rules_and_replacement() {
        let provider = InMemoryIndexProvider::new();
        provider.create_index("products").await;
        provider
            .add_bulk_rule(BulkRule::permanent("sku", json!("bad"), 400, "mapper_parsing_exception"))
            .await;

        let lines = vec![
            json!({"index": {"_index": "products", "_id": "1"}}).to_string(),
            json!({"sku": "a", "color": "red"}).to_string(),
            json!({"create": {"_index": "products"}}).to_string(),
            json!({"sku": "bad"}).to_string(),
            json!({"index": {"_index": "products", "_id": "1"}}).to_string(),
            json!({"sku": "b"}).to_string(),
        ];
        let response = provider.bulk("products", lines).await.unwrap();

        assert_eq!(response.items.len(), 3);
        assert!(response.items[0].is_created());
        assert_eq!(response.items[1].status, 400);
        assert_eq!(response.items[2].result.as_deref(), Some("updated"));
        assert_eq!(provider.document_count("products").await.unwrap(), 1);
        // replaced as a whole, dropped fields do not survive
        assert_eq!(provider.documents("products").await, vec![json!({"sku": "b"})]);
    }
}
