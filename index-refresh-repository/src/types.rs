//! Request and response types for search index operations.

use serde_json::{json, Value};

use crate::errors::SearchIndexError;

/// One action of an atomic alias update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
}

impl AliasAction {
    pub fn add(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Add {
            index: index.into(),
            alias: alias.into(),
        }
    }

    pub fn remove(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Remove {
            index: index.into(),
            alias: alias.into(),
        }
    }

    /// The action as it appears in the `actions` array of an `_aliases` request.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Add { index, alias } => json!({"add": {"index": index, "alias": alias}}),
            Self::Remove { index, alias } => json!({"remove": {"index": index, "alias": alias}}),
        }
    }
}

/// Error body attached to a failed bulk item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemError {
    pub error_type: String,
    pub reason: String,
}

/// Outcome of one item of a bulk request, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemOutcome {
    pub status: u16,
    /// `created`, `updated`, `noop`, ... when the item succeeded.
    pub result: Option<String>,
    pub error: Option<BulkItemError>,
}

impl BulkItemOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }

    /// Whether the item produced a new document.
    pub fn is_created(&self) -> bool {
        self.is_success() && (self.result.as_deref() == Some("created") || self.status == 201)
    }
}

/// Parsed response of a bulk request.
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    pub took: u64,
    pub errors: bool,
    pub items: Vec<BulkItemOutcome>,
}

impl BulkResponse {
    /// Parse a bulk response body.
    ///
    /// Each entry of `items` is a single-key object keyed by the action name
    /// (`index`, `create`, `update`, `delete`). The `error` member is an object
    /// with `type` and `reason` on modern clusters but may be a bare string.
    pub fn parse(body: &Value) -> Result<Self, SearchIndexError> {
        let items = body
            .get("items")
            .and_then(|i| i.as_array())
            .ok_or_else(|| SearchIndexError::parse("Bulk response has no items array"))?;

        let items = items
            .iter()
            .enumerate()
            .map(|(position, item)| Self::parse_item(position, item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            took: body.get("took").and_then(|t| t.as_u64()).unwrap_or(0),
            errors: body.get("errors").and_then(|e| e.as_bool()).unwrap_or(false),
            items,
        })
    }

    fn parse_item(position: usize, item: &Value) -> Result<BulkItemOutcome, SearchIndexError> {
        let detail = item
            .as_object()
            .and_then(|obj| obj.values().next())
            .ok_or_else(|| {
                SearchIndexError::parse(format!("Bulk item {} is not an action object", position))
            })?;

        let status = detail
            .get("status")
            .and_then(|s| s.as_u64())
            .and_then(|s| u16::try_from(s).ok())
            .ok_or_else(|| {
                SearchIndexError::parse(format!("Bulk item {} has no status", position))
            })?;

        let error = detail.get("error").map(|e| match e {
            Value::String(reason) => BulkItemError {
                error_type: "unknown".to_string(),
                reason: reason.clone(),
            },
            other => BulkItemError {
                error_type: other
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
                reason: other
                    .get("reason")
                    .and_then(|r| r.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string()),
            },
        });

        Ok(BulkItemOutcome {
            status,
            result: detail
                .get("result")
                .and_then(|r| r.as_str())
                .map(str::to_string),
            error,
        })
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.is_success()).count()
    }
}

/// Counts reported by a `_reindex` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexSummary {
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    pub failures: usize,
    pub took_ms: u64,
}

impl ReindexSummary {
    pub fn parse(body: &Value) -> Self {
        let count = |field: &str| body.get(field).and_then(|v| v.as_u64()).unwrap_or(0);
        Self {
            total: count("total"),
            created: count("created"),
            updated: count("updated"),
            failures: body
                .get("failures")
                .and_then(|f| f.as_array())
                .map(|f| f.len())
                .unwrap_or(0),
            took_ms: count("took"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_bulk_response() {
        let body = json!({
            "took": 12,
            "errors": true,
            "items": [
                {"index": {"_index": "products", "_id": "1", "status": 201, "result": "created"}},
                {"index": {"_index": "products", "_id": "2", "status": 200, "result": "updated"}},
                {"create": {"_index": "products", "status": 400, "error": {
                    "type": "mapper_parsing_exception",
                    "reason": "failed to parse field [price]"
                }}},
                {"create": {"_index": "products", "status": 429, "error": "rejected execution of coordinating operation"}}
            ]
        });

        let response = BulkResponse::parse(&body).unwrap();
        assert_eq!(response.took, 12);
        assert!(response.errors);
        assert_eq!(response.items.len(), 4);
        assert_eq!(response.succeeded(), 2);

        assert!(response.items[0].is_created());
        assert!(!response.items[1].is_created());

        let mapping = response.items[2].error.as_ref().unwrap();
        assert_eq!(mapping.error_type, "mapper_parsing_exception");
        assert_eq!(response.items[2].status, 400);

        let rejected = response.items[3].error.as_ref().unwrap();
        assert_eq!(rejected.error_type, "unknown");
        assert!(rejected.reason.contains("rejected execution"));
    }

    #[test]
    fn test_parse_rejects_missing_items() {
        let result = BulkResponse::parse(&json!({"took": 1, "errors": false}));
        assert!(matches!(result, Err(SearchIndexError::ParseError(_))));
    }

    #[test]
    fn test_parse_rejects_item_without_status() {
        let body = json!({"items": [{"index": {"_id": "1"}}]});
        assert!(BulkResponse::parse(&body).is_err());
    }

    #[test]
    fn test_alias_action_json() {
        assert_eq!(
            AliasAction::remove("products_v1", "products").to_json(),
            json!({"remove": {"index": "products_v1", "alias": "products"}})
        );
        assert_eq!(
            AliasAction::add("products_v2", "products").to_json(),
            json!({"add": {"index": "products_v2", "alias": "products"}})
        );
    }

    #[test]
    fn test_reindex_summary() {
        let summary = ReindexSummary::parse(&json!({
            "took": 150, "total": 10, "created": 8, "updated": 2, "failures": []
        }));
        assert_eq!(summary.total, 10);
        assert_eq!(summary.created, 8);
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.failures, 0);
    }
}
