//! Guardrail validation.
//!
//! Rules are evaluated in a fixed order and the first failing rule aborts
//! validation. Every evaluated check is logged on the `guardrail_audit`
//! target and kept on the returned report.

use std::sync::Arc;

use index_refresh_repository::SearchIndexProvider;
use index_refresh_shared::{GuardedOperation, GuardrailCheck, GuardrailReport, HealthStatus};
use tracing::{info, instrument, warn};

use crate::errors::GuardrailError;

/// Log target for guardrail audit records.
pub const AUDIT_TARGET: &str = "guardrail_audit";

/// Configuration for guardrail validation.
#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    /// Maximum allowed source/target document count divergence for an alias
    /// switch, in percent of the source count.
    pub count_threshold_percent: f64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            count_threshold_percent: 10.0,
        }
    }
}

/// `abs(source - target) / max(source, 1) * 100`.
pub fn count_divergence_percent(source_count: u64, target_count: u64) -> f64 {
    let diff = source_count.abs_diff(target_count) as f64;
    diff * 100.0 / source_count.max(1) as f64
}

/// Validates an index before a gated operation touches it.
pub struct GuardrailValidator {
    provider: Arc<dyn SearchIndexProvider>,
    config: GuardrailConfig,
}

impl GuardrailValidator {
    pub fn new(provider: Arc<dyn SearchIndexProvider>, config: GuardrailConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// Validate `index` for `operation`.
    ///
    /// # Arguments
    ///
    /// * `index` - The concrete index name
    /// * `operation` - The operation about to run against it
    ///
    /// # Returns
    ///
    /// * `Ok(GuardrailReport)` - Every applicable check passed
    /// * `Err(GuardrailError)` - The first rule that failed. Later rules are not evaluated.
    #[instrument(skip(self, operation), fields(operation = %operation))]
    pub async fn validate(
        &self,
        index: &str,
        operation: &GuardedOperation,
    ) -> Result<GuardrailReport, GuardrailError> {
        let mut report = GuardrailReport::new(index, operation.clone());

        // 1. existence
        report.exists = self
            .provider
            .index_exists(index)
            .await
            .map_err(|source| GuardrailError::CheckFailed {
                index: index.to_string(),
                check: "index_exists",
                source,
            })?;

        if !report.exists {
            if operation.creates_index() {
                record(&mut report, "index_exists", true, "absent, will be created");
                return Ok(report);
            }
            record(&mut report, "index_exists", false, "index does not exist");
            return Err(GuardrailError::IndexNotFound {
                index: index.to_string(),
            });
        }
        record(&mut report, "index_exists", true, "index exists");

        // 2. not serving traffic
        report.aliases = self
            .provider
            .index_aliases(index)
            .await
            .map_err(|source| GuardrailError::CheckFailed {
                index: index.to_string(),
                check: "not_live",
                source,
            })?;
        let behind_alias = self
            .provider
            .alias_indices(index)
            .await
            .map_err(|source| GuardrailError::CheckFailed {
                index: index.to_string(),
                check: "not_live",
                source,
            })?;
        if !behind_alias.is_empty() && !report.aliases.iter().any(|a| a == index) {
            // the name itself is an alias
            report.aliases.push(index.to_string());
            report.aliases.sort();
        }
        report.is_live = !report.aliases.is_empty();

        if operation.mutates_in_place() {
            if report.is_live {
                let detail = format!("served by alias(es) {:?}", report.aliases);
                record(&mut report, "not_live", false, &detail);
                return Err(GuardrailError::LiveTraffic {
                    index: index.to_string(),
                    aliases: report.aliases.clone(),
                });
            }
            record(&mut report, "not_live", true, "no alias points at the index");
        }

        // 3. health
        report.health = match self.provider.index_health(index).await {
            Ok(health) => health,
            Err(e) => {
                warn!(target: AUDIT_TARGET, index, error = %e, "Health lookup failed");
                HealthStatus::Unknown
            }
        };
        if !report.health.is_serviceable() {
            let detail = format!("health is {}", report.health);
            record(&mut report, "healthy", false, &detail);
            return Err(GuardrailError::UnhealthyIndex {
                index: index.to_string(),
                health: report.health,
            });
        }
        let detail = format!("health is {}", report.health);
        record(&mut report, "healthy", true, &detail);

        report.document_count = self
            .provider
            .document_count(index)
            .await
            .map_err(|source| GuardrailError::CheckFailed {
                index: index.to_string(),
                check: "document_count",
                source,
            })?;

        // 4. alias switch target population
        if let GuardedOperation::AliasSwitch { source } = operation {
            self.check_switch_counts(&mut report, source).await?;
        }

        Ok(report)
    }

    async fn check_switch_counts(
        &self,
        report: &mut GuardrailReport,
        source: &str,
    ) -> Result<(), GuardrailError> {
        let target_count = report.document_count;
        if target_count == 0 {
            record(report, "target_not_empty", false, "target holds 0 documents");
            return Err(GuardrailError::EmptyTarget {
                index: report.index.clone(),
            });
        }
        let detail = format!("target holds {} documents", target_count);
        record(report, "target_not_empty", true, &detail);

        let source_count = self
            .provider
            .document_count(source)
            .await
            .map_err(|e| GuardrailError::CheckFailed {
                index: source.to_string(),
                check: "count_divergence",
                source: e,
            })?;

        let divergence = count_divergence_percent(source_count, target_count);
        let threshold = self.config.count_threshold_percent;
        let detail = format!(
            "source={} target={} divergence={:.2}% threshold={}%",
            source_count, target_count, divergence, threshold
        );

        if divergence > threshold {
            record(report, "count_divergence", false, &detail);
            return Err(GuardrailError::CountDivergence {
                source_index: source.to_string(),
                target_index: report.index.clone(),
                source_count,
                target_count,
                divergence_percent: divergence,
                threshold_percent: threshold,
            });
        }
        record(report, "count_divergence", true, &detail);
        Ok(())
    }
}

fn record(report: &mut GuardrailReport, check: &str, passed: bool, detail: &str) {
    if passed {
        info!(
            target: AUDIT_TARGET,
            index = %report.index,
            operation = %report.operation,
            check,
            passed,
            detail,
            "Guardrail check"
        );
    } else {
        warn!(
            target: AUDIT_TARGET,
            index = %report.index,
            operation = %report.operation,
            check,
            passed,
            detail,
            "Guardrail check"
        );
    }
    report.checks.push(GuardrailCheck {
        name: check.to_string(),
        passed,
        detail: detail.to_string(),
    });
}
