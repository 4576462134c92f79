//! Atomically repointing an alias from one index to another.

use std::sync::Arc;

use index_refresh_repository::{AliasAction, SearchIndexProvider};
use index_refresh_shared::{GuardedOperation, GuardrailReport};
use tracing::{error, info, instrument};

use crate::errors::{AdminError, GuardrailError};
use crate::guardrail::GuardrailValidator;

#[derive(Debug, Clone)]
pub struct AliasSwitchOutcome {
    pub alias: String,
    pub previous_index: String,
    pub current_index: String,
    pub target_report: GuardrailReport,
}

/// Moves an alias from a source index to a validated target index.
///
/// The remove and add actions are sent in one request, so readers observe
/// the alias on the source or on the target, never on neither or both.
pub struct AliasSwitcher {
    provider: Arc<dyn SearchIndexProvider>,
    validator: Arc<GuardrailValidator>,
}

impl AliasSwitcher {
    pub fn new(provider: Arc<dyn SearchIndexProvider>, validator: Arc<GuardrailValidator>) -> Self {
        Self {
            provider,
            validator,
        }
    }

    #[instrument(skip(self))]
    pub async fn switch(
        &self,
        alias: &str,
        source: &str,
        target: &str,
    ) -> Result<AliasSwitchOutcome, AdminError> {
        if source == target {
            return Err(AdminError::operation_failed(
                "source and target index must differ",
            ));
        }

        if !self.provider.index_exists(source).await? {
            return Err(GuardrailError::IndexNotFound {
                index: source.to_string(),
            }
            .into());
        }

        let target_report = self
            .validator
            .validate(
                target,
                &GuardedOperation::AliasSwitch {
                    source: source.to_string(),
                },
            )
            .await?;

        let current = self.provider.alias_indices(alias).await?;
        if current.is_empty() {
            return Err(AdminError::AliasNotFound(alias.to_string()));
        }
        if current != [source] {
            return Err(AdminError::AliasMismatch {
                alias: alias.to_string(),
                expected: source.to_string(),
                actual: current,
            });
        }

        info!(alias, source, target, "Switching alias");
        self.provider
            .update_aliases(&[
                AliasAction::remove(source, alias),
                AliasAction::add(target, alias),
            ])
            .await?;

        let resolved = self.provider.alias_indices(alias).await?;
        if resolved != [target] {
            error!(alias, resolved = ?resolved, "Alias does not resolve to the target after switch");
            return Err(AdminError::AliasMismatch {
                alias: alias.to_string(),
                expected: target.to_string(),
                actual: resolved,
            });
        }

        info!(alias, previous = source, current = target, "Alias switched");
        Ok(AliasSwitchOutcome {
            alias: alias.to_string(),
            previous_index: source.to_string(),
            current_index: target.to_string(),
            target_report,
        })
    }
}
