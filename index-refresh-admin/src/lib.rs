//! # Index Refresh Admin
//!
//! Guardrail validation and the index operations it gates: emptying an
//! index, copying one index into another and atomically repointing an alias.
//!
//! Every operation validates the indices it touches immediately before it
//! issues a mutating call. Reports are never reused across operations.

pub mod alias;
pub mod cleanup;
pub mod errors;
pub mod guardrail;
pub mod reindex;

pub use alias::{AliasSwitchOutcome, AliasSwitcher};
pub use cleanup::{CleanupOutcome, IndexCleaner};
pub use errors::{AdminError, GuardrailError};
pub use guardrail::{GuardrailConfig, GuardrailValidator};
pub use reindex::{ReindexOutcome, Reindexer};
