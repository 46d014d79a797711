//! Transfer option type definitions.

use serde::{Deserialize, Serialize};

use crate::strategy::{ConflictStrategy, SchemaStrategy, VersionStrategy};

/// Options controlling one transfer run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Schema compatibility strategy (default: `strict`).
    #[serde(default)]
    pub schema_strategy: SchemaStrategy,

    /// Platform version compatibility strategy (default: `strict`).
    #[serde(default)]
    pub version_strategy: VersionStrategy,

    /// Conflict handling token passed to the destination provider at
    /// bootstrap (default: `restore`).
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,

    /// How per-record failures escalate.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl TransferOptions {
    /// Options for a restore into a fresh destination: destructive write,
    /// no compatibility gating.
    pub fn restore_ignore() -> Self {
        Self {
            schema_strategy: SchemaStrategy::Ignore,
            version_strategy: VersionStrategy::Ignore,
            conflict_strategy: ConflictStrategy::Restore,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Escalation policy for per-record write failures.
///
/// A single failed record is always a diagnostic, never stage-fatal. With
/// a threshold set, `max_consecutive_failures` failures in a row abort
/// the stage fatally, so a fully broken destination cannot hide behind
/// per-record error handling. The counter resets on any success.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FailurePolicy {
    /// Abort a stage after this many consecutive record failures.
    /// `None` continues unconditionally.
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,
}

impl FailurePolicy {
    /// Abort after `count` consecutive failures.
    pub fn abort_after(count: u32) -> Self {
        Self {
            max_consecutive_failures: Some(count),
        }
    }
}
