//! Error types for the transfer engine.

use thiserror::Error;

/// Main error type for transfer operations.
///
/// Only fatal conditions surface through this type. Per-record failures
/// (a single entity, link, asset or configuration write) are captured as
/// [`Diagnostic`](crate::report::Diagnostic)s and never abort a transfer,
/// unless the configured failure threshold is exceeded.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Configuration error (invalid YAML, bad option values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A provider could not acquire its backing resources.
    #[error("Provider '{provider}' failed to bootstrap: {message}")]
    Bootstrap { provider: String, message: String },

    /// Schema or version mismatch under a non-ignore strategy.
    #[error("Compatibility violation: {0}")]
    Compatibility(String),

    /// An old id was re-registered with a different new id.
    ///
    /// This is a programming-invariant violation, not an operational
    /// failure: the same source entity must never map to two ids.
    #[error(
        "Mapping conflict for {entity_type} id {old_id}: \
         already mapped to {existing}, attempted {attempted}"
    )]
    MappingConflict {
        entity_type: String,
        old_id: i64,
        existing: i64,
        attempted: i64,
    },

    /// Too many consecutive record failures in one stage.
    #[error("Aborting {stage} stage after {count} consecutive record failures")]
    FailureThreshold { stage: String, count: u32 },

    /// A provider failed in a way that invalidates the rest of a stage
    /// (e.g. its record stream broke mid-iteration).
    #[error("Provider error during {stage} stage: {message}")]
    Provider { stage: String, message: String },

    /// A stream operator failed.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Transfer was cancelled.
    #[error("Transfer cancelled")]
    Cancelled,

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransferError {
    /// Create a Bootstrap error for the named provider.
    pub fn bootstrap(provider: impl Into<String>, message: impl Into<String>) -> Self {
        TransferError::Bootstrap {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a Provider error for the named stage.
    pub fn provider(stage: impl Into<String>, message: impl Into<String>) -> Self {
        TransferError::Provider {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Whether this error aborts the whole transfer.
    ///
    /// Everything in this enum is fatal by construction; the method exists
    /// so call sites read as a policy decision rather than a tautology.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
