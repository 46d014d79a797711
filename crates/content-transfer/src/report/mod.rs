//! Diagnostics, progress tracking and the final transfer summary.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::record::EntityId;
use crate::error::Result;

/// Severity of one diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Content category processed as one ordered, streamed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Schema,
    Configuration,
    Entities,
    Links,
    Assets,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Schema => write!(f, "schema"),
            Stage::Configuration => write!(f, "configuration"),
            Stage::Entities => write!(f, "entities"),
            Stage::Links => write!(f, "links"),
            Stage::Assets => write!(f, "assets"),
        }
    }
}

/// Engine state machine phase, observable through the progress accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    Created,
    Bootstrapping,
    CompatibilityCheck,
    Schema,
    Configuration,
    Entities,
    Links,
    Assets,
    Finalizing,
    Closed,
    Failed,
    Cancelled,
}

/// Final status of a transfer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Completed,
    Cancelled,
    Failed,
}

/// Structured record of a non-fatal issue encountered during a transfer.
///
/// Diagnostics are accumulated in order for the whole transfer and never
/// discarded.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl Diagnostic {
    /// Build an info diagnostic.
    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, stage, message)
    }

    /// Build a warning diagnostic.
    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, stage, message)
    }

    /// Build an error diagnostic.
    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, stage, message)
    }

    fn new(severity: Severity, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            severity,
            stage,
            entity_type: None,
            entity_id: None,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the entity this diagnostic is about.
    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: EntityId) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id);
        self
    }

    /// Attach the underlying cause.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// Per-stage record counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub created: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Counters for every stage of one transfer.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StageSummaries {
    pub schema: StageCounts,
    pub configuration: StageCounts,
    pub entities: StageCounts,
    pub links: StageCounts,
    pub assets: StageCounts,
}

impl StageSummaries {
    /// Mutable counters for one stage.
    pub fn counts_mut(&mut self, stage: Stage) -> &mut StageCounts {
        match stage {
            Stage::Schema => &mut self.schema,
            Stage::Configuration => &mut self.configuration,
            Stage::Entities => &mut self.entities,
            Stage::Links => &mut self.links,
            Stage::Assets => &mut self.assets,
        }
    }

    /// Counters for one stage.
    pub fn counts(&self, stage: Stage) -> StageCounts {
        match stage {
            Stage::Schema => self.schema,
            Stage::Configuration => self.configuration,
            Stage::Entities => self.entities,
            Stage::Links => self.links,
            Stage::Assets => self.assets,
        }
    }
}

/// Result of a transfer run, read-only to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TransferSummary {
    /// Unique run identifier.
    pub transfer_id: String,

    /// Final status.
    pub status: TransferStatus,

    /// When the transfer started.
    pub started_at: DateTime<Utc>,

    /// When the transfer completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-stage counters.
    pub stages: StageSummaries,

    /// Full ordered diagnostics sequence.
    pub diagnostics: Vec<Diagnostic>,
}

impl TransferSummary {
    /// Convert to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Whether any diagnostic at `Error` severity was recorded.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

/// Mutable accumulation of diagnostics and counters while a transfer runs.
///
/// Owned by the engine; converted into a [`TransferSummary`] at the end.
#[derive(Debug, Default)]
pub struct TransferReport {
    diagnostics: Vec<Diagnostic>,
    stages: StageSummaries,
}

impl TransferReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic, logging it at the matching level.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Info => info!(stage = %diagnostic.stage, "{}", diagnostic.message),
            Severity::Warning => warn!(stage = %diagnostic.stage, "{}", diagnostic.message),
            Severity::Error => error!(
                stage = %diagnostic.stage,
                cause = diagnostic.cause.as_deref().unwrap_or(""),
                "{}",
                diagnostic.message
            ),
        }
        self.diagnostics.push(diagnostic);
    }

    /// Mutable counters for one stage.
    pub fn counts_mut(&mut self, stage: Stage) -> &mut StageCounts {
        self.stages.counts_mut(stage)
    }

    /// Counters for one stage.
    pub fn counts(&self, stage: Stage) -> StageCounts {
        self.stages.counts(stage)
    }

    /// Diagnostics recorded so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Seal the report into a summary.
    pub fn into_summary(
        self,
        transfer_id: String,
        status: TransferStatus,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> TransferSummary {
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        TransferSummary {
            transfer_id,
            status,
            started_at,
            completed_at,
            duration_seconds,
            stages: self.stages,
            diagnostics: self.diagnostics,
        }
    }
}

/// Atomic per-stage counters.
#[derive(Debug, Default)]
pub struct AtomicStageCounts {
    created: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl AtomicStageCounts {
    fn snapshot(&self) -> StageCounts {
        StageCounts {
            created: self.created.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Live progress for a transfer in flight.
///
/// Shared between the engine and callers polling progress; all counters
/// are atomics so readers never block the pipeline.
#[derive(Debug)]
pub struct ProgressTracker {
    phase: Mutex<TransferPhase>,
    schema: AtomicStageCounts,
    configuration: AtomicStageCounts,
    entities: AtomicStageCounts,
    links: AtomicStageCounts,
    assets: AtomicStageCounts,
    bytes_transferred: AtomicU64,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Create a tracker in the `Created` phase.
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(TransferPhase::Created),
            schema: AtomicStageCounts::default(),
            configuration: AtomicStageCounts::default(),
            entities: AtomicStageCounts::default(),
            links: AtomicStageCounts::default(),
            assets: AtomicStageCounts::default(),
            bytes_transferred: AtomicU64::new(0),
        }
    }

    fn stage(&self, stage: Stage) -> &AtomicStageCounts {
        match stage {
            Stage::Schema => &self.schema,
            Stage::Configuration => &self.configuration,
            Stage::Entities => &self.entities,
            Stage::Links => &self.links,
            Stage::Assets => &self.assets,
        }
    }

    /// Move the state machine to a new phase.
    pub fn set_phase(&self, phase: TransferPhase) {
        *self.phase.lock().expect("phase lock poisoned") = phase;
    }

    /// Current phase.
    pub fn phase(&self) -> TransferPhase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    /// Count one created record.
    pub fn record_created(&self, stage: Stage) {
        self.stage(stage).created.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one skipped record.
    pub fn record_skipped(&self, stage: Stage) {
        self.stage(stage).skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one failed record.
    pub fn record_failed(&self, stage: Stage) {
        self.stage(stage).failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count transferred asset bytes.
    pub fn add_bytes(&self, count: u64) {
        self.bytes_transferred.fetch_add(count, Ordering::Relaxed);
    }

    /// Total asset bytes transferred so far.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }

    /// Point-in-time counters for one stage.
    pub fn stage_counts(&self, stage: Stage) -> StageCounts {
        self.stage(stage).snapshot()
    }

    /// Point-in-time snapshot of the whole tracker.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: self.phase(),
            stages: StageSummaries {
                schema: self.schema.snapshot(),
                configuration: self.configuration.snapshot(),
                entities: self.entities.snapshot(),
                links: self.links.snapshot(),
                assets: self.assets.snapshot(),
            },
            bytes_transferred: self.bytes_transferred(),
        }
    }
}

/// Point-in-time view of a running transfer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProgressSnapshot {
    pub phase: TransferPhase,
    pub stages: StageSummaries,
    pub bytes_transferred: u64,
}
