//! Stage execution pipeline.
//!
//! Each stage pulls records from a source stream one at a time and pushes
//! them into the destination through [`StageContext`], which bundles the
//! shared per-transfer state every stage needs: the destination handle,
//! the id mapping table, the report, the progress tracker, the
//! cancellation token and the failure policy.

mod stages;

pub use stages::{
    run_assets_stage, run_configuration_stage, run_entities_stage, run_links_stage,
    run_schema_stage,
};

use tokio_util::sync::CancellationToken;

use crate::config::FailurePolicy;
use crate::core::traits::DestinationProvider;
use crate::error::{Result, TransferError};
use crate::mapping::MappingTable;
use crate::report::{ProgressTracker, Stage, TransferReport};

/// Shared mutable state handed to every stage runner.
pub struct StageContext<'a> {
    pub destination: &'a dyn DestinationProvider,
    pub mapping: &'a mut MappingTable,
    pub report: &'a mut TransferReport,
    pub progress: &'a ProgressTracker,
    pub cancel: &'a CancellationToken,
    pub policy: FailurePolicy,
}

impl StageContext<'_> {
    /// Count one created record in both the report and the live tracker.
    pub fn created(&mut self, stage: Stage) {
        self.report.counts_mut(stage).created += 1;
        self.progress.record_created(stage);
    }

    /// Count one skipped record.
    pub fn skipped(&mut self, stage: Stage) {
        self.report.counts_mut(stage).skipped += 1;
        self.progress.record_skipped(stage);
    }

    /// Count one failed record.
    pub fn failed(&mut self, stage: Stage) {
        self.report.counts_mut(stage).failed += 1;
        self.progress.record_failed(stage);
    }

    /// A failure guard for one stage run, bound to this context's policy.
    pub fn failure_guard(&self, stage: Stage) -> FailureGuard {
        FailureGuard {
            policy: self.policy,
            stage,
            consecutive: 0,
        }
    }
}

/// Tracks consecutive record failures within one stage.
///
/// A run of failures reaching the configured threshold escalates to a
/// fatal [`TransferError::FailureThreshold`]; any success resets the run.
#[derive(Debug)]
pub struct FailureGuard {
    policy: FailurePolicy,
    stage: Stage,
    consecutive: u32,
}

impl FailureGuard {
    /// Record one failed record; errors once the threshold is reached.
    pub fn record_failure(&mut self) -> Result<()> {
        self.consecutive += 1;
        match self.policy.max_consecutive_failures {
            Some(max) if self.consecutive >= max => Err(TransferError::FailureThreshold {
                stage: self.stage.to_string(),
                count: self.consecutive,
            }),
            _ => Ok(()),
        }
    }

    /// Record one successful record, resetting the failure run.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }
}
