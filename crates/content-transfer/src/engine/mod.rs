//! Transfer orchestration.
//!
//! [`TransferEngine`] owns one run end to end: bootstrap both providers,
//! gate on version and schema compatibility, execute the five stages in
//! their fixed order, and close both providers on every exit path.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::TransferOptions;
use crate::core::traits::{DestinationProvider, ProviderMetadata, SourceProvider};
use crate::error::{Result, TransferError};
use crate::mapping::MappingTable;
use crate::pipeline::{
    run_assets_stage, run_configuration_stage, run_entities_stage, run_links_stage,
    run_schema_stage, StageContext,
};
use crate::report::{
    Diagnostic, ProgressTracker, Stage, TransferPhase, TransferReport, TransferStatus,
    TransferSummary,
};
use crate::strategy::{check_version_compatibility, VersionStrategy};

/// A fatal transfer abort together with everything recorded before it.
///
/// The summary carries status [`TransferStatus::Failed`] and the full
/// ordered diagnostics sequence, so per-record failures observed before
/// the abort are never lost with the error.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct FailedTransfer {
    /// The condition that aborted the transfer.
    pub error: TransferError,

    /// Partial-progress summary up to the abort.
    pub summary: TransferSummary,
}

impl From<FailedTransfer> for TransferError {
    fn from(failure: FailedTransfer) -> Self {
        failure.error
    }
}

/// Orchestrates one content transfer between two providers.
///
/// The engine is single-use: construct it, optionally hand out its
/// cancellation token and progress tracker, then call
/// [`transfer`](TransferEngine::transfer) once.
pub struct TransferEngine {
    source: Arc<dyn SourceProvider>,
    destination: Arc<dyn DestinationProvider>,
    options: TransferOptions,
    progress: Arc<ProgressTracker>,
    cancel: CancellationToken,
}

impl TransferEngine {
    /// Create an engine for the given provider pair.
    pub fn new(
        source: Arc<dyn SourceProvider>,
        destination: Arc<dyn DestinationProvider>,
        options: TransferOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            source,
            destination,
            options,
            progress: Arc::new(ProgressTracker::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Live progress tracker for this run.
    pub fn progress(&self) -> Arc<ProgressTracker> {
        self.progress.clone()
    }

    /// Token that cancels the run when triggered.
    ///
    /// Cancellation is graceful: the record in flight completes, both
    /// providers are closed, and [`transfer`](TransferEngine::transfer)
    /// returns a summary with [`TransferStatus::Cancelled`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation of the run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Execute the transfer.
    ///
    /// Per-record failures surface as diagnostics in the returned summary;
    /// only fatal conditions (bootstrap failure, compatibility violation,
    /// broken source stream, mapping conflict, exceeded failure threshold)
    /// return an error, and the error still carries a `Failed` summary
    /// with every diagnostic recorded up to the abort. Both providers are
    /// closed on every path.
    pub async fn transfer(&self) -> std::result::Result<TransferSummary, FailedTransfer> {
        let transfer_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            transfer_id = %transfer_id,
            source = self.source.name(),
            destination = self.destination.name(),
            conflict_strategy = %self.options.conflict_strategy,
            "starting transfer"
        );

        let mut report = TransferReport::new();
        let mut mapping = MappingTable::new();

        match self.run(&mut report, &mut mapping).await {
            Ok(()) => {
                self.progress.set_phase(TransferPhase::Finalizing);
                self.close_both().await;

                let status = if self.cancel.is_cancelled() {
                    self.progress.set_phase(TransferPhase::Cancelled);
                    TransferStatus::Cancelled
                } else {
                    self.progress.set_phase(TransferPhase::Closed);
                    TransferStatus::Completed
                };

                let completed_at = Utc::now();
                let summary =
                    report.into_summary(transfer_id, status, started_at, completed_at);
                info!(
                    transfer_id = %summary.transfer_id,
                    status = ?summary.status,
                    duration_seconds = summary.duration_seconds,
                    entities = summary.stages.entities.created,
                    links = summary.stages.links.created,
                    assets = summary.stages.assets.created,
                    "transfer finished"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(transfer_id = %transfer_id, "transfer failed: {}", e.format_detailed());
                self.close_both().await;

                let stage = fatal_stage(self.progress.phase());
                self.progress.set_phase(TransferPhase::Failed);
                report.record(
                    Diagnostic::error(stage, "transfer aborted").with_cause(e.to_string()),
                );

                let completed_at = Utc::now();
                let summary = report.into_summary(
                    transfer_id,
                    TransferStatus::Failed,
                    started_at,
                    completed_at,
                );
                Err(FailedTransfer { error: e, summary })
            }
        }
    }

    async fn run(&self, report: &mut TransferReport, mapping: &mut MappingTable) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.progress.set_phase(TransferPhase::Bootstrapping);
        let source_meta = self.bootstrap_source().await?;
        let dest_meta = self.bootstrap_destination().await?;

        self.progress.set_phase(TransferPhase::CompatibilityCheck);
        check_version_compatibility(
            self.options.version_strategy,
            &source_meta.platform_version,
            &dest_meta.platform_version,
        )?;
        if self.options.version_strategy == VersionStrategy::Ignore
            && source_meta.platform_version != dest_meta.platform_version
        {
            report.record(Diagnostic::info(
                Stage::Schema,
                format!(
                    "platform versions differ ({} vs {}); proceeding under 'ignore' strategy",
                    source_meta.platform_version, dest_meta.platform_version
                ),
            ));
        }

        let mut ctx = StageContext {
            destination: self.destination.as_ref(),
            mapping,
            report,
            progress: &self.progress,
            cancel: &self.cancel,
            policy: self.options.failure_policy,
        };
        let source = self.source.as_ref();

        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.progress.set_phase(TransferPhase::Schema);
        run_schema_stage(source, self.options.schema_strategy, &mut ctx).await?;
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        if stage_supported(&source_meta, &dest_meta, Stage::Configuration) {
            self.progress.set_phase(TransferPhase::Configuration);
            run_configuration_stage(source, &mut ctx).await?;
        } else {
            skip_stage(&mut ctx, Stage::Configuration);
        }
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        if stage_supported(&source_meta, &dest_meta, Stage::Entities) {
            self.progress.set_phase(TransferPhase::Entities);
            run_entities_stage(source, &mut ctx).await?;
        } else {
            skip_stage(&mut ctx, Stage::Entities);
        }
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        if stage_supported(&source_meta, &dest_meta, Stage::Links) {
            self.progress.set_phase(TransferPhase::Links);
            run_links_stage(source, &mut ctx).await?;
        } else {
            skip_stage(&mut ctx, Stage::Links);
        }
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        if stage_supported(&source_meta, &dest_meta, Stage::Assets) {
            self.progress.set_phase(TransferPhase::Assets);
            run_assets_stage(source, &mut ctx).await?;
        } else {
            skip_stage(&mut ctx, Stage::Assets);
        }

        Ok(())
    }

    async fn bootstrap_source(&self) -> Result<ProviderMetadata> {
        self.source
            .bootstrap()
            .await
            .map_err(|e| TransferError::bootstrap(self.source.name(), e.to_string()))
    }

    async fn bootstrap_destination(&self) -> Result<ProviderMetadata> {
        self.destination
            .bootstrap(self.options.conflict_strategy)
            .await
            .map_err(|e| TransferError::bootstrap(self.destination.name(), e.to_string()))
    }

    /// Close both providers, tolerating close failures.
    ///
    /// Runs on every exit path; a provider that cannot release its
    /// resources must not mask the transfer's own outcome.
    async fn close_both(&self) {
        if let Err(e) = self.source.close().await {
            warn!(provider = self.source.name(), "failed to close source: {}", e);
        }
        if let Err(e) = self.destination.close().await {
            warn!(
                provider = self.destination.name(),
                "failed to close destination: {}",
                e
            );
        }
    }
}

/// Stage to attribute a fatal abort to, from the phase it happened in.
fn fatal_stage(phase: TransferPhase) -> Stage {
    match phase {
        TransferPhase::Configuration => Stage::Configuration,
        TransferPhase::Entities => Stage::Entities,
        TransferPhase::Links => Stage::Links,
        TransferPhase::Assets => Stage::Assets,
        _ => Stage::Schema,
    }
}

/// Whether both sides support a stage.
fn stage_supported(source: &ProviderMetadata, destination: &ProviderMetadata, stage: Stage) -> bool {
    let (s, d) = (&source.capabilities, &destination.capabilities);
    match stage {
        Stage::Schema => true,
        Stage::Configuration => s.configuration && d.configuration,
        Stage::Entities => s.entities && d.entities,
        Stage::Links => s.links && d.links,
        Stage::Assets => s.assets && d.assets,
    }
}

fn skip_stage(ctx: &mut StageContext<'_>, stage: Stage) {
    ctx.report.record(Diagnostic::info(
        stage,
        format!("skipping {} stage: not supported by both providers", stage),
    ));
}
