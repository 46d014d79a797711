//! The five stage runners, in their fixed execution order: schema,
//! configuration, entities, links, assets.
//!
//! Per-record write failures become error diagnostics and the stage moves
//! on; only compatibility violations, broken source streams, mapping
//! conflicts and an exceeded failure threshold propagate as fatal errors.
//! Cancellation is checked before every pull and ends the stage cleanly
//! with whatever was already written.

use tracing::debug;

use crate::core::traits::SourceProvider;
use crate::error::Result;
use crate::pipeline::StageContext;
use crate::report::{Diagnostic, Stage};
use crate::strategy::{check_schema_compatibility, SchemaStrategy};

/// Compare source and destination schemas under the configured strategy.
///
/// Nothing is written; the destination owns its schema. Any reported
/// difference is fatal, so this stage gates every destructive stage
/// behind it.
pub async fn run_schema_stage(
    source: &dyn SourceProvider,
    strategy: SchemaStrategy,
    ctx: &mut StageContext<'_>,
) -> Result<()> {
    let source_schemas = source.schemas().await?;
    let destination_schemas = ctx.destination.schemas().await?;
    debug!(
        source = source_schemas.len(),
        destination = destination_schemas.len(),
        %strategy,
        "comparing schemas"
    );

    check_schema_compatibility(strategy, &source_schemas, &destination_schemas)?;

    for _ in &source_schemas {
        ctx.created(Stage::Schema);
    }
    ctx.report.record(Diagnostic::info(
        Stage::Schema,
        format!(
            "{} schema descriptor(s) verified under '{}' strategy",
            source_schemas.len(),
            strategy
        ),
    ));
    Ok(())
}

/// Copy configuration key/value pairs.
pub async fn run_configuration_stage(
    source: &dyn SourceProvider,
    ctx: &mut StageContext<'_>,
) -> Result<()> {
    let mut stream = source.stream_configuration().await?;
    let mut guard = ctx.failure_guard(Stage::Configuration);

    loop {
        if ctx.cancel.is_cancelled() {
            return Ok(());
        }
        let Some(item) = stream.next().await else {
            return Ok(());
        };
        let entry = item?;

        match ctx.destination.set_configuration(&entry.key, &entry.value).await {
            Ok(()) => {
                ctx.created(Stage::Configuration);
                guard.record_success();
            }
            Err(e) => {
                ctx.failed(Stage::Configuration);
                ctx.report.record(
                    Diagnostic::error(
                        Stage::Configuration,
                        format!("failed to write configuration key '{}'", entry.key),
                    )
                    .with_cause(e.to_string()),
                );
                guard.record_failure()?;
            }
        }
    }
}

/// Copy all entities, type by type, registering each created record's id
/// translation in the mapping table.
pub async fn run_entities_stage(
    source: &dyn SourceProvider,
    ctx: &mut StageContext<'_>,
) -> Result<()> {
    for entity_type in source.entity_types().await? {
        if ctx.cancel.is_cancelled() {
            return Ok(());
        }

        let mut stream = source.stream_entities(&entity_type).await?;
        let mut guard = ctx.failure_guard(Stage::Entities);

        loop {
            if ctx.cancel.is_cancelled() {
                return Ok(());
            }
            let Some(item) = stream.next().await else {
                break;
            };
            let entity = item?;

            match ctx.destination.create_entity(&entity.entity_type, &entity.data).await {
                Ok(new_id) => {
                    // A mapping conflict here means the same source id was
                    // created twice; that is never recoverable.
                    ctx.mapping.register(&entity.entity_type, entity.id, new_id)?;
                    ctx.created(Stage::Entities);
                    guard.record_success();
                }
                Err(e) => {
                    ctx.failed(Stage::Entities);
                    ctx.report.record(
                        Diagnostic::error(Stage::Entities, "failed to create entity")
                            .with_entity(&entity.entity_type, entity.id)
                            .with_cause(e.to_string()),
                    );
                    guard.record_failure()?;
                }
            }
        }
        debug!(
            entity_type = %entity_type,
            mapped = ctx.mapping.count_for(&entity_type),
            "entity type transferred"
        );
    }
    Ok(())
}

/// Copy relation links, translating both endpoints through the mapping
/// table.
///
/// A link whose endpoint was never mapped (its entity failed or was never
/// transferred) is skipped with a warning rather than written dangling.
pub async fn run_links_stage(
    source: &dyn SourceProvider,
    ctx: &mut StageContext<'_>,
) -> Result<()> {
    let mut stream = source.stream_links().await?;
    let mut guard = ctx.failure_guard(Stage::Links);

    loop {
        if ctx.cancel.is_cancelled() {
            return Ok(());
        }
        let Some(item) = stream.next().await else {
            return Ok(());
        };
        let link = item?;

        let from = ctx.mapping.resolve(&link.from_type, link.from_id);
        let to = ctx.mapping.resolve(&link.to_type, link.to_id);
        let (Some(from), Some(to)) = (from, to) else {
            let (missing_type, missing_id) = if from.is_none() {
                (&link.from_type, link.from_id)
            } else {
                (&link.to_type, link.to_id)
            };
            ctx.skipped(Stage::Links);
            ctx.report.record(
                Diagnostic::warning(
                    Stage::Links,
                    format!("skipping link '{}': endpoint was not transferred", link.field),
                )
                .with_entity(missing_type, missing_id),
            );
            continue;
        };

        match ctx.destination.create_link(&link.remapped(from, to)).await {
            Ok(()) => {
                ctx.created(Stage::Links);
                guard.record_success();
            }
            Err(e) => {
                ctx.failed(Stage::Links);
                ctx.report.record(
                    Diagnostic::error(
                        Stage::Links,
                        format!("failed to create link '{}'", link.field),
                    )
                    .with_entity(&link.from_type, link.from_id)
                    .with_cause(e.to_string()),
                );
                guard.record_failure()?;
            }
        }
    }
}

/// Copy binary assets, one fully streamed asset at a time.
pub async fn run_assets_stage(
    source: &dyn SourceProvider,
    ctx: &mut StageContext<'_>,
) -> Result<()> {
    let mut stream = source.stream_assets().await?;
    let mut guard = ctx.failure_guard(Stage::Assets);

    loop {
        if ctx.cancel.is_cancelled() {
            return Ok(());
        }
        let Some(item) = stream.next().await else {
            return Ok(());
        };
        let asset = item?;
        let filename = asset.filename.clone();
        let size_bytes = asset.size_bytes;

        match ctx.destination.create_asset(asset).await {
            Ok(()) => {
                ctx.created(Stage::Assets);
                ctx.progress.add_bytes(size_bytes);
                guard.record_success();
            }
            Err(e) => {
                ctx.failed(Stage::Assets);
                ctx.report.record(
                    Diagnostic::error(
                        Stage::Assets,
                        format!("failed to store asset '{}'", filename),
                    )
                    .with_cause(e.to_string()),
                );
                guard.record_failure()?;
            }
        }
    }
}
