//! End-to-end engine tests over the in-memory providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use semver::Version;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use content_transfer::config::{FailurePolicy, TransferOptions};
use content_transfer::core::record::{Asset, EntityData, EntityId, Link};
use content_transfer::core::schema::{SchemaDescriptor, SchemaKind};
use content_transfer::core::traits::{
    DestinationProvider, ProviderCapabilities, ProviderMetadata,
};
use content_transfer::engine::TransferEngine;
use content_transfer::error::{Result, TransferError};
use content_transfer::provider::{InMemoryDestination, InMemorySource};
use content_transfer::report::{Severity, TransferStatus};
use content_transfer::strategy::{
    ConflictStrategy, SchemaStrategy, VersionStrategy,
};

fn data(pairs: &[(&str, Value)]) -> EntityData {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn v(major: u64, minor: u64, patch: u64) -> Version {
    Version::new(major, minor, patch)
}

fn article_schema() -> SchemaDescriptor {
    SchemaDescriptor::new("api::article.article", SchemaKind::CollectionType)
        .with_attribute("title", json!({"type": "string"}))
        .with_attribute("author", json!({"type": "relation", "target": "api::author.author"}))
}

fn author_schema() -> SchemaDescriptor {
    SchemaDescriptor::new("api::author.author", SchemaKind::CollectionType)
        .with_attribute("name", json!({"type": "string"}))
}

/// A populated source: two authors, two articles, one link each, one
/// configuration entry and one asset.
fn populated_source() -> InMemorySource {
    InMemorySource::new(v(4, 15, 0))
        .with_schemas(vec![article_schema(), author_schema()])
        .with_entities(
            "api::author.author",
            vec![
                (10, data(&[("name", json!("ada"))])),
                (11, data(&[("name", json!("brian"))])),
            ],
        )
        .with_entities(
            "api::article.article",
            vec![
                (1, data(&[("title", json!("first"))])),
                (2, data(&[("title", json!("second"))])),
            ],
        )
        .with_link(Link::new("api::article.article", 1, "api::author.author", 10, "author"))
        .with_link(Link::new("api::article.article", 2, "api::author.author", 11, "author"))
        .with_configuration("core_store::i18n_locales", json!(["en", "fr"]))
        .with_asset("cover.png", "uploads/cover.png", Bytes::from_static(b"png-bytes"))
}

fn matching_destination() -> InMemoryDestination {
    InMemoryDestination::new(v(4, 15, 0))
        .with_schemas(vec![article_schema(), author_schema()])
}

#[tokio::test]
async fn full_restore_moves_every_stage() {
    let source = Arc::new(populated_source());
    let destination = Arc::new(matching_destination());
    let engine = TransferEngine::new(
        source.clone(),
        destination.clone(),
        TransferOptions::default(),
    )
    .unwrap();

    let summary = engine.transfer().await.unwrap();
    assert_eq!(summary.status, TransferStatus::Completed);
    assert!(!summary.has_errors());
    assert_eq!(summary.stages.schema.created, 2);
    assert_eq!(summary.stages.configuration.created, 1);
    assert_eq!(summary.stages.entities.created, 4);
    assert_eq!(summary.stages.links.created, 2);
    assert_eq!(summary.stages.assets.created, 1);

    assert_eq!(destination.entities().len(), 4);
    assert_eq!(destination.configuration()["core_store::i18n_locales"], json!(["en", "fr"]));
    assert_eq!(destination.assets()[0].2, b"png-bytes");
    assert_eq!(destination.strategy(), Some(ConflictStrategy::Restore));
    assert!(source.is_closed());
    assert!(destination.is_closed());
}

#[tokio::test]
async fn links_are_written_with_destination_ids() {
    let source = Arc::new(populated_source());
    let destination = Arc::new(matching_destination());
    let engine =
        TransferEngine::new(source, destination.clone(), TransferOptions::default()).unwrap();
    engine.transfer().await.unwrap();

    let entity_ids: Vec<EntityId> = destination.entities().iter().map(|e| e.id).collect();
    let links = destination.links();
    assert_eq!(links.len(), 2);
    for link in &links {
        // Both endpoints must be ids the destination itself assigned.
        assert!(entity_ids.contains(&link.from_id), "dangling from_id {}", link.from_id);
        assert!(entity_ids.contains(&link.to_id), "dangling to_id {}", link.to_id);
    }
}

#[tokio::test]
async fn failed_entity_is_isolated_and_its_links_skipped() {
    let source = Arc::new(populated_source());
    let destination = Arc::new(
        matching_destination().fail_entities_where("title", json!("second")),
    );
    let engine = TransferEngine::new(
        source,
        destination.clone(),
        TransferOptions::default(),
    )
    .unwrap();

    let summary = engine.transfer().await.unwrap();
    assert_eq!(summary.status, TransferStatus::Completed);
    assert!(summary.has_errors());
    assert_eq!(summary.stages.entities.created, 3);
    assert_eq!(summary.stages.entities.failed, 1);
    // The link owned by the failed article is skipped, not written dangling.
    assert_eq!(summary.stages.links.created, 1);
    assert_eq!(summary.stages.links.skipped, 1);

    let error_diags: Vec<_> = summary
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert_eq!(error_diags.len(), 1);
    assert_eq!(error_diags[0].entity_type.as_deref(), Some("api::article.article"));
    assert_eq!(error_diags[0].entity_id, Some(2));
}

#[tokio::test]
async fn strict_schema_mismatch_aborts_before_any_write() {
    let source = Arc::new(populated_source());
    // Destination lacks the author type entirely.
    let destination = Arc::new(
        InMemoryDestination::new(v(4, 15, 0)).with_schemas(vec![article_schema()]),
    );
    let engine = TransferEngine::new(
        source.clone(),
        destination.clone(),
        TransferOptions::default(),
    )
    .unwrap();

    let failure = engine.transfer().await.unwrap_err();
    assert!(matches!(failure.error, TransferError::Compatibility(_)));
    assert_eq!(failure.summary.status, TransferStatus::Failed);
    assert!(destination.entities().is_empty());
    assert!(destination.configuration().is_empty());
    assert!(source.is_closed());
    assert!(destination.is_closed());
}

#[tokio::test]
async fn ignore_strategies_allow_divergent_instances() {
    let source = Arc::new(populated_source());
    let destination = Arc::new(InMemoryDestination::new(v(5, 2, 1)));
    let engine = TransferEngine::new(
        source,
        destination.clone(),
        TransferOptions::restore_ignore(),
    )
    .unwrap();

    let summary = engine.transfer().await.unwrap();
    assert_eq!(summary.status, TransferStatus::Completed);
    assert_eq!(summary.stages.entities.created, 4);
    // The version gap is surfaced as an info diagnostic.
    assert!(summary
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Info && d.message.contains("platform versions differ")));
}

#[tokio::test]
async fn strict_version_mismatch_is_fatal() {
    let source = Arc::new(populated_source());
    let destination = Arc::new(InMemoryDestination::new(v(4, 16, 0)));
    let mut options = TransferOptions::default();
    options.schema_strategy = SchemaStrategy::Ignore;
    let engine =
        TransferEngine::new(source, destination.clone(), options).unwrap();

    let failure = engine.transfer().await.unwrap_err();
    assert!(matches!(failure.error, TransferError::Compatibility(_)));
    assert!(destination.entities().is_empty());
}

#[tokio::test]
async fn exact_shape_version_tolerates_patch_difference() {
    let source = Arc::new(populated_source());
    let destination = Arc::new(
        InMemoryDestination::new(v(4, 15, 9))
            .with_schemas(vec![article_schema(), author_schema()]),
    );
    let mut options = TransferOptions::default();
    options.version_strategy = VersionStrategy::ExactShape;
    let engine = TransferEngine::new(source, destination, options).unwrap();
    let summary = engine.transfer().await.unwrap();
    assert_eq!(summary.status, TransferStatus::Completed);
}

#[tokio::test]
async fn restore_clears_previous_content_merge_keeps_it() {
    for (strategy, expected) in [(ConflictStrategy::Restore, 4), (ConflictStrategy::Merge, 5)] {
        let source = Arc::new(populated_source());
        let destination = Arc::new(matching_destination());
        destination.seed_entity("api::article.article", 500, data(&[("title", json!("old"))]));

        let mut options = TransferOptions::default();
        options.conflict_strategy = strategy;
        let engine =
            TransferEngine::new(source, destination.clone(), options).unwrap();
        engine.transfer().await.unwrap();

        assert_eq!(destination.entities().len(), expected, "strategy {}", strategy);
        assert_eq!(destination.strategy(), Some(strategy));
    }
}

#[tokio::test]
async fn missing_capability_skips_stage_without_error() {
    let source = Arc::new(populated_source().with_capabilities(ProviderCapabilities {
        assets: false,
        ..ProviderCapabilities::all()
    }));
    let destination = Arc::new(matching_destination());
    let engine = TransferEngine::new(
        source,
        destination.clone(),
        TransferOptions::default(),
    )
    .unwrap();

    let summary = engine.transfer().await.unwrap();
    assert_eq!(summary.status, TransferStatus::Completed);
    assert!(!summary.has_errors());
    assert_eq!(summary.stages.assets.created, 0);
    assert_eq!(summary.stages.entities.created, 4);
    assert!(destination.assets().is_empty());
    assert!(summary
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Info && d.message.contains("skipping assets stage")));
}

#[tokio::test]
async fn failure_threshold_aborts_transfer() {
    let source = Arc::new(
        InMemorySource::new(v(4, 15, 0)).with_entities(
            "api::a.a",
            (1..=20).map(|i| (i, data(&[("poison", json!(true))]))).collect(),
        ),
    );
    let destination = Arc::new(
        InMemoryDestination::new(v(4, 15, 0)).fail_entities_where("poison", json!(true)),
    );
    let mut options = TransferOptions::restore_ignore();
    options.failure_policy = FailurePolicy::abort_after(5);
    let engine =
        TransferEngine::new(source.clone(), destination.clone(), options).unwrap();

    let failure = engine.transfer().await.unwrap_err();
    assert!(matches!(
        failure.error,
        TransferError::FailureThreshold { count: 5, .. }
    ));
    assert!(source.is_closed());
    assert!(destination.is_closed());

    // The abort still surfaces everything recorded before it: one error
    // diagnostic per failed record plus the abort itself, with counters.
    let summary = &failure.summary;
    assert_eq!(summary.status, TransferStatus::Failed);
    assert_eq!(summary.stages.entities.failed, 5);
    let error_count = summary
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    assert_eq!(error_count, 6);
    assert!(summary
        .diagnostics
        .last()
        .is_some_and(|d| d.message.contains("transfer aborted")));
}

/// Destination that cancels the transfer after it has created two
/// entities, simulating an operator abort mid-stage.
struct CancellingDestination {
    inner: InMemoryDestination,
    token: Mutex<Option<CancellationToken>>,
    created: AtomicUsize,
    cancel_after: usize,
}

impl CancellingDestination {
    fn new(cancel_after: usize) -> Self {
        Self {
            inner: InMemoryDestination::new(v(4, 15, 0)),
            token: Mutex::new(None),
            created: AtomicUsize::new(0),
            cancel_after,
        }
    }

    fn arm(&self, token: CancellationToken) {
        *self.token.lock().unwrap() = Some(token);
    }
}

#[async_trait]
impl DestinationProvider for CancellingDestination {
    fn name(&self) -> &str {
        "cancelling-destination"
    }

    async fn bootstrap(&self, strategy: ConflictStrategy) -> Result<ProviderMetadata> {
        self.inner.bootstrap(strategy).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    async fn schemas(&self) -> Result<Vec<SchemaDescriptor>> {
        self.inner.schemas().await
    }

    async fn create_entity(&self, entity_type: &str, data: &EntityData) -> Result<EntityId> {
        let id = self.inner.create_entity(entity_type, data).await?;
        if self.created.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_after {
            if let Some(token) = self.token.lock().unwrap().as_ref() {
                token.cancel();
            }
        }
        Ok(id)
    }

    async fn create_link(&self, link: &Link) -> Result<()> {
        self.inner.create_link(link).await
    }

    async fn create_asset(&self, asset: Asset) -> Result<()> {
        self.inner.create_asset(asset).await
    }

    async fn set_configuration(&self, key: &str, value: &Value) -> Result<()> {
        self.inner.set_configuration(key, value).await
    }
}

#[tokio::test]
async fn cancellation_mid_stage_keeps_partial_content() {
    let source = Arc::new(populated_source());
    let destination = Arc::new(CancellingDestination::new(2));
    let engine = TransferEngine::new(
        source.clone(),
        destination.clone(),
        TransferOptions::restore_ignore(),
    )
    .unwrap();
    destination.arm(engine.cancellation_token());

    let summary = engine.transfer().await.unwrap();
    assert_eq!(summary.status, TransferStatus::Cancelled);
    assert_eq!(summary.stages.entities.created, 2);
    // Later stages never ran.
    assert_eq!(summary.stages.links.created, 0);
    assert_eq!(summary.stages.assets.created, 0);
    assert!(source.is_closed());
    assert!(destination.inner.is_closed());
}

/// Destination that records how far the asset producer ran ahead of the
/// consumer.
struct WatermarkDestination {
    produced: Arc<AtomicUsize>,
    consumed: AtomicUsize,
    max_lead: AtomicUsize,
}

#[async_trait]
impl DestinationProvider for WatermarkDestination {
    fn name(&self) -> &str {
        "watermark-destination"
    }

    async fn bootstrap(&self, _strategy: ConflictStrategy) -> Result<ProviderMetadata> {
        Ok(ProviderMetadata {
            platform_version: v(4, 15, 0),
            capabilities: ProviderCapabilities::all(),
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn schemas(&self) -> Result<Vec<SchemaDescriptor>> {
        Ok(vec![])
    }

    async fn create_entity(&self, _entity_type: &str, _data: &EntityData) -> Result<EntityId> {
        Ok(1)
    }

    async fn create_link(&self, _link: &Link) -> Result<()> {
        Ok(())
    }

    async fn create_asset(&self, asset: Asset) -> Result<()> {
        asset.content.collect().await?;
        // Give the producer every chance to run ahead before sampling.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let consumed = self.consumed.load(Ordering::SeqCst);
        let lead = self
            .produced
            .load(Ordering::SeqCst)
            .saturating_sub(consumed);
        self.max_lead.fetch_max(lead, Ordering::SeqCst);
        self.consumed.store(consumed + 1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_configuration(&self, _key: &str, _value: &Value) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn asset_producer_never_runs_far_ahead_of_consumer() {
    let mut source = InMemorySource::new(v(4, 15, 0));
    for i in 0..30 {
        source = source.with_asset(
            &format!("a{}.bin", i),
            &format!("uploads/a{}.bin", i),
            Bytes::from(vec![0u8; 128]),
        );
    }
    let produced = source.assets_streamed();
    let destination = Arc::new(WatermarkDestination {
        produced,
        consumed: AtomicUsize::new(0),
        max_lead: AtomicUsize::new(0),
    });

    let engine = TransferEngine::new(
        Arc::new(source),
        destination.clone(),
        TransferOptions::restore_ignore(),
    )
    .unwrap();
    let summary = engine.transfer().await.unwrap();
    assert_eq!(summary.stages.assets.created, 30);

    // One asset held by the consumer, one buffered in the channel, one
    // the producer is blocked sending. Never the whole backlog.
    assert!(
        destination.max_lead.load(Ordering::SeqCst) <= 3,
        "producer ran {} assets ahead",
        destination.max_lead.load(Ordering::SeqCst)
    );
}
