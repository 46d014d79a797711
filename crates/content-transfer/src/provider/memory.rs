//! In-memory reference providers.
//!
//! These implement the full provider contract against plain in-process
//! collections. They back the engine's test suite and serve as the
//! reference implementation for provider authors; real archive, session
//! or database providers live outside this crate.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use semver::Version;
use serde_json::Value;

use crate::core::record::{Asset, ConfigEntry, Entity, EntityData, EntityId, Link};
use crate::core::schema::SchemaDescriptor;
use crate::core::traits::{
    DestinationProvider, ProviderCapabilities, ProviderMetadata, SourceProvider,
};
use crate::error::{Result, TransferError};
use crate::strategy::ConflictStrategy;
use crate::stream::{ByteStream, RecordStream, STAGE_BUFFER};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// First id handed out by [`InMemoryDestination`], deliberately far from
/// typical source ids so mixed-up id spaces show in tests.
const FIRST_DESTINATION_ID: i64 = 1000;

#[derive(Debug, Clone)]
struct StoredAsset {
    filename: String,
    filepath: String,
    bytes: Bytes,
}

/// In-memory source provider.
///
/// Content is assembled with the builder methods; streams replay it in
/// insertion order through bounded channels, so consumers observe the
/// same flow contract a file- or network-backed provider would give.
pub struct InMemorySource {
    platform_version: Version,
    capabilities: ProviderCapabilities,
    schemas: Vec<SchemaDescriptor>,
    entity_sets: Vec<(String, Vec<Entity>)>,
    links: Vec<Link>,
    configuration: Vec<ConfigEntry>,
    assets: Vec<StoredAsset>,
    chunk_size: usize,
    fail_bootstrap: bool,
    bootstrapped: AtomicBool,
    closed: AtomicBool,
    assets_streamed: Arc<AtomicUsize>,
}

impl InMemorySource {
    /// Create an empty source reporting the given platform version.
    pub fn new(platform_version: Version) -> Self {
        Self {
            platform_version,
            capabilities: ProviderCapabilities::all(),
            schemas: Vec::new(),
            entity_sets: Vec::new(),
            links: Vec::new(),
            configuration: Vec::new(),
            assets: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            fail_bootstrap: false,
            bootstrapped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            assets_streamed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Override the reported capabilities.
    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Add schema descriptors.
    pub fn with_schemas(mut self, schemas: Vec<SchemaDescriptor>) -> Self {
        self.schemas.extend(schemas);
        self
    }

    /// Add entities of one type, preserving enumeration order.
    pub fn with_entities(mut self, entity_type: &str, entities: Vec<(EntityId, EntityData)>) -> Self {
        let records = entities
            .into_iter()
            .map(|(id, data)| Entity::new(entity_type, id, data))
            .collect();
        self.entity_sets.push((entity_type.to_string(), records));
        self
    }

    /// Add one relation link.
    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Add one configuration entry.
    pub fn with_configuration(mut self, key: &str, value: Value) -> Self {
        self.configuration.push(ConfigEntry::new(key, value));
        self
    }

    /// Add one asset with in-memory content.
    pub fn with_asset(mut self, filename: &str, filepath: &str, bytes: Bytes) -> Self {
        self.assets.push(StoredAsset {
            filename: filename.to_string(),
            filepath: filepath.to_string(),
            bytes,
        });
        self
    }

    /// Chunk size for asset content streams.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Make `bootstrap` fail, for fatal-configuration tests.
    pub fn with_failing_bootstrap(mut self) -> Self {
        self.fail_bootstrap = true;
        self
    }

    /// Counter of assets handed to the pipeline so far.
    ///
    /// Lets tests assert the producer never runs ahead of the consumer
    /// by more than the channel bound.
    pub fn assets_streamed(&self) -> Arc<AtomicUsize> {
        self.assets_streamed.clone()
    }

    /// Whether `bootstrap` has been called.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn chunked(&self, bytes: &Bytes) -> ByteStream {
        let mut chunks = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let end = (offset + self.chunk_size).min(bytes.len());
            chunks.push(bytes.slice(offset..end));
            offset = end;
        }
        RecordStream::from_items(chunks)
    }
}

#[async_trait]
impl SourceProvider for InMemorySource {
    fn name(&self) -> &str {
        "memory-source"
    }

    async fn bootstrap(&self) -> Result<ProviderMetadata> {
        if self.fail_bootstrap {
            return Err(TransferError::provider(
                "bootstrap",
                "simulated bootstrap failure",
            ));
        }
        self.bootstrapped.store(true, Ordering::SeqCst);
        Ok(ProviderMetadata {
            platform_version: self.platform_version.clone(),
            capabilities: self.capabilities,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn schemas(&self) -> Result<Vec<SchemaDescriptor>> {
        Ok(self.schemas.clone())
    }

    async fn entity_types(&self) -> Result<Vec<String>> {
        Ok(self.entity_sets.iter().map(|(t, _)| t.clone()).collect())
    }

    async fn stream_entities(&self, entity_type: &str) -> Result<RecordStream<Entity>> {
        let entities = self
            .entity_sets
            .iter()
            .find(|(t, _)| t == entity_type)
            .map(|(_, records)| records.clone())
            .unwrap_or_default();
        Ok(RecordStream::from_items(entities))
    }

    async fn stream_links(&self) -> Result<RecordStream<Link>> {
        Ok(RecordStream::from_items(self.links.clone()))
    }

    async fn stream_assets(&self) -> Result<RecordStream<Asset>> {
        let assets: Vec<Asset> = self
            .assets
            .iter()
            .map(|stored| {
                Asset::new(
                    stored.filename.clone(),
                    stored.filepath.clone(),
                    stored.bytes.len() as u64,
                    self.chunked(&stored.bytes),
                )
            })
            .collect();

        let counter = self.assets_streamed.clone();
        let (tx, stream) = RecordStream::channel(STAGE_BUFFER);
        tokio::spawn(async move {
            for asset in assets {
                counter.fetch_add(1, Ordering::SeqCst);
                if tx.send(Ok(asset)).await.is_err() {
                    break;
                }
            }
        });
        Ok(stream)
    }

    async fn stream_configuration(&self) -> Result<RecordStream<ConfigEntry>> {
        Ok(RecordStream::from_items(self.configuration.clone()))
    }
}

#[derive(Debug, Default)]
struct DestinationState {
    entities: Vec<Entity>,
    links: Vec<Link>,
    assets: Vec<(String, String, Vec<u8>)>,
    configuration: BTreeMap<String, Value>,
    strategy: Option<ConflictStrategy>,
}

/// In-memory destination provider.
///
/// Assigns destination ids from its own counter, honors the restore
/// strategy by clearing seeded content at bootstrap, and supports
/// targeted failure injection for partial-failure tests.
pub struct InMemoryDestination {
    platform_version: Version,
    capabilities: ProviderCapabilities,
    schemas: Vec<SchemaDescriptor>,
    next_id: AtomicI64,
    state: Mutex<DestinationState>,
    fail_entities_where: Option<(String, Value)>,
    fail_config_keys: HashSet<String>,
    fail_asset_names: HashSet<String>,
    bootstrapped: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryDestination {
    /// Create an empty destination reporting the given platform version.
    pub fn new(platform_version: Version) -> Self {
        Self {
            platform_version,
            capabilities: ProviderCapabilities::all(),
            schemas: Vec::new(),
            next_id: AtomicI64::new(FIRST_DESTINATION_ID),
            state: Mutex::new(DestinationState::default()),
            fail_entities_where: None,
            fail_config_keys: HashSet::new(),
            fail_asset_names: HashSet::new(),
            bootstrapped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Override the reported capabilities.
    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Add schema descriptors.
    pub fn with_schemas(mut self, schemas: Vec<SchemaDescriptor>) -> Self {
        self.schemas.extend(schemas);
        self
    }

    /// Fail `create_entity` for any record whose `field` equals `value`.
    pub fn fail_entities_where(mut self, field: &str, value: Value) -> Self {
        self.fail_entities_where = Some((field.to_string(), value));
        self
    }

    /// Fail `set_configuration` for the given key.
    pub fn fail_configuration_key(mut self, key: &str) -> Self {
        self.fail_config_keys.insert(key.to_string());
        self
    }

    /// Fail `create_asset` for the given filename.
    pub fn fail_asset(mut self, filename: &str) -> Self {
        self.fail_asset_names.insert(filename.to_string());
        self
    }

    /// Pre-populate an entity, as if written by an earlier transfer.
    /// Cleared again by a `restore` bootstrap, kept by `merge`.
    pub fn seed_entity(&self, entity_type: &str, id: EntityId, data: EntityData) {
        self.lock().entities.push(Entity::new(entity_type, id, data));
    }

    /// Created entities, in creation order.
    pub fn entities(&self) -> Vec<Entity> {
        self.lock().entities.clone()
    }

    /// Created links, in creation order.
    pub fn links(&self) -> Vec<Link> {
        self.lock().links.clone()
    }

    /// Stored assets as `(filename, filepath, bytes)`.
    pub fn assets(&self) -> Vec<(String, String, Vec<u8>)> {
        self.lock().assets.clone()
    }

    /// Written configuration.
    pub fn configuration(&self) -> BTreeMap<String, Value> {
        self.lock().configuration.clone()
    }

    /// Conflict strategy received at bootstrap, if any.
    pub fn strategy(&self) -> Option<ConflictStrategy> {
        self.lock().strategy
    }

    /// Whether `bootstrap` has been called.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DestinationState> {
        self.state.lock().expect("destination state lock poisoned")
    }
}

#[async_trait]
impl DestinationProvider for InMemoryDestination {
    fn name(&self) -> &str {
        "memory-destination"
    }

    async fn bootstrap(&self, strategy: ConflictStrategy) -> Result<ProviderMetadata> {
        {
            let mut state = self.lock();
            state.strategy = Some(strategy);
            if strategy == ConflictStrategy::Restore {
                // The destructive half of restore belongs to the
                // destination, not the engine.
                state.entities.clear();
                state.links.clear();
                state.assets.clear();
                state.configuration.clear();
            }
        }
        self.bootstrapped.store(true, Ordering::SeqCst);
        Ok(ProviderMetadata {
            platform_version: self.platform_version.clone(),
            capabilities: self.capabilities,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn schemas(&self) -> Result<Vec<SchemaDescriptor>> {
        Ok(self.schemas.clone())
    }

    async fn create_entity(&self, entity_type: &str, data: &EntityData) -> Result<EntityId> {
        if let Some((field, value)) = &self.fail_entities_where {
            if data.get(field) == Some(value) {
                return Err(TransferError::provider(
                    "entities",
                    format!("rejected record with {} = {}", field, value),
                ));
            }
        }

        let new_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .entities
            .push(Entity::new(entity_type, new_id, data.clone()));
        Ok(new_id)
    }

    async fn create_link(&self, link: &Link) -> Result<()> {
        self.lock().links.push(link.clone());
        Ok(())
    }

    async fn create_asset(&self, asset: Asset) -> Result<()> {
        // Drain the content stream before anything else; the pipeline's
        // memory bound depends on it.
        let chunks = asset.content.collect().await?;
        let mut bytes = Vec::with_capacity(asset.size_bytes as usize);
        for chunk in chunks {
            bytes.extend_from_slice(&chunk);
        }

        if self.fail_asset_names.contains(&asset.filename) {
            return Err(TransferError::provider(
                "assets",
                format!("rejected asset '{}'", asset.filename),
            ));
        }

        self.lock()
            .assets
            .push((asset.filename, asset.filepath, bytes));
        Ok(())
    }

    async fn set_configuration(&self, key: &str, value: &Value) -> Result<()> {
        if self.fail_config_keys.contains(key) {
            return Err(TransferError::provider(
                "configuration",
                format!("rejected configuration key '{}'", key),
            ));
        }
        self.lock().configuration.insert(key.to_string(), value.clone());
        Ok(())
    }
}
