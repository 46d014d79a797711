//! Provider contract for transfer sources and destinations.
//!
//! A provider is the abstraction over a concrete content location: a
//! local archive file, a remote session, or a live database behind a
//! persistence layer. The engine never talks to any of those directly;
//! it only sequences providers through bootstrap, the stage pipelines,
//! and close.
//!
//! # Streaming
//!
//! All high-volume reads return a [`RecordStream`], backed by a bounded
//! channel, so transfers of arbitrarily large datasets keep memory
//! bounded to the current record.

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::record::{Asset, ConfigEntry, Entity, EntityData, EntityId, Link};
use crate::core::schema::SchemaDescriptor;
use crate::error::Result;
use crate::strategy::ConflictStrategy;
use crate::stream::RecordStream;

/// Which transfer stages a provider supports.
///
/// Capabilities are declared once at bootstrap, not probed per call. The
/// engine skips the stage (with an info diagnostic) for any capability a
/// provider reports as absent; a missing capability is never a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub entities: bool,
    pub assets: bool,
    pub links: bool,
    pub configuration: bool,
}

impl ProviderCapabilities {
    /// Every stage supported.
    pub fn all() -> Self {
        Self {
            entities: true,
            assets: true,
            links: true,
            configuration: true,
        }
    }

    /// No stage supported.
    pub fn none() -> Self {
        Self {
            entities: false,
            assets: false,
            links: false,
            configuration: false,
        }
    }
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// Metadata a provider reports once its resources are open.
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    /// Platform semantic version of the instance behind this provider.
    pub platform_version: Version,

    /// Stages this provider can serve.
    pub capabilities: ProviderCapabilities,
}

/// Read side of a transfer.
///
/// Sequences are lazy, finite and non-restartable; the engine pulls each
/// stream exactly once, in stage order.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Short provider name for logs and error context.
    fn name(&self) -> &str;

    /// Open backing resources (archive handle, session, connection).
    async fn bootstrap(&self) -> Result<ProviderMetadata>;

    /// Release backing resources. Invoked on every exit path, including
    /// cancellation and error.
    async fn close(&self) -> Result<()>;

    /// Sanitized schema descriptors for compatibility comparison.
    async fn schemas(&self) -> Result<Vec<SchemaDescriptor>>;

    /// Entity types in source-enumeration order.
    async fn entity_types(&self) -> Result<Vec<String>>;

    /// Stream all entities of one type.
    async fn stream_entities(&self, entity_type: &str) -> Result<RecordStream<Entity>>;

    /// Stream all relation links.
    async fn stream_links(&self) -> Result<RecordStream<Link>>;

    /// Stream all binary assets, one at a time, each with its own lazy
    /// content stream.
    async fn stream_assets(&self) -> Result<RecordStream<Asset>>;

    /// Stream configuration key/value pairs.
    async fn stream_configuration(&self) -> Result<RecordStream<ConfigEntry>>;
}

/// Write side of a transfer.
///
/// Consumers accept one record at a time and either commit it or report
/// a per-record failure; the stage pipeline turns those failures into
/// diagnostics.
#[async_trait]
pub trait DestinationProvider: Send + Sync {
    /// Short provider name for logs and error context.
    fn name(&self) -> &str;

    /// Open backing resources and apply the conflict strategy.
    ///
    /// Under [`ConflictStrategy::Restore`] the provider itself performs
    /// the destructive preparation (clearing transferred content); the
    /// engine only selects the token.
    async fn bootstrap(&self, strategy: ConflictStrategy) -> Result<ProviderMetadata>;

    /// Release backing resources. Invoked on every exit path, including
    /// cancellation and error.
    async fn close(&self) -> Result<()>;

    /// Sanitized schema descriptors for compatibility comparison.
    async fn schemas(&self) -> Result<Vec<SchemaDescriptor>>;

    /// Create one entity; returns the destination-assigned id.
    async fn create_entity(&self, entity_type: &str, data: &EntityData) -> Result<EntityId>;

    /// Create one relation link. Called only with both endpoints already
    /// remapped to destination ids.
    async fn create_link(&self, link: &Link) -> Result<()>;

    /// Store one asset, fully consuming its content stream before
    /// returning.
    async fn create_asset(&self, asset: Asset) -> Result<()>;

    /// Write one configuration value.
    async fn set_configuration(&self, key: &str, value: &Value) -> Result<()>;
}
