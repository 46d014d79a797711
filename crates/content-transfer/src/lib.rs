//! Streaming content transfer engine between content-platform instances.
//!
//! Moves schema-checked entities, relation links, binary assets and
//! configuration from a [`SourceProvider`] to a [`DestinationProvider`],
//! remapping entity ids along the way. Datasets of any size flow through
//! bounded one-record channels, so peak memory stays independent of
//! dataset size.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use content_transfer::config::TransferOptions;
//! use content_transfer::engine::TransferEngine;
//! use content_transfer::provider::{InMemoryDestination, InMemorySource};
//!
//! #[tokio::main]
//! async fn main() -> content_transfer::Result<()> {
//!     let source = Arc::new(InMemorySource::new(semver::Version::new(4, 15, 0)));
//!     let destination = Arc::new(InMemoryDestination::new(semver::Version::new(4, 15, 0)));
//!
//!     let engine = TransferEngine::new(source, destination, TransferOptions::default())?;
//!     let summary = engine.transfer().await?;
//!     println!("{}", summary.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod pipeline;
pub mod provider;
pub mod report;
pub mod strategy;
pub mod stream;

pub use config::{FailurePolicy, TransferOptions};
pub use crate::core::record::{Asset, ConfigEntry, Entity, EntityData, EntityId, Link};
pub use crate::core::schema::{SchemaDescriptor, SchemaKind};
pub use crate::core::traits::{
    DestinationProvider, ProviderCapabilities, ProviderMetadata, SourceProvider,
};
pub use engine::{FailedTransfer, TransferEngine};
pub use error::{Result, TransferError};
pub use mapping::MappingTable;
pub use report::{
    Diagnostic, ProgressTracker, Severity, Stage, TransferPhase, TransferStatus, TransferSummary,
};
pub use strategy::{ConflictStrategy, SchemaStrategy, VersionStrategy};
pub use stream::{ByteStream, RecordStream};
