//! Core data model and provider abstractions.

pub mod record;
pub mod schema;
pub mod traits;

pub use record::{Asset, ConfigEntry, Entity, EntityData, EntityId, Link};
pub use schema::{SchemaDescriptor, SchemaKind};
pub use traits::{DestinationProvider, ProviderCapabilities, ProviderMetadata, SourceProvider};
