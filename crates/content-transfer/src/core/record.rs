//! Record types flowing through the transfer pipeline.
//!
//! These types are the provider-agnostic representation of everything a
//! transfer moves: entities, relation links, binary assets and
//! configuration key/value pairs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stream::ByteStream;

/// Identifier assigned to an entity by the platform that owns it.
///
/// Source and destination instances have independent id spaces; the
/// [`MappingTable`](crate::mapping::MappingTable) translates between them.
pub type EntityId = i64;

/// Field map of a single content record.
pub type EntityData = serde_json::Map<String, Value>;

/// One content record of a given type.
///
/// Entities are immutable once read from the source; the destination
/// assigns a new id on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Content-type uid this record belongs to (e.g. `api::article.article`).
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Source-assigned id.
    pub id: EntityId,

    /// Field values; may contain foreign references to other entity ids.
    pub data: EntityData,
}

impl Entity {
    /// Create a new entity record.
    pub fn new(entity_type: impl Into<String>, id: EntityId, data: EntityData) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
            data,
        }
    }
}

/// A typed relation edge between two entities.
///
/// Links carry *source* ids; both endpoints are remapped through the
/// mapping table before the destination ever sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Content-type uid of the owning side.
    pub from_type: String,

    /// Owning entity id.
    pub from_id: EntityId,

    /// Content-type uid of the target side.
    pub to_type: String,

    /// Target entity id.
    pub to_id: EntityId,

    /// Attribute on the owning type that holds the relation.
    pub field: String,
}

impl Link {
    /// Create a new link.
    pub fn new(
        from_type: impl Into<String>,
        from_id: EntityId,
        to_type: impl Into<String>,
        to_id: EntityId,
        field: impl Into<String>,
    ) -> Self {
        Self {
            from_type: from_type.into(),
            from_id,
            to_type: to_type.into(),
            to_id,
            field: field.into(),
        }
    }

    /// Copy of this link with both endpoints replaced by destination ids.
    pub fn remapped(&self, from_id: EntityId, to_id: EntityId) -> Link {
        Link {
            from_type: self.from_type.clone(),
            from_id,
            to_type: self.to_type.clone(),
            to_id,
            field: self.field.clone(),
        }
    }
}

/// A binary asset with lazily streamed content.
///
/// The content stream must be fully consumed (or dropped) before the
/// pipeline requests the next asset, so peak memory stays bounded by one
/// asset regardless of dataset size.
#[derive(Debug)]
pub struct Asset {
    /// Original file name.
    pub filename: String,

    /// Source-relative path.
    pub filepath: String,

    /// Total content size in bytes.
    pub size_bytes: u64,

    /// Lazily produced content chunks.
    pub content: ByteStream,
}

impl Asset {
    /// Create a new asset record.
    pub fn new(
        filename: impl Into<String>,
        filepath: impl Into<String>,
        size_bytes: u64,
        content: ByteStream,
    ) -> Self {
        Self {
            filename: filename.into(),
            filepath: filepath.into(),
            size_bytes,
            content,
        }
    }
}

/// One configuration key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Configuration key (e.g. `core_store::plugin_i18n_locales`).
    pub key: String,

    /// Arbitrary JSON value.
    pub value: Value,
}

impl ConfigEntry {
    /// Create a new configuration entry.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}
