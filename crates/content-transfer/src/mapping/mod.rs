//! Per-transfer id mapping between source and destination.
//!
//! Every created entity registers its `(type, old_id) -> new_id`
//! translation here; later stages resolve foreign references through it.
//! One table exists per running transfer, owned exclusively by the
//! engine, and is never reused across transfers.

use std::collections::HashMap;

use crate::core::record::EntityId;
use crate::error::{Result, TransferError};

/// Bidirectional old-id to new-id registry, keyed by entity type.
///
/// `resolve` is O(1) amortized and performs no I/O; it is called once per
/// foreign-reference field per entity and dominates link-heavy transfers.
#[derive(Debug, Default)]
pub struct MappingTable {
    entries: HashMap<String, HashMap<EntityId, EntityId>>,
}

impl MappingTable {
    /// Create an empty mapping table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a translation for one entity.
    ///
    /// Idempotent: re-registering the identical pair is a no-op.
    /// Re-registering the same `old_id` with a different `new_id` is a
    /// programming-invariant violation and fails loudly.
    pub fn register(
        &mut self,
        entity_type: &str,
        old_id: EntityId,
        new_id: EntityId,
    ) -> Result<()> {
        let per_type = self.entries.entry(entity_type.to_string()).or_default();
        match per_type.insert(old_id, new_id) {
            None => Ok(()),
            Some(existing) if existing == new_id => Ok(()),
            Some(existing) => {
                // Restore the original entry before failing.
                per_type.insert(old_id, existing);
                Err(TransferError::MappingConflict {
                    entity_type: entity_type.to_string(),
                    old_id,
                    existing,
                    attempted: new_id,
                })
            }
        }
    }

    /// Look up the destination id for a source id.
    pub fn resolve(&self, entity_type: &str, old_id: EntityId) -> Option<EntityId> {
        self.entries.get(entity_type)?.get(&old_id).copied()
    }

    /// Number of registered translations across all types.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    /// Whether the table holds no translations.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(HashMap::is_empty)
    }

    /// Number of translations registered for one type.
    pub fn count_for(&self, entity_type: &str) -> usize {
        self.entries.get(entity_type).map_or(0, HashMap::len)
    }
}
