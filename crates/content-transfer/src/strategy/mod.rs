//! Pluggable compatibility and conflict policies.
//!
//! The engine consults this module exactly once, before any destructive
//! stage runs; no other place decides whether a source and destination
//! are allowed to exchange content.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::schema::SchemaDescriptor;
use crate::error::{Result, TransferError};

/// How strictly source and destination schemas must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaStrategy {
    /// Sanitized descriptors must match byte-for-byte (canonical JSON).
    #[default]
    Strict,
    /// Structural match: same types, same attribute names and attribute
    /// types; cosmetic metadata ignored.
    ExactShape,
    /// Skip the check entirely. For restores into a freshly provisioned
    /// destination that is expected to diverge.
    Ignore,
}

/// How strictly platform versions must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionStrategy {
    /// Exact semver equality.
    #[default]
    Strict,
    /// Major and minor must match; patch level is ignored.
    ExactShape,
    /// Skip the check entirely.
    Ignore,
}

/// What happens to content already present in the destination.
///
/// The destination provider executes the physical effect (e.g. truncation
/// under `Restore`); the engine only selects which token to pass down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Clear all destination content for transferred types before writing.
    #[default]
    Restore,
    /// Write alongside existing destination content.
    Merge,
}

impl fmt::Display for SchemaStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaStrategy::Strict => write!(f, "strict"),
            SchemaStrategy::ExactShape => write!(f, "exact-shape"),
            SchemaStrategy::Ignore => write!(f, "ignore"),
        }
    }
}

impl fmt::Display for VersionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionStrategy::Strict => write!(f, "strict"),
            VersionStrategy::ExactShape => write!(f, "exact-shape"),
            VersionStrategy::Ignore => write!(f, "ignore"),
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictStrategy::Restore => write!(f, "restore"),
            ConflictStrategy::Merge => write!(f, "merge"),
        }
    }
}

/// One schema difference found during comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDiff {
    /// Schema uid the difference belongs to.
    pub uid: String,
    /// Human-readable description of the difference.
    pub detail: String,
}

impl SchemaDiff {
    fn new(uid: &str, detail: impl Into<String>) -> Self {
        Self {
            uid: uid.to_string(),
            detail: detail.into(),
        }
    }
}

/// Check platform version compatibility.
pub fn check_version_compatibility(
    strategy: VersionStrategy,
    source: &Version,
    destination: &Version,
) -> Result<()> {
    let compatible = match strategy {
        VersionStrategy::Ignore => true,
        VersionStrategy::Strict => source == destination,
        VersionStrategy::ExactShape => {
            source.major == destination.major && source.minor == destination.minor
        }
    };

    if compatible {
        Ok(())
    } else {
        Err(TransferError::Compatibility(format!(
            "platform version mismatch under '{}' strategy: source {} vs destination {}",
            strategy, source, destination
        )))
    }
}

/// Check schema compatibility between source and destination descriptors.
///
/// Under [`SchemaStrategy::Ignore`] this always succeeds. Otherwise any
/// difference reported by [`diff_schemas`] aborts the transfer.
pub fn check_schema_compatibility(
    strategy: SchemaStrategy,
    source: &[SchemaDescriptor],
    destination: &[SchemaDescriptor],
) -> Result<()> {
    if strategy == SchemaStrategy::Ignore {
        return Ok(());
    }

    let diffs = diff_schemas(strategy, source, destination);
    if diffs.is_empty() {
        return Ok(());
    }

    let mut detail: Vec<String> = diffs
        .iter()
        .take(5)
        .map(|d| format!("{}: {}", d.uid, d.detail))
        .collect();
    if diffs.len() > 5 {
        detail.push(format!("... and {} more", diffs.len() - 5));
    }

    Err(TransferError::Compatibility(format!(
        "schema mismatch under '{}' strategy ({} difference(s)): {}",
        strategy,
        diffs.len(),
        detail.join("; ")
    )))
}

/// Compute schema differences without deciding fatality.
///
/// Destination-only types are a difference under `Strict` (byte-for-byte
/// symmetry) but tolerated under `ExactShape`, where the destination may
/// carry extra plugin types the source never transfers.
pub fn diff_schemas(
    strategy: SchemaStrategy,
    source: &[SchemaDescriptor],
    destination: &[SchemaDescriptor],
) -> Vec<SchemaDiff> {
    let source_by_uid: BTreeMap<&str, SchemaDescriptor> = source
        .iter()
        .map(|d| (d.uid.as_str(), d.sanitized()))
        .collect();
    let dest_by_uid: BTreeMap<&str, SchemaDescriptor> = destination
        .iter()
        .map(|d| (d.uid.as_str(), d.sanitized()))
        .collect();

    let mut diffs = Vec::new();
    // One visited set for the whole run: a component compared through
    // recursion is not compared again at its own top-level entry.
    let mut visited = HashSet::new();

    for (uid, src) in &source_by_uid {
        let Some(dst) = dest_by_uid.get(uid) else {
            diffs.push(SchemaDiff::new(uid, "missing in destination"));
            continue;
        };

        match strategy {
            SchemaStrategy::Strict => {
                let same = match (src.canonical_json(), dst.canonical_json()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                };
                if !same {
                    diffs.push(SchemaDiff::new(uid, "descriptors differ"));
                }
            }
            SchemaStrategy::ExactShape => {
                compare_shape(uid, src, dst, &source_by_uid, &dest_by_uid, &mut visited, &mut diffs);
            }
            SchemaStrategy::Ignore => {}
        }
    }

    if strategy == SchemaStrategy::Strict {
        for uid in dest_by_uid.keys() {
            if !source_by_uid.contains_key(uid) {
                diffs.push(SchemaDiff::new(uid, "missing in source"));
            }
        }
    }

    diffs
}

/// Structural comparison of one descriptor pair.
///
/// Component attributes recurse into the referenced component descriptors.
/// The visited set breaks cycles (component A embedding component B
/// embedding component A), so comparison always terminates.
#[allow(clippy::too_many_arguments)]
fn compare_shape(
    uid: &str,
    src: &SchemaDescriptor,
    dst: &SchemaDescriptor,
    source_by_uid: &BTreeMap<&str, SchemaDescriptor>,
    dest_by_uid: &BTreeMap<&str, SchemaDescriptor>,
    visited: &mut HashSet<String>,
    diffs: &mut Vec<SchemaDiff>,
) {
    if !visited.insert(uid.to_string()) {
        return;
    }

    if src.kind != dst.kind {
        diffs.push(SchemaDiff::new(uid, "kind differs"));
        return;
    }

    for (name, definition) in &src.attributes {
        let Some(dst_definition) = dst.attributes.get(name) else {
            diffs.push(SchemaDiff::new(
                uid,
                format!("attribute '{}' missing in destination", name),
            ));
            continue;
        };

        let src_type = src.attribute_type(name);
        let dst_type = dst.attribute_type(name);
        if src_type != dst_type {
            diffs.push(SchemaDiff::new(
                uid,
                format!(
                    "attribute '{}' type differs ({:?} vs {:?})",
                    name, src_type, dst_type
                ),
            ));
            continue;
        }

        let src_component = SchemaDescriptor::component_target(definition);
        let dst_component = SchemaDescriptor::component_target(dst_definition);
        if src_component != dst_component {
            diffs.push(SchemaDiff::new(
                uid,
                format!("attribute '{}' references a different component", name),
            ));
            continue;
        }

        if let Some(component_uid) = src_component {
            if let (Some(src_comp), Some(dst_comp)) = (
                source_by_uid.get(component_uid),
                dest_by_uid.get(component_uid),
            ) {
                compare_shape(
                    component_uid,
                    src_comp,
                    dst_comp,
                    source_by_uid,
                    dest_by_uid,
                    visited,
                    diffs,
                );
            }
        }
    }

    for name in dst.attributes.keys() {
        if !src.attributes.contains_key(name) {
            diffs.push(SchemaDiff::new(
                uid,
                format!("attribute '{}' missing in source", name),
            ));
        }
    }
}
