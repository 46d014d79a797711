//! Schema descriptor types.
//!
//! A [`SchemaDescriptor`] is the sanitized structural metadata for one
//! content type or component, the unit the compatibility check compares
//! between source and destination.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Attribute properties that are environment- or UI-specific rather than
/// structural. Stripped before comparison or serialization.
const VOLATILE_ATTRIBUTE_PROPS: &[&str] = &["private", "configurable", "visible", "writable"];

/// Descriptor-level option keys that vary per install.
const VOLATILE_OPTION_KEYS: &[&str] = &["environment"];

/// Kind of schema a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaKind {
    CollectionType,
    SingleType,
    Component,
}

/// Sanitized structural metadata for one content type or component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDescriptor {
    /// Unique schema identifier (e.g. `api::article.article`).
    pub uid: String,

    /// Collection type, single type or component.
    pub kind: SchemaKind,

    /// Backing collection name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,

    /// Platform model type marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,

    /// Globally unique code identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_id: Option<String>,

    /// Attribute definitions keyed by attribute name.
    ///
    /// `BTreeMap` keeps key order deterministic so strict comparison can
    /// work over canonical JSON.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,

    /// Schema-level options.
    #[serde(default)]
    pub options: BTreeMap<String, Value>,

    /// Plugin-contributed options.
    #[serde(default)]
    pub plugin_options: BTreeMap<String, Value>,
}

impl SchemaDescriptor {
    /// Create a descriptor with just a uid, kind and attributes.
    pub fn new(uid: impl Into<String>, kind: SchemaKind) -> Self {
        Self {
            uid: uid.into(),
            kind,
            collection_name: None,
            model_type: None,
            global_id: None,
            attributes: BTreeMap::new(),
            options: BTreeMap::new(),
            plugin_options: BTreeMap::new(),
        }
    }

    /// Add an attribute definition.
    pub fn with_attribute(mut self, name: impl Into<String>, definition: Value) -> Self {
        self.attributes.insert(name.into(), definition);
        self
    }

    /// Copy of this descriptor with non-structural properties stripped.
    ///
    /// Run before any comparison or serialization so that per-install
    /// cosmetics never show up as schema differences.
    pub fn sanitized(&self) -> SchemaDescriptor {
        let mut out = self.clone();
        for definition in out.attributes.values_mut() {
            if let Value::Object(props) = definition {
                for key in VOLATILE_ATTRIBUTE_PROPS {
                    props.remove(*key);
                }
            }
        }
        for key in VOLATILE_OPTION_KEYS {
            out.options.remove(*key);
        }
        out
    }

    /// Canonical JSON of the sanitized descriptor.
    ///
    /// Key order is deterministic (`BTreeMap` fields, sorted object keys
    /// in serde_json), so equal structures serialize identically.
    pub fn canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.sanitized())?)
    }

    /// The declared `type` of an attribute, if present.
    pub fn attribute_type(&self, name: &str) -> Option<&str> {
        self.attributes.get(name)?.get("type")?.as_str()
    }

    /// For a component attribute, the uid of the embedded component.
    pub fn component_target(definition: &Value) -> Option<&str> {
        if definition.get("type")?.as_str()? == "component" {
            definition.get("component")?.as_str()
        } else {
            None
        }
    }
}
