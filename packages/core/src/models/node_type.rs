//! Node type declarations and resolved node types
//!
//! A declaration is what configuration provides: supertype names plus a free
//! form configuration tree. The registry resolves declarations into
//! [`NodeType`]s whose configuration is the supertypes' configuration merged
//! recursively with the type's own.
//!
//! ```json
//! {
//!   "article": {
//!     "superTypes": ["document"],
//!     "properties": {
//!       "title": { "type": "string", "defaultValue": "Untitled" },
//!       "author": { "type": "reference" }
//!     },
//!     "childNodes": { "main": { "type": "section" } }
//!   }
//! }
//! ```

use crate::models::property::PropertyType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Type assigned to nodes created without an explicit type
pub const UNSTRUCTURED: &str = "unstructured";

/// Raw node type declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeDeclaration {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub super_types: Vec<String>,

    /// Abstract types cannot be assigned to nodes; the flag is not inherited
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,

    /// Mixins only contribute configuration to other types
    #[serde(default, rename = "mixin")]
    pub is_mixin: bool,

    #[serde(flatten)]
    pub configuration: Map<String, Value>,
}

impl NodeTypeDeclaration {
    pub fn with_super_types<I, S>(super_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            super_types: super_types.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Fully resolved node type
#[derive(Debug, Clone, PartialEq)]
pub struct NodeType {
    name: String,
    declared_super_types: Vec<String>,
    ancestors: BTreeSet<String>,
    configuration: Map<String, Value>,
    is_abstract: bool,
    is_mixin: bool,
}

impl NodeType {
    pub(crate) fn new(
        name: String,
        declaration: &NodeTypeDeclaration,
        ancestors: BTreeSet<String>,
        configuration: Map<String, Value>,
    ) -> Self {
        Self {
            name,
            declared_super_types: declaration.super_types.clone(),
            ancestors,
            configuration,
            is_abstract: declaration.is_abstract,
            is_mixin: declaration.is_mixin,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Supertypes named directly in the declaration
    pub fn declared_super_types(&self) -> &[String] {
        &self.declared_super_types
    }

    /// All direct and indirect supertypes
    pub fn ancestors(&self) -> &BTreeSet<String> {
        &self.ancestors
    }

    /// Merged configuration including everything inherited
    pub fn configuration(&self) -> &Map<String, Value> {
        &self.configuration
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_mixin(&self) -> bool {
        self.is_mixin
    }

    /// True for the type itself and for any of its supertypes
    pub fn is_of_type(&self, name: &str) -> bool {
        self.name == name || self.ancestors.contains(name)
    }

    fn property_declarations(&self) -> Option<&Map<String, Value>> {
        self.configuration.get("properties")?.as_object()
    }

    /// `defaultValue` entries of all declared properties
    pub fn default_values_for_properties(&self) -> Map<String, Value> {
        let mut defaults = Map::new();
        if let Some(properties) = self.property_declarations() {
            for (name, declaration) in properties {
                if let Some(value) = declaration.get("defaultValue") {
                    defaults.insert(name.clone(), value.clone());
                }
            }
        }
        defaults
    }

    /// Declared type of a property
    pub fn property_type(&self, name: &str) -> PropertyType {
        self.property_declarations()
            .and_then(|properties| properties.get(name))
            .and_then(|declaration| declaration.get("type"))
            .and_then(Value::as_str)
            .map(PropertyType::from_declaration)
            .unwrap_or_default()
    }

    /// Child nodes created together with a node of this type, as (name, type)
    pub fn auto_created_child_nodes(&self) -> Vec<(String, String)> {
        let Some(children) = self.configuration.get("childNodes").and_then(Value::as_object)
        else {
            return Vec::new();
        };
        children
            .iter()
            .map(|(name, declaration)| {
                let node_type = declaration
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or(UNSTRUCTURED)
                    .to_string();
                (name.clone(), node_type)
            })
            .collect()
    }

    /// Configured `label`, if any
    pub fn label(&self) -> Option<&str> {
        self.configuration.get("label").and_then(Value::as_str)
    }
}
